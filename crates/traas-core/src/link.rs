use crate::error::{Error, Result};
use pcap::{Active, Capture, Device};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{info, warn};

/// The capture read buffer, sized for a typical MTU.
const SNAPLEN: i32 = 2048;

/// A filter which matches nothing MTU-sized, applied to the egress handle so
/// the kernel never queues our own frames back at us (`ip[2:2]` is the IPv4
/// total-length field).
const EGRESS_FILTER: &str = "ip[2:2] > 5000";

/// The prebuilt Ethernet II header prepended to every outbound IPv4 packet.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LinkHeader {
    bytes: [u8; Self::SIZE],
}

impl LinkHeader {
    pub const SIZE: usize = 14;

    /// Gateway MAC, then local interface MAC, then the IPv4 `EtherType`.
    #[must_use]
    pub fn new(gateway: [u8; 6], local: [u8; 6]) -> Self {
        let mut bytes = [0_u8; Self::SIZE];
        bytes[..6].copy_from_slice(&gateway);
        bytes[6..12].copy_from_slice(&local);
        bytes[12..].copy_from_slice(&[0x08, 0x00]);
        Self { bytes }
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.bytes
    }
}

/// Parse a MAC address given as 12 hexadecimal digits, with or without colon
/// separators.
pub fn parse_mac(raw: &str) -> Result<[u8; 6]> {
    let digits = raw.replace(':', "");
    let bytes = digits.as_bytes();
    if bytes.len() != 12 {
        return Err(Error::InvalidMacAddress(raw.to_string()));
    }
    let mut mac = [0_u8; 6];
    for (i, pair) in bytes.chunks(2).enumerate() {
        let pair = std::str::from_utf8(pair).map_err(|_| invalid_mac(raw))?;
        mac[i] = u8::from_str_radix(pair, 16).map_err(|_| invalid_mac(raw))?;
    }
    Ok(mac)
}

fn invalid_mac(raw: &str) -> Error {
    Error::InvalidMacAddress(raw.to_string())
}

/// The first IPv4 address of the given capture device.
pub fn interface_ipv4(device: &str) -> Result<Ipv4Addr> {
    let found = Device::list()?
        .into_iter()
        .find(|dev| dev.name == device)
        .ok_or_else(|| Error::UnknownInterface(device.to_string()))?;
    found
        .addresses
        .iter()
        .find_map(|addr| match addr.addr {
            IpAddr::V4(ipv4) => Some(ipv4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| Error::NoIpv4Address(device.to_string()))
}

/// The hardware address of the given interface.
pub fn interface_mac(device: &str) -> Result<[u8; 6]> {
    let path = format!("/sys/class/net/{device}/address");
    let raw = std::fs::read_to_string(path)?;
    parse_mac(raw.trim())
}

/// Open the ingress capture handle.
///
/// Non-promiscuous, blocking reads, restricted to traffic destined to the
/// chosen source address which is either ICMP or TCP to the listen port.
pub fn open_ingress(device: &str, src: Ipv4Addr, listen_port: u16) -> Result<Capture<Active>> {
    let mut capture = Capture::from_device(device)?
        .snaplen(SNAPLEN)
        .promisc(false)
        .open()?;
    let filter = format!("dst host {src} and (icmp or (tcp dst port {listen_port}))");
    info!(%filter, "ingress capture on {device}");
    capture.filter(&filter, true)?;
    Ok(capture)
}

/// Open the egress handle used for raw frame injection.
pub fn open_egress(device: &str) -> Result<Capture<Active>> {
    let mut capture = Capture::from_device(device)?
        .snaplen(SNAPLEN)
        .promisc(false)
        .open()?;
    if let Err(err) = capture.filter(EGRESS_FILTER, true) {
        warn!(%err, "could not apply egress filter");
    }
    Ok(capture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_link_header_layout() {
        let header = LinkHeader::new(
            [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
            [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
        );
        assert_eq!(
            &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x08, 0x00],
            header.as_bytes()
        );
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
            parse_mac("aabbccddeeff").unwrap()
        );
        assert_eq!(
            [0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E],
            parse_mac("00:1a:2b:3c:4d:5e").unwrap()
        );
    }

    #[test_case(""; "empty")]
    #[test_case("aabbccddee"; "too short")]
    #[test_case("aabbccddeeff00"; "too long")]
    #[test_case("zzbbccddeeff"; "not hex")]
    fn test_parse_mac_rejects(raw: &str) {
        assert!(parse_mac(raw).is_err());
    }
}
