use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use traas_packet::checksum::{ipv4_header_checksum, tcp_ipv4_checksum};
use traas_packet::ipv4::{Ipv4Packet, DONT_FRAGMENT};
use traas_packet::tcp::{flags, TcpPacket};
use traas_packet::IpProtocol;

/// The maximum size of the IP packet we emit.
pub const MAX_FRAME_SIZE: usize = 1024;

/// The advertised receive window of every spoofed segment.
const SPOOF_WINDOW: u16 = 122;

/// TCP Timestamps option: kind 8, length 10, padded to a 4-byte boundary.
const TCP_OPT_TIMESTAMPS: u8 = 8;
const TCP_OPT_TIMESTAMPS_LEN: u8 = 10;
const TCP_OPTIONS_LEN: usize = 12;

const IPV4_HEADER_LEN: usize = Ipv4Packet::minimum_packet_size();
const TCP_HEADER_LEN: usize = TcpPacket::minimum_packet_size() + TCP_OPTIONS_LEN;

/// Build a spoofed IPv4+TCP probe into `buf` and return its length.
///
/// The segment mimics the server's side of the connection the original
/// segment belongs to: ports swapped, our sequence taken from the peer's
/// acknowledgement and our acknowledgement covering the peer's payload. The
/// emission TTL is additionally stashed in the IPv4 identification field,
/// which routers echo verbatim inside `TimeExceeded` replies; the TTL itself
/// is decremented en route and cannot be recovered from the echo.
///
/// A Timestamps option carrying `ts_value` rides along to help correlate
/// replies even when the receiver discards the segment.
#[allow(clippy::too_many_arguments)]
pub fn build_probe_frame(
    buf: &mut [u8],
    src: Ipv4Addr,
    dest: Ipv4Addr,
    original: &TcpPacket<'_>,
    original_payload_len: u16,
    ttl: u8,
    payload: &[u8],
    ts_value: u32,
) -> Result<usize> {
    if original.get_acknowledgement() == 0 {
        return Err(Error::NotEstablished(src, dest));
    }
    let total = IPV4_HEADER_LEN + TCP_HEADER_LEN + payload.len();
    if total > buf.len() {
        return Err(Error::FrameTooLarge(total));
    }
    let frame = &mut buf[..total];
    frame.fill(0);
    {
        let mut tcp = TcpPacket::new(&mut frame[IPV4_HEADER_LEN..])?;
        tcp.set_source(original.get_destination());
        tcp.set_destination(original.get_source());
        tcp.set_sequence(original.get_acknowledgement());
        tcp.set_acknowledgement(
            original
                .get_sequence()
                .wrapping_add(u32::from(original_payload_len)),
        );
        tcp.set_data_offset((TCP_HEADER_LEN / 4) as u8);
        tcp.set_flags(flags::PSH | flags::ACK);
        tcp.set_window_size(SPOOF_WINDOW);
        let options = tcp.get_options_raw_mut();
        options[0] = TCP_OPT_TIMESTAMPS;
        options[1] = TCP_OPT_TIMESTAMPS_LEN;
        options[2..6].copy_from_slice(&ts_value.to_le_bytes());
        tcp.set_payload(payload);
    }
    let tcp_checksum = tcp_ipv4_checksum(&frame[IPV4_HEADER_LEN..], src, dest);
    TcpPacket::new(&mut frame[IPV4_HEADER_LEN..])?.set_checksum(tcp_checksum);
    {
        let mut ipv4 = Ipv4Packet::new(frame)?;
        ipv4.set_version(4);
        ipv4.set_header_length((IPV4_HEADER_LEN / 4) as u8);
        ipv4.set_total_length(total as u16);
        ipv4.set_identification(u16::from(ttl));
        ipv4.set_flags_and_fragment_offset(DONT_FRAGMENT);
        ipv4.set_ttl(ttl);
        ipv4.set_protocol(IpProtocol::Tcp);
        ipv4.set_source(src);
        ipv4.set_destination(dest);
    }
    let header_checksum = ipv4_header_checksum(&frame[..IPV4_HEADER_LEN]);
    Ipv4Packet::new(frame)?.set_checksum(header_checksum);
    Ok(total)
}
