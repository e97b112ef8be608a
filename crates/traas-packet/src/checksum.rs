//! Internet checksums (RFC 1071) for the IPv4 header and for TCP and ICMP
//! carried over IPv4.

use crate::IpProtocol;
use std::net::Ipv4Addr;

/// Calculate the checksum for an `IPv4` header.
///
/// The checksum field itself (the 6th 16-bit word) is excluded from the sum.
#[must_use]
pub fn ipv4_header_checksum(data: &[u8]) -> u16 {
    finalize(sum_words(data, Some(5)))
}

/// Calculate the checksum for an `IPv4` `ICMP` packet.
#[must_use]
pub fn icmp_ipv4_checksum(data: &[u8]) -> u16 {
    finalize(sum_words(data, Some(1)))
}

/// Calculate the checksum for an `IPv4` `TCP` segment.
///
/// The sum covers the IPv4 pseudo header (source, destination, protocol and
/// segment length) followed by the TCP header and payload, excluding the
/// checksum field (the 9th 16-bit word of the segment).
#[must_use]
pub fn tcp_ipv4_checksum(data: &[u8], src_addr: Ipv4Addr, dest_addr: Ipv4Addr) -> u16 {
    let mut sum = u32::from(IpProtocol::Tcp.id()) + data.len() as u32;
    sum += addr_sum(src_addr) + addr_sum(dest_addr);
    sum += sum_words(data, Some(8));
    finalize(sum)
}

fn addr_sum(addr: Ipv4Addr) -> u32 {
    let octets = addr.octets();
    u32::from(u16::from_be_bytes([octets[0], octets[1]]))
        + u32::from(u16::from_be_bytes([octets[2], octets[3]]))
}

fn sum_words(data: &[u8], skip_word: Option<usize>) -> u32 {
    let mut sum = 0_u32;
    for (i, pair) in data.chunks(2).enumerate() {
        if Some(i) == skip_word {
            continue;
        }
        let word = match *pair {
            [hi, lo] => u16::from_be_bytes([hi, lo]),
            [hi] => u16::from_be_bytes([hi, 0]),
            _ => unreachable!(),
        };
        sum += u32::from(word);
    }
    sum
}

const fn finalize(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xFFFF);
    }
    !sum as u16
}
