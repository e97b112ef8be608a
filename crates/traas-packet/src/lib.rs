//! Wire format parsing and building for the TraaS probe pipeline.
//!
//! The following packets are supported:
//! - `IPv4`
//! - `TCP`
//! - `ICMPv4` (including the `Time Exceeded` inner-packet view)
//!
//! # Endianness
//!
//! The internal representation is held in network byte order (big-endian) and
//! all accessor methods take and return data in host byte order, converting as
//! necessary for the given architecture.
//!
//! # Example
//!
//! The following example parses a `TCP` segment and asserts its fields:
//!
//! ```rust
//! # fn main() -> Result<(), traas_packet::error::PacketError> {
//! use traas_packet::tcp::TcpPacket;
//!
//! let buf = hex_literal::hex!("1f 90 00 50 00 00 04 00 00 00 02 00 50 18 00 7a 00 00 00 00");
//! let packet = TcpPacket::new_view(&buf)?;
//! assert_eq!(8080, packet.get_source());
//! assert_eq!(80, packet.get_destination());
//! assert_eq!(1024, packet.get_sequence());
//! assert_eq!(512, packet.get_acknowledgement());
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod buffer;

/// Packet errors.
pub mod error;

/// Functions for calculating network checksums.
pub mod checksum;

/// `ICMPv4` packets.
pub mod icmpv4;

/// `IPv4` packets.
pub mod ipv4;

/// `TCP` packets.
pub mod tcp;

/// The IP packet next layer protocol.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Other(u8),
}

impl IpProtocol {
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Icmp => 1,
            Self::Tcp => 6,
            Self::Other(id) => id,
        }
    }
}

impl From<u8> for IpProtocol {
    fn from(id: u8) -> Self {
        match id {
            1 => Self::Icmp,
            6 => Self::Tcp,
            p => Self::Other(p),
        }
    }
}

/// Format a payload as a hexadecimal string.
#[must_use]
pub fn fmt_payload(bytes: &[u8]) -> String {
    use itertools::Itertools as _;
    format!("{:02x}", bytes.iter().format(" "))
}
