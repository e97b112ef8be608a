use std::net::Ipv4Addr;
use thiserror::Error;
use traas_packet::error::PacketError;

/// A TraaS core error result.
pub type Result<T> = std::result::Result<T, Error>;

/// A TraaS core error.
#[derive(Error, Debug)]
pub enum Error {
    /// A packet could not be built or decoded.
    #[error("invalid packet: {0}")]
    Packet(#[from] PacketError),
    /// The capture or injection handle failed.
    #[error("pcap error: {0}")]
    Pcap(#[from] pcap::Error),
    /// The configured capture device does not exist.
    #[error("unknown interface: {0}")]
    UnknownInterface(String),
    /// The capture device carries no IPv4 address to spoof from.
    #[error("no IPv4 address on interface {0}")]
    NoIpv4Address(String),
    /// The gateway MAC address is not 12 hexadecimal digits.
    #[error("invalid gateway MAC address: {0}")]
    InvalidMacAddress(String),
    /// The observed segment carries no acknowledgement to mimic, so there is
    /// no in-window sequence number for a spoofed reply.
    #[error("cannot spoof into {0} -> {1}: connection not established")]
    NotEstablished(Ipv4Addr, Ipv4Addr),
    /// A probe frame would not fit the emission buffer.
    #[error("probe frame of {0} bytes exceeds the emission buffer")]
    FrameTooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
