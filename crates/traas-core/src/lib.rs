//! TraaS - reverse-path traceroute as a service.
//!
//! This crate provides the core facility used by the standalone `traas`
//! server: discovering the network path from the server back to an HTTP
//! client by injecting spoofed TCP segments into the client's existing
//! session at ascending TTLs and correlating the resulting ICMPv4
//! `TimeExceeded` replies.
//!
//! The moving parts:
//!
//! - [`link`] opens the capture and injection handles on the configured
//!   interface and builds the Ethernet header prepended to outbound frames.
//! - [`frame`] builds the spoofed IPv4+TCP probe segments, stashing the
//!   emission TTL in the IPv4 identification field so replies can be labelled.
//! - [`Injector`] emits probe volleys, with pacing and cancellation.
//! - [`CaptureEngine`] watches inbound traffic, gates each volley on the
//!   client's own probe request and attaches each ICMP reply to its trace.
//! - [`TraceTable`] maps client addresses to in-flight [`Trace`] state.
//!
//! The HTTP session layer which drives trace lifecycles lives in the `traas`
//! application crate; this crate defines the interface it consumes.
#![forbid(unsafe_code)]

/// Observe inbound frames and correlate them to traces.
pub mod capture;

/// The typed server configuration record.
pub mod config;

/// Core errors.
pub mod error;

/// Spoofed probe frame construction.
pub mod frame;

/// Probe emission.
pub mod inject;

/// Capture and injection handles on the network interface.
pub mod link;

/// The concurrent client-to-trace mapping.
pub mod table;

/// Per-trace state and its persisted form.
pub mod trace;

pub use capture::CaptureEngine;
pub use config::{defaults, Config};
pub use error::{Error, Result};
pub use inject::Injector;
pub use link::LinkHeader;
pub use table::TraceTable;
pub use trace::{Hop, HopRecord, Probe, Trace, TraceRecord, MAX_RECORDED_HOPS};
