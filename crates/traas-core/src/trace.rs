use crate::config::defaults;
use arrayvec::ArrayVec;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// The maximum number of hops recorded per trace.
pub const MAX_RECORDED_HOPS: usize = 64;

/// The response injected into the client's stream at every TTL.
///
/// The client follows the redirect to `done`, which finalizes the trace.
const REDIRECT_PAYLOAD: &[u8] = b"HTTP/1.1 302 Found\r\n\
Location: ./done\r\n\
Connection: Close\r\n\
Content-Length: 0\r\n\r\n";

/// The immutable probe configuration shared by all traces.
#[derive(Debug, Clone)]
pub struct Probe {
    /// The TCP payload of every spoofed segment.
    pub payload: Vec<u8>,
    /// The lowest TTL probed, inclusive.
    pub min_hop: u8,
    /// The highest TTL probed, exclusive.
    pub max_hop: u8,
    /// The delay between emissions at successive TTLs.
    pub pacing: Duration,
    /// The number of segments emitted per TTL, at `ttl`, `ttl + 1`, and so on.
    ///
    /// Earlier deployments emitted pairs back-to-back; the current default is
    /// a single paced probe per TTL.
    pub probes_per_hop: u8,
}

impl Default for Probe {
    fn default() -> Self {
        Self {
            payload: REDIRECT_PAYLOAD.to_vec(),
            min_hop: defaults::DEFAULT_MIN_HOP,
            max_hop: defaults::DEFAULT_MAX_HOP,
            pacing: defaults::DEFAULT_PROBE_PACING,
            probes_per_hop: defaults::DEFAULT_PROBES_PER_HOP,
        }
    }
}

impl Probe {
    /// How long to keep waiting for late ICMP replies at finalize.
    #[must_use]
    pub fn settling_window(&self) -> Duration {
        self.pacing * (u32::from(self.max_hop) - u32::from(self.min_hop) + 1)
    }
}

/// A single router response within a trace.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Hop {
    /// The TTL at which the expired probe was emitted, recovered from the
    /// identification tag echoed inside the ICMP reply.
    pub ttl: u8,
    /// The router which sent the `TimeExceeded` reply.
    pub ip: Ipv4Addr,
    /// When the probe for this TTL was emitted.
    pub sent: SystemTime,
    /// When the reply arrived.
    pub received: SystemTime,
    /// Half the bracketed round trip.
    pub latency: Duration,
}

#[derive(Debug)]
struct TraceState {
    launched: Option<SystemTime>,
    sent_at: [Option<SystemTime>; MAX_RECORDED_HOPS],
    hops: ArrayVec<Hop, MAX_RECORDED_HOPS>,
}

impl Default for TraceState {
    fn default() -> Self {
        Self {
            launched: None,
            sent_at: [None; MAX_RECORDED_HOPS],
            hops: ArrayVec::new(),
        }
    }
}

/// The server-side record of one client's in-flight traceroute.
///
/// Hops are appended in arrival order; the sorted route view exists only in
/// the [`TraceRecord`] produced by [`Trace::finalize`].
#[derive(Debug)]
pub struct Trace {
    to: Ipv4Addr,
    cancel: CancellationToken,
    state: RwLock<TraceState>,
}

impl Trace {
    #[must_use]
    pub fn new(to: Ipv4Addr) -> Self {
        Self {
            to,
            cancel: CancellationToken::new(),
            state: RwLock::new(TraceState::default()),
        }
    }

    /// The client being traced.
    #[must_use]
    pub const fn to(&self) -> Ipv4Addr {
        self.to
    }

    /// A handle which aborts any in-flight probe volley for this trace.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort any in-flight probe volley.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the probe volley has been launched.
    ///
    /// The capture thread is the sole writer of the launch timestamp, so this
    /// guard cannot race against itself.
    #[must_use]
    pub fn launched(&self) -> bool {
        self.state.read().launched.is_some()
    }

    /// Record the launch of the probe volley.
    pub fn mark_launched(&self, now: SystemTime) {
        self.state.write().launched = Some(now);
    }

    /// Record the emission time of the probe at a given TTL.
    ///
    /// Stamped immediately before emission so that the bracketed round trip is
    /// an upper bound even when the write to the wire is delayed.
    pub fn stamp_sent(&self, ttl: u8, now: SystemTime) {
        if let Some(slot) = self.state.write().sent_at.get_mut(usize::from(ttl)) {
            *slot = Some(now);
        }
    }

    /// Append a router reply, if capacity remains.
    ///
    /// Returns `false` when the trace is fully recorded; replies beyond the
    /// cap are dropped.
    pub fn record_hop(&self, router: Ipv4Addr, ttl: u8, received: SystemTime) -> bool {
        let mut state = self.state.write();
        if state.hops.is_full() {
            return false;
        }
        let sent = state
            .sent_at
            .get(usize::from(ttl))
            .copied()
            .flatten()
            .unwrap_or(received);
        let latency = received.duration_since(sent).unwrap_or_default() / 2;
        state.hops.push(Hop {
            ttl,
            ip: router,
            sent,
            received,
            latency,
        });
        true
    }

    /// The number of hops recorded so far.
    ///
    /// May keep growing until the trace is removed from the table.
    #[must_use]
    pub fn recorded(&self) -> usize {
        self.state.read().hops.len()
    }

    /// A snapshot of the recorded hops, in arrival order.
    #[must_use]
    pub fn hops(&self) -> Vec<Hop> {
        self.state.read().hops.to_vec()
    }

    /// Build the serializable record of this trace.
    ///
    /// The recorded hops are sorted by TTL into the route; this is the only
    /// place a route view is built.
    #[must_use]
    pub fn finalize(&self) -> TraceRecord {
        let state = self.state.read();
        let mut route: Vec<HopRecord> = state.hops.iter().map(HopRecord::from).collect();
        route.sort_by_key(|hop| hop.ttl);
        TraceRecord {
            to: self.to,
            sent: state.launched.map(DateTime::from),
            recorded: state.hops.len(),
            route,
        }
    }
}

/// The persisted form of a completed trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    #[serde(rename = "To")]
    pub to: Ipv4Addr,
    #[serde(rename = "Sent")]
    pub sent: Option<DateTime<Utc>>,
    #[serde(rename = "Recorded")]
    pub recorded: usize,
    #[serde(rename = "Route")]
    pub route: Vec<HopRecord>,
}

/// The persisted form of a single hop.
#[derive(Debug, Clone, Serialize)]
pub struct HopRecord {
    #[serde(rename = "TTL")]
    pub ttl: u8,
    #[serde(rename = "IP")]
    pub ip: Ipv4Addr,
    #[serde(rename = "Received")]
    pub received: DateTime<Utc>,
    #[serde(rename = "Latency", serialize_with = "latency_nanos")]
    pub latency: Duration,
}

impl From<&Hop> for HopRecord {
    fn from(hop: &Hop) -> Self {
        Self {
            ttl: hop.ttl,
            ip: hop.ip,
            received: DateTime::from(hop.received),
            latency: hop.latency,
        }
    }
}

fn latency_nanos<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(latency.as_nanos() as u64)
}
