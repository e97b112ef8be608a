use crate::inject::Injector;
use crate::table::TraceTable;
use crate::trace::Probe;
use pcap::{Active, Capture};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use traas_packet::icmpv4::time_exceeded::TimeExceededPacket;
use traas_packet::icmpv4::{IcmpPacket, IcmpTimeExceededCode, IcmpType};
use traas_packet::ipv4::Ipv4Packet;
use traas_packet::tcp::TcpPacket;
use traas_packet::{fmt_payload, IpProtocol};

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;

/// The IPv4 Record Route and Internet Timestamp option kinds.
const IPV4_OPT_TIMESTAMP: u8 = 4;
const IPV4_OPT_RECORD_ROUTE: u8 = 7;

/// Observes inbound frames and correlates them to in-flight traces.
///
/// TCP segments on the listen port gate the probe volley; ICMPv4
/// `TimeExceeded` replies become recorded hops. Everything else is dropped at
/// the decoder.
#[derive(Debug)]
pub struct CaptureEngine {
    table: Arc<TraceTable>,
    injector: Arc<Injector>,
    probe: Arc<Probe>,
    probe_needle: String,
    runtime: Handle,
}

impl CaptureEngine {
    /// Create an engine watching for probe requests under the given URL
    /// prefix (no leading slash; empty means top-level).
    #[must_use]
    pub fn new(
        table: Arc<TraceTable>,
        injector: Arc<Injector>,
        probe: Arc<Probe>,
        path: &str,
        runtime: Handle,
    ) -> Self {
        let probe_needle = if path.is_empty() {
            String::from("/probe")
        } else {
            format!("/{path}/probe")
        };
        Self {
            table,
            injector,
            probe,
            probe_needle,
            runtime,
        }
    }

    /// Drive the engine from an ingress handle on a dedicated thread.
    ///
    /// The thread suspends only on raw-socket reads; probe volleys run as
    /// tasks on the runtime so pacing sleeps never block capture.
    pub fn spawn(
        self: Arc<Self>,
        ingress: Capture<Active>,
    ) -> std::io::Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name(String::from("traas-capture"))
            .spawn(move || self.run(ingress))
    }

    fn run(&self, mut ingress: Capture<Active>) {
        loop {
            match ingress.next_packet() {
                Ok(packet) => self.handle_frame(packet.data),
                Err(pcap::Error::TimeoutExpired) => {}
                Err(pcap::Error::NoMorePackets) => break,
                Err(err) => {
                    warn!(%err, "capture read failed");
                    break;
                }
            }
        }
    }

    /// Decode a link-layer frame and dispatch its IPv4 payload.
    pub fn handle_frame(&self, frame: &[u8]) {
        if frame.len() < ETHERNET_HEADER_LEN {
            return;
        }
        let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
        let offset = match ethertype {
            ETHERTYPE_IPV4 => ETHERNET_HEADER_LEN,
            ETHERTYPE_VLAN if frame.len() >= ETHERNET_HEADER_LEN + VLAN_TAG_LEN => {
                let inner = u16::from_be_bytes([frame[16], frame[17]]);
                if inner != ETHERTYPE_IPV4 {
                    return;
                }
                ETHERNET_HEADER_LEN + VLAN_TAG_LEN
            }
            _ => return,
        };
        self.handle_ipv4(&frame[offset..]);
    }

    /// Classify an IPv4 packet and route it to the matching trace.
    pub fn handle_ipv4(&self, packet: &[u8]) {
        let Ok(ipv4) = Ipv4Packet::new_view(packet) else {
            return;
        };
        if ipv4.get_version() != 4 {
            return;
        }
        match ipv4.get_protocol() {
            IpProtocol::Tcp => self.handle_tcp(&ipv4),
            IpProtocol::Icmp => self.handle_icmp(&ipv4),
            IpProtocol::Other(_) => {}
        }
    }

    /// Correlate a `TimeExceeded` reply back to the trace it belongs to.
    ///
    /// The table key is the *inner* destination, which is the original client
    /// and unchanged by whichever router replied; the outer source names the
    /// router itself.
    fn handle_icmp(&self, outer: &Ipv4Packet<'_>) {
        let Ok(icmp) = IcmpPacket::new_view(outer.payload()) else {
            return;
        };
        let icmp_type = icmp.get_icmp_type();
        let icmp_code = icmp.get_icmp_code();
        if icmp_type != IcmpType::TimeExceeded
            || IcmpTimeExceededCode::from(icmp_code) != IcmpTimeExceededCode::TtlExpired
        {
            debug!(
                icmp_type = icmp_type.id(),
                icmp_code = icmp_code.0,
                router = %outer.get_source(),
                "ignoring ICMP reply"
            );
            return;
        }
        let Ok(expired) = TimeExceededPacket::new_view(outer.payload()) else {
            return;
        };
        let Ok(inner) = Ipv4Packet::new_view(expired.payload()) else {
            return;
        };
        let Some(trace) = self.table.get(inner.get_destination()) else {
            return;
        };
        log_inner_options(&inner);
        let router = outer.get_source();
        let ttl = inner.get_identification() as u8;
        if trace.record_hop(router, ttl, SystemTime::now()) {
            debug!(%router, ttl, client = %trace.to(), "recorded expiry");
        }
    }

    /// Gate the probe volley on the client's own `GET <path>/probe` request.
    ///
    /// The volley launches at most once per trace: the capture thread is the
    /// sole writer of the launch timestamp. Non-matching payloads are ignored
    /// so the flow stays eligible until the first match.
    fn handle_tcp(&self, ipv4: &Ipv4Packet<'_>) {
        let Some(trace) = self.table.get(ipv4.get_source()) else {
            return;
        };
        if trace.launched() {
            return;
        }
        let Ok(tcp) = TcpPacket::new_view(ipv4.payload()) else {
            return;
        };
        let payload = tcp.payload();
        let Some(line_end) = payload.iter().position(|&b| b == b'\r') else {
            return;
        };
        if !payload.starts_with(b"GET ") || !contains(&payload[..line_end], &self.probe_needle) {
            return;
        }
        let cancel = trace.cancellation();
        let injector = Arc::clone(&self.injector);
        let probe = Arc::clone(&self.probe);
        let packet = ipv4.packet().to_vec();
        let volley_trace = Arc::clone(&trace);
        self.runtime.spawn(async move {
            injector
                .spoof_probe(&cancel, &probe, &packet, Some(&volley_trace), true)
                .await;
        });
        trace.mark_launched(SystemTime::now());
    }
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    let needle = needle.as_bytes();
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Surface Record Route or Internet Timestamp data echoed back inside the
/// expired probe, when some router has filled it in.
fn log_inner_options(inner: &Ipv4Packet<'_>) {
    let options = inner.get_options_raw();
    if options.is_empty() {
        return;
    }
    match options[0] {
        IPV4_OPT_RECORD_ROUTE => debug!(data = %fmt_payload(options), "route recording"),
        IPV4_OPT_TIMESTAMP => debug!(data = %fmt_payload(options), "timestamp option"),
        _ => {}
    }
}
