use crate::error::Result;
use crate::frame::{build_probe_frame, MAX_FRAME_SIZE};
use crate::link::LinkHeader;
use crate::trace::{Probe, Trace};
use parking_lot::Mutex;
use pcap::{Active, Capture};
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use traas_packet::ipv4::Ipv4Packet;
use traas_packet::tcp::TcpPacket;
use traas_packet::IpProtocol;

/// Emits spoofed probe frames onto the wire.
///
/// The egress handle and link header are process-wide state: constructed once
/// at startup and shared for the lifetime of the server. Frame assembly is
/// local to each emission; only the write to the handle is serialized.
pub struct Injector {
    tx: Tx,
}

enum Tx {
    /// Production emission through the raw link-layer handle.
    Device {
        handle: Mutex<Capture<Active>>,
        link_header: LinkHeader,
    },
    /// Test tap: serialized IP packets are diverted here and link-layer
    /// emission is skipped.
    Tap(mpsc::UnboundedSender<Vec<u8>>),
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tx {
            Tx::Device { link_header, .. } => f
                .debug_struct("Injector")
                .field("link_header", link_header)
                .finish_non_exhaustive(),
            Tx::Tap(_) => f.debug_struct("Injector").field("tap", &true).finish(),
        }
    }
}

impl Injector {
    /// An injector writing frames to an open egress handle.
    #[must_use]
    pub fn device(handle: Capture<Active>, link_header: LinkHeader) -> Self {
        Self {
            tx: Tx::Device {
                handle: Mutex::new(handle),
                link_header,
            },
        }
    }

    /// An injector diverting serialized IP packets to a channel, for tests.
    #[must_use]
    pub fn tap() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Tx::Tap(tx) }, rx)
    }

    /// Build and emit one spoofed segment in the same stream as `original`.
    ///
    /// When a trace is supplied its per-TTL sent time is stamped before
    /// emission, so the bracketed round trip holds even if the write to the
    /// wire is delayed.
    #[allow(clippy::too_many_arguments)]
    pub fn spoof_tcp(
        &self,
        src: Ipv4Addr,
        dest: Ipv4Addr,
        original: &TcpPacket<'_>,
        original_payload_len: u16,
        ttl: u8,
        payload: &[u8],
        trace: Option<&Trace>,
    ) -> Result<()> {
        let mut buf = [0_u8; MAX_FRAME_SIZE];
        let len = build_probe_frame(
            &mut buf,
            src,
            dest,
            original,
            original_payload_len,
            ttl,
            payload,
            unix_seconds(),
        )?;
        if let Some(trace) = trace {
            trace.stamp_sent(ttl, SystemTime::now());
        }
        self.emit(&buf[..len])
    }

    /// Emit a serialized IPv4 packet, prepending the link header.
    fn emit(&self, packet: &[u8]) -> Result<()> {
        match &self.tx {
            Tx::Tap(tap) => {
                let _ = tap.send(packet.to_vec());
                Ok(())
            }
            Tx::Device {
                handle,
                link_header,
            } => {
                let mut frame = Vec::with_capacity(LinkHeader::SIZE + packet.len());
                frame.extend_from_slice(link_header.as_bytes());
                frame.extend_from_slice(packet);
                handle.lock().sendpacket(frame.as_slice())?;
                Ok(())
            }
        }
    }

    /// Emit the full probe volley in reply to a captured IPv4+TCP packet.
    ///
    /// One pass over `[probe.min_hop, probe.max_hop)`; emission failures are
    /// logged and the volley continues, since later hops may still yield
    /// useful replies. Returns early once `cancel` fires.
    pub async fn spoof_probe(
        &self,
        cancel: &CancellationToken,
        probe: &Probe,
        in_reply_to: &[u8],
        trace: Option<&Trace>,
        with_pacing: bool,
    ) {
        let Ok(ipv4) = Ipv4Packet::new_view(in_reply_to) else {
            tracing::warn!("asked to spoof but the trigger had no IPv4 layer");
            return;
        };
        if ipv4.get_protocol() != IpProtocol::Tcp {
            tracing::warn!("asked to spoof but the trigger had no TCP layer");
            return;
        }
        let Ok(tcp) = TcpPacket::new_view(ipv4.payload()) else {
            tracing::warn!("asked to spoof but the trigger TCP layer was truncated");
            return;
        };
        let original_payload_len = tcp.payload().len() as u16;
        for ttl in probe.min_hop..probe.max_hop {
            if cancel.is_cancelled() {
                return;
            }
            for n in 0..probe.probes_per_hop {
                let probe_ttl = ttl.saturating_add(n);
                if let Err(err) = self.spoof_tcp(
                    ipv4.get_destination(),
                    ipv4.get_source(),
                    &tcp,
                    original_payload_len,
                    probe_ttl,
                    &probe.payload,
                    trace,
                ) {
                    tracing::warn!(%err, ttl = probe_ttl, "failed to emit probe");
                }
            }
            if with_pacing && !probe.pacing.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(probe.pacing) => {}
                }
            }
        }
    }
}

fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Trace;
    use std::time::Duration;
    use traas_packet::tcp::flags;

    fn original_segment(buf: &mut [u8]) -> TcpPacket<'_> {
        let mut tcp = TcpPacket::new(buf).unwrap();
        tcp.set_source(8080);
        tcp.set_destination(80);
        tcp.set_sequence(512);
        tcp.set_acknowledgement(1024);
        tcp.set_data_offset(5);
        tcp.set_flags(flags::ACK);
        tcp
    }

    fn trigger_packet(payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0_u8; 40 + payload.len()];
        {
            let mut tcp = TcpPacket::new(&mut buf[20..]).unwrap();
            tcp.set_source(40000);
            tcp.set_destination(8080);
            tcp.set_sequence(512);
            tcp.set_acknowledgement(1024);
            tcp.set_data_offset(5);
            tcp.set_payload(payload);
        }
        let mut ipv4 = Ipv4Packet::new(&mut buf).unwrap();
        ipv4.set_version(4);
        ipv4.set_header_length(5);
        ipv4.set_total_length(40 + payload.len() as u16);
        ipv4.set_protocol(IpProtocol::Tcp);
        ipv4.set_source(Ipv4Addr::new(192, 168, 0, 1));
        ipv4.set_destination(Ipv4Addr::new(192, 168, 0, 2));
        buf
    }

    #[test]
    fn test_basic_emission() {
        let (injector, mut tap) = Injector::tap();
        let host = Ipv4Addr::LOCALHOST;
        let mut orig_buf = [0_u8; 20];
        let original = original_segment(&mut orig_buf);
        injector
            .spoof_tcp(host, host, &original, 512, 64, b"hello world", None)
            .unwrap();
        let packet = tap.try_recv().unwrap();
        let ipv4 = Ipv4Packet::new_view(&packet).unwrap();
        assert_eq!(64, ipv4.get_identification());
        assert_eq!(64, ipv4.get_ttl());
        assert!(packet
            .windows(b"hello world".len())
            .any(|window| window == b"hello world"));
    }

    #[test]
    fn test_emission_stamps_trace() {
        let (injector, _tap) = Injector::tap();
        let trace = Trace::new(Ipv4Addr::new(192, 168, 0, 1));
        let mut orig_buf = [0_u8; 20];
        let original = original_segment(&mut orig_buf);
        injector
            .spoof_tcp(
                Ipv4Addr::LOCALHOST,
                Ipv4Addr::LOCALHOST,
                &original,
                0,
                9,
                b"probe",
                Some(&trace),
            )
            .unwrap();
        assert!(trace.record_hop(Ipv4Addr::new(10, 0, 0, 7), 9, SystemTime::now()));
        assert!(trace.hops()[0].latency < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_volley() {
        let (injector, mut tap) = Injector::tap();
        let probe = Probe {
            payload: b"probe payload".to_vec(),
            ..Probe::default()
        };
        let packet = trigger_packet(b"GET /probe HTTP/1.1\r\n\r\n");
        let cancel = CancellationToken::new();
        injector
            .spoof_probe(&cancel, &probe, &packet, None, false)
            .await;
        let expected = usize::from(probe.max_hop - probe.min_hop);
        let mut ids = Vec::new();
        for _ in 0..expected {
            let frame = tap.try_recv().unwrap();
            let ipv4 = Ipv4Packet::new_view(&frame).unwrap();
            ids.push(ipv4.get_identification());
            assert!(frame
                .windows(probe.payload.len())
                .any(|window| window == probe.payload));
        }
        assert!(tap.try_recv().is_err());
        assert_eq!(28, expected);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(u16::from(probe.min_hop), ids[0]);
    }

    #[tokio::test]
    async fn test_volley_cancelled_before_start() {
        let (injector, mut tap) = Injector::tap();
        let probe = Probe::default();
        let packet = trigger_packet(b"GET /probe HTTP/1.1\r\n\r\n");
        let cancel = CancellationToken::new();
        cancel.cancel();
        injector
            .spoof_probe(&cancel, &probe, &packet, None, false)
            .await;
        assert!(tap.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_volley_paired_probes() {
        let (injector, mut tap) = Injector::tap();
        let probe = Probe {
            min_hop: 4,
            max_hop: 6,
            probes_per_hop: 2,
            ..Probe::default()
        };
        let packet = trigger_packet(b"");
        let cancel = CancellationToken::new();
        injector
            .spoof_probe(&cancel, &probe, &packet, None, false)
            .await;
        let mut ids = Vec::new();
        while let Ok(frame) = tap.try_recv() {
            ids.push(Ipv4Packet::new_view(&frame).unwrap().get_identification());
        }
        assert_eq!(vec![4, 5, 5, 6], ids);
    }

    #[tokio::test]
    async fn test_volley_ignores_non_tcp_trigger() {
        let (injector, mut tap) = Injector::tap();
        let probe = Probe::default();
        let mut packet = trigger_packet(b"");
        {
            let mut ipv4 = Ipv4Packet::new(&mut packet).unwrap();
            ipv4.set_protocol(IpProtocol::Icmp);
        }
        let cancel = CancellationToken::new();
        injector
            .spoof_probe(&cancel, &probe, &packet, None, false)
            .await;
        assert!(tap.try_recv().is_err());
    }
}
