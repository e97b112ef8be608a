use serde::{Deserialize, Serialize};

/// Default values for configuration.
pub mod defaults {
    use std::time::Duration;

    /// The default value for `serve_port`.
    pub const DEFAULT_SERVE_PORT: u16 = 8080;

    /// The default value for `listen_port`.
    pub const DEFAULT_LISTEN_PORT: u16 = 8080;

    /// The default value for `device`.
    pub const DEFAULT_DEVICE: &str = "eth0";

    /// The default value for `root`.
    pub const DEFAULT_ROOT: &str = "..";

    /// The lowest TTL probed for each trace.
    pub const DEFAULT_MIN_HOP: u8 = 4;

    /// One past the highest TTL probed for each trace.
    pub const DEFAULT_MAX_HOP: u8 = 32;

    /// The delay between probe emissions at successive TTLs.
    ///
    /// Back-to-back volleys trip router ICMP rate limits and edge-firewall
    /// flood heuristics, which starves the trace of replies.
    pub const DEFAULT_PROBE_PACING: Duration = Duration::from_millis(100);

    /// The number of probes emitted per TTL.
    pub const DEFAULT_PROBES_PER_HOP: u8 = 1;

    /// How long the `probe` endpoint holds the client socket open.
    pub const DEFAULT_PROBE_WINDOW: Duration = Duration::from_secs(10);
}

/// The long-term server configuration, persisted as JSON.
///
/// The serialized field names match the records written by earlier
/// deployments, so an existing config file keeps working.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// The HTTP listen port.
    pub serve_port: u16,
    /// The TCP port watched by the capture filter.
    ///
    /// Typically equal to `serve_port` but decoupled to support deployments
    /// behind a reverse proxy.
    pub listen_port: u16,
    /// The URL prefix under which the endpoints live, with no leading slash.
    /// Empty means top-level.
    pub path: String,
    /// The filesystem path of the static demo files.
    pub root: String,
    /// The network interface used for capture and injection.
    pub device: String,
    /// The MAC address of the upstream gateway as 12 hexadecimal digits,
    /// prepended to every outbound frame.
    pub dst: String,
    /// If non-empty, the client IP is read from this HTTP header rather than
    /// the socket peer.
    #[serde(rename = "IPHeader")]
    pub ip_header: String,
    /// The append-only log of completed traces. Empty means stderr.
    pub trace_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serve_port: defaults::DEFAULT_SERVE_PORT,
            listen_port: defaults::DEFAULT_LISTEN_PORT,
            path: String::new(),
            root: String::from(defaults::DEFAULT_ROOT),
            device: String::from(defaults::DEFAULT_DEVICE),
            dst: String::from("000000000000"),
            ip_header: String::new(),
            trace_file: String::new(),
        }
    }
}

impl Config {
    /// The absolute URL path of a named endpoint under the configured prefix.
    #[must_use]
    pub fn endpoint(&self, name: &str) -> String {
        if self.path.is_empty() {
            format!("/{name}")
        } else {
            format!("/{}/{name}", self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(8080, config.serve_port);
        assert_eq!(8080, config.listen_port);
        assert_eq!("eth0", config.device);
        assert!(config.path.is_empty());
        assert!(config.ip_header.is_empty());
    }

    #[test]
    fn test_endpoint() {
        let mut config = Config::default();
        assert_eq!("/start", config.endpoint("start"));
        config.path = String::from("traas");
        assert_eq!("/traas/probe", config.endpoint("probe"));
    }

    #[test]
    fn test_json_field_names() {
        let json = r#"{
            "ServePort": 8081,
            "ListenPort": 80,
            "Path": "traas",
            "Root": "/srv/traas",
            "Device": "enp3s0",
            "Dst": "aabbccddeeff",
            "IPHeader": "X-Forwarded-For",
            "TraceFile": "/var/log/traas.json"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(8081, config.serve_port);
        assert_eq!(80, config.listen_port);
        assert_eq!("traas", config.path);
        assert_eq!("enp3s0", config.device);
        assert_eq!("X-Forwarded-For", config.ip_header);
        assert_eq!("/var/log/traas.json", config.trace_file);
    }

    #[test]
    fn test_json_partial() {
        let config: Config = serde_json::from_str(r#"{"Path": "t"}"#).unwrap();
        assert_eq!(defaults::DEFAULT_SERVE_PORT, config.serve_port);
        assert_eq!("t", config.path);
    }
}
