use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use traas_core::Config;

/// Serve reverse-path traceroutes over HTTP
#[derive(Parser, Debug)]
#[command(name = "traas", author, version, about, long_about = None)]
pub struct Args {
    /// File with server configuration [default: ~/.config/traas.json]
    #[arg(short = 'c', long, value_hint = clap::ValueHint::FilePath, env = "TRAAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write a fresh configuration file from the given flags, then run
    #[arg(long)]
    pub init: bool,

    /// TCP port for the web server [default: 8080]
    #[arg(long = "port", env = "TRAAS_PORT")]
    pub serve_port: Option<u16>,

    /// TCP port watched for incoming connections [default: 8080]
    #[arg(long = "lport", env = "TRAAS_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// Prefix for web requests, without a leading slash
    #[arg(long, env = "TRAAS_PATH")]
    pub path: Option<String>,

    /// Directory of static demo files
    #[arg(long, env = "TRAAS_ROOT")]
    pub root: Option<String>,

    /// Network interface used for capture and injection [default: eth0]
    #[arg(short = 'I', long, env = "TRAAS_DEVICE")]
    pub device: Option<String>,

    /// Gateway MAC address for outbound frames, as 12 hex digits
    #[arg(long = "dst-mac", env = "TRAAS_DST_MAC")]
    pub dst_mac: Option<String>,

    /// Read client IPs from this HTTP header (e.g. behind a reverse proxy)
    #[arg(long = "ip-header", env = "TRAAS_IP_HEADER")]
    pub ip_header: Option<String>,

    /// Where to log completed traces [default: stderr]
    #[arg(long = "log", env = "TRAAS_TRACE_FILE")]
    pub trace_file: Option<String>,

    /// Enable verbose debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Resolve the effective configuration: the persisted JSON file, if any, with
/// explicit flags layered on top. With `--init` the resolved configuration is
/// written back first.
pub fn load(args: &Args) -> anyhow::Result<Config> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = if !args.init && path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("couldn't read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("couldn't parse config file {}", path.display()))?
    } else {
        Config::default()
    };
    let config = apply_flags(config, args);
    if args.init {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&config)?)
            .with_context(|| format!("couldn't write config file {}", path.display()))?;
    }
    Ok(config)
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .context("$HOME not set; export $HOME or use an explicit --config location")?;
    Ok(PathBuf::from(home).join(".config").join("traas.json"))
}

fn apply_flags(mut config: Config, args: &Args) -> Config {
    if let Some(serve_port) = args.serve_port {
        config.serve_port = serve_port;
    }
    if let Some(listen_port) = args.listen_port {
        config.listen_port = listen_port;
    }
    if let Some(path) = &args.path {
        config.path.clone_from(path);
    }
    if let Some(root) = &args.root {
        config.root.clone_from(root);
    }
    if let Some(device) = &args.device {
        config.device.clone_from(device);
    }
    if let Some(dst_mac) = &args.dst_mac {
        config.dst.clone_from(dst_mac);
    }
    if let Some(ip_header) = &args.ip_header {
        config.ip_header.clone_from(ip_header);
    }
    if let Some(trace_file) = &args.trace_file {
        config.trace_file.clone_from(trace_file);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_args() -> Args {
        Args::parse_from(["traas"])
    }

    #[test]
    fn test_apply_flags_overrides() {
        let mut args = bare_args();
        args.serve_port = Some(9000);
        args.device = Some(String::from("enp3s0"));
        let config = apply_flags(Config::default(), &args);
        assert_eq!(9000, config.serve_port);
        assert_eq!("enp3s0", config.device);
        assert_eq!(8080, config.listen_port);
    }

    #[test]
    fn test_apply_flags_keeps_file_values() {
        let args = bare_args();
        let mut config = Config::default();
        config.path = String::from("traas");
        let config = apply_flags(config, &args);
        assert_eq!("traas", config.path);
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "traas",
            "--port",
            "8081",
            "--lport",
            "80",
            "--dst-mac",
            "aabbccddeeff",
            "-v",
        ]);
        assert_eq!(Some(8081), args.serve_port);
        assert_eq!(Some(80), args.listen_port);
        assert_eq!(Some(String::from("aabbccddeeff")), args.dst_mac);
        assert!(args.verbose);
    }
}
