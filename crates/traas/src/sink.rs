use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;

/// Append-only sink for completed trace records, one JSON document per line.
///
/// Writes go to the configured file, or to stderr when no path is set. Shared
/// across handlers; a failed write is logged and dropped.
#[derive(Clone)]
pub struct TraceSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl TraceSink {
    pub fn open(path: &str) -> io::Result<Self> {
        let out: Box<dyn Write + Send> = if path.is_empty() {
            Box::new(io::stderr())
        } else {
            Box::new(OpenOptions::new().create(true).append(true).open(path)?)
        };
        Ok(Self {
            out: Arc::new(Mutex::new(out)),
        })
    }

    pub fn append(&self, record: &str) {
        let mut out = self.out.lock();
        if let Err(err) = writeln!(out, "{record}").and_then(|()| out.flush()) {
            tracing::warn!(%err, "could not append trace record");
        }
    }
}

impl std::fmt::Debug for TraceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_lines() {
        let path = std::env::temp_dir().join(format!("traas-sink-{}.json", std::process::id()));
        let path_str = path.to_str().unwrap();
        let sink = TraceSink::open(path_str).unwrap();
        sink.append(r#"{"To":"192.168.0.1"}"#);
        sink.append(r#"{"To":"192.168.0.2"}"#);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(2, contents.lines().count());
        assert!(contents.starts_with(r#"{"To":"192.168.0.1"}"#));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_stderr_fallback() {
        let sink = TraceSink::open("").unwrap();
        sink.append("{}");
    }
}
