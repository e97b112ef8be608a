use crate::trace::Trace;
use dashmap::DashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// The set of in-flight traces, keyed by client IPv4 address.
///
/// The session layer is the only writer of table membership; the capture
/// thread only looks entries up and mutates the traces themselves. Lookups on
/// the per-frame path only lock the shard holding the key, so a miss is cheap.
#[derive(Debug, Default)]
pub struct TraceTable {
    entries: DashMap<Ipv4Addr, Arc<Trace>>,
}

impl TraceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh trace for a client, displacing any prior entry.
    ///
    /// A displaced trace is cancelled so an orphaned volley stops probing.
    pub fn begin(&self, to: Ipv4Addr) -> Arc<Trace> {
        let trace = Arc::new(Trace::new(to));
        if let Some(prior) = self.entries.insert(to, Arc::clone(&trace)) {
            prior.cancel();
        }
        trace
    }

    /// The current trace for a client, if any.
    #[must_use]
    pub fn get(&self, to: Ipv4Addr) -> Option<Arc<Trace>> {
        self.entries.get(&to).map(|entry| Arc::clone(&entry))
    }

    /// Cancel and remove the trace for a client.
    ///
    /// Ending an absent trace is a no-op.
    pub fn end(&self, to: Ipv4Addr) {
        if let Some((_, trace)) = self.entries.remove(&to) {
            trace.cancel();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);

    #[test]
    fn test_begin_get_end() {
        let table = TraceTable::new();
        assert!(table.get(CLIENT).is_none());
        let trace = table.begin(CLIENT);
        assert_eq!(CLIENT, trace.to());
        assert!(table.get(CLIENT).is_some());
        assert_eq!(1, table.len());
        table.end(CLIENT);
        assert!(table.get(CLIENT).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_begin_displaces_prior() {
        let table = TraceTable::new();
        let first = table.begin(CLIENT);
        let second = table.begin(CLIENT);
        assert_eq!(1, table.len());
        assert!(first.cancellation().is_cancelled());
        assert!(!second.cancellation().is_cancelled());
        assert!(Arc::ptr_eq(&second, &table.get(CLIENT).unwrap()));
    }

    #[test]
    fn test_end_cancels() {
        let table = TraceTable::new();
        let trace = table.begin(CLIENT);
        let token = trace.cancellation();
        table.end(CLIENT);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_end_is_idempotent() {
        let table = TraceTable::new();
        table.begin(CLIENT);
        table.end(CLIENT);
        table.end(CLIENT);
        assert!(table.is_empty());
    }

    #[test]
    fn test_distinct_clients() {
        let table = TraceTable::new();
        let other = Ipv4Addr::new(192, 168, 0, 2);
        table.begin(CLIENT);
        table.begin(other);
        assert_eq!(2, table.len());
        table.end(CLIENT);
        assert!(table.get(other).is_some());
    }
}
