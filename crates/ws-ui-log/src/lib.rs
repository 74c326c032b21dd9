use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::RwLock;

/// A bounded, overwrite-oldest log ring paired with a forward to `tracing`.
///
/// One of these lives on each `Client`, recording the last `capacity`
/// entries for that single connection (default 100) while every entry
/// also goes through `tracing` so a centralized log collector sees it.
/// Adapted from the broadcast-oriented `UiLogger` pattern used for
/// process-wide dashboards: here there is no broadcast channel, just a
/// per-connection ring, since each `Client` is read by at most its own
/// request task and debugging tools.
pub struct RecentLog {
    entries: RwLock<VecDeque<String>>,
    capacity: usize,
}

impl RecentLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Format a timestamped entry, forward to `tracing`, and push onto the
    /// ring, evicting the oldest entry once `capacity` is exceeded.
    pub fn push(&self, symbol: &str, msg: impl Display) {
        let entry = format!("{} [{symbol}] {msg}", chrono::Utc::now().format("%H:%M:%S%.3f"));
        tracing::info!(%symbol, "{msg}");

        if let Ok(mut entries) = self.entries.write() {
            entries.push_back(entry);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
    }

    /// Snapshot of the ring in chronological (oldest-first) order.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_records_timestamped_entry() {
        let log = RecentLog::new(10);
        log.push("--", "connection");
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].contains("[--] connection"));
    }

    #[test]
    fn push_evicts_oldest_beyond_capacity() {
        let log = RecentLog::new(3);
        for i in 0..5 {
            log.push("--", format!("entry {i}"));
        }
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot[0].contains("entry 2"));
        assert!(snapshot[2].contains("entry 4"));
    }

    #[test]
    fn snapshot_is_chronological() {
        let log = RecentLog::new(100);
        log.push("a", "first");
        log.push("b", "second");
        let snapshot = log.snapshot();
        assert!(snapshot[0].contains("first"));
        assert!(snapshot[1].contains("second"));
    }
}
