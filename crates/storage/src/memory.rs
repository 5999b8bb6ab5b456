//! In-memory snapshot history

use crate::{SnapshotSink, StorageError};
use async_trait::async_trait;
use obd_session::SessionSnapshot;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Keeps the most recent snapshots in memory, oldest dropped first
pub struct MemorySink {
    snapshots: Mutex<VecDeque<SessionSnapshot>>,
    /// Max snapshots retained
    max_snapshots: usize,
}

impl MemorySink {
    /// Create a sink retaining at most `max_snapshots` (at least one)
    pub fn new(max_snapshots: usize) -> Self {
        let max_snapshots = max_snapshots.max(1);
        Self {
            snapshots: Mutex::new(VecDeque::with_capacity(max_snapshots.min(1024))),
            max_snapshots,
        }
    }

    /// Insert a snapshot, enforcing retention
    pub fn insert(&self, snapshot: SessionSnapshot) -> Result<usize, StorageError> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        while snapshots.len() >= self.max_snapshots {
            snapshots.pop_front();
        }
        snapshots.push_back(snapshot);
        debug!("Stored snapshot #{} in memory", snapshots.len());
        Ok(snapshots.len())
    }

    /// Most recent snapshot
    pub fn latest(&self) -> Result<Option<SessionSnapshot>, StorageError> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        Ok(snapshots.back().cloned())
    }

    /// Up to `limit` snapshots, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<SessionSnapshot>, StorageError> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        Ok(snapshots.iter().rev().take(limit).cloned().collect())
    }

    /// Number of retained snapshots
    pub fn len(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl SnapshotSink for MemorySink {
    async fn store(&self, snapshot: &SessionSnapshot) -> Result<String, StorageError> {
        let count = self.insert(snapshot.clone())?;
        Ok(format!("memory[{}]", count - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use obd_protocol::LiveReading;
    use obd_session::ReadCycle;

    fn snapshot(rpm: u16, offset_s: i64) -> SessionSnapshot {
        let cycle = ReadCycle {
            live: LiveReading {
                rpm,
                ..Default::default()
            },
            dtcs: Vec::new(),
        };
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap() + Duration::seconds(offset_s);
        SessionSnapshot::new(&cycle, at)
    }

    #[tokio::test]
    async fn test_store_and_latest() {
        let sink = MemorySink::default();
        assert!(sink.is_empty());

        let location = sink.store(&snapshot(3000, 0)).await.unwrap();
        assert_eq!(location, "memory[0]");
        assert_eq!(sink.latest().unwrap().unwrap().live.rpm, 3000);
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let sink = std::sync::Arc::new(MemorySink::default());
        sink.insert(snapshot(800, 0)).unwrap();

        let holder = sink.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.snapshots.lock().unwrap();
            panic!("poison the history lock");
        })
        .join();

        assert!(matches!(sink.latest(), Err(StorageError::Lock(_))));
        assert!(matches!(sink.recent(1), Err(StorageError::Lock(_))));
        assert!(matches!(
            sink.insert(snapshot(900, 1)),
            Err(StorageError::Lock(_))
        ));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_retention_limit() {
        let sink = MemorySink::new(5);
        for i in 0..10 {
            sink.insert(snapshot(i * 100, i as i64)).unwrap();
        }

        assert_eq!(sink.len(), 5);
        let recent = sink.recent(2).unwrap();
        assert_eq!(recent[0].live.rpm, 900);
        assert_eq!(recent[1].live.rpm, 800);
    }
}
