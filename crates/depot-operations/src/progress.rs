use std::sync::atomic::{AtomicU64, Ordering};

use depot_dl::manager::TransferStatus;
use depot_events::{DepotEvent, EventSinkHandle, OperationId};

/// Generates a unique operation ID.
pub fn next_op_id() -> OperationId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Turns polled transfer statuses into download events and reports the fraction only when it
/// moves.
pub struct DownloadTracker {
    events: EventSinkHandle,
    op_id: OperationId,
    pkg_name: String,
    pkg_id: String,
    started: bool,
    last_bytes: Option<u64>,
    last_fraction: Option<f32>,
}

impl DownloadTracker {
    pub fn new(events: EventSinkHandle, op_id: OperationId, pkg_name: &str, pkg_id: &str) -> Self {
        Self {
            events,
            op_id,
            pkg_name: pkg_name.to_string(),
            pkg_id: pkg_id.to_string(),
            started: false,
            last_bytes: None,
            last_fraction: None,
        }
    }

    /// Records a status. Returns the new fraction if it differs from the last one reported.
    pub fn observe(&mut self, status: &TransferStatus) -> Option<f32> {
        if !self.started && (status.total_bytes > 0 || status.bytes_so_far > 0) {
            self.started = true;
            self.events.emit(DepotEvent::DownloadStarting {
                op_id: self.op_id,
                pkg_name: self.pkg_name.clone(),
                pkg_id: self.pkg_id.clone(),
                total: status.total_bytes,
            });
        }

        if self.started && self.last_bytes != Some(status.bytes_so_far) {
            self.last_bytes = Some(status.bytes_so_far);
            self.events.emit(DepotEvent::DownloadProgress {
                op_id: self.op_id,
                pkg_name: self.pkg_name.clone(),
                pkg_id: self.pkg_id.clone(),
                current: status.bytes_so_far,
                total: status.total_bytes,
            });
        }

        let fraction = status.fraction()? as f32;
        if self.last_fraction == Some(fraction) {
            return None;
        }
        self.last_fraction = Some(fraction);
        Some(fraction)
    }

    pub fn complete(&self, status: &TransferStatus) {
        self.events.emit(DepotEvent::DownloadComplete {
            op_id: self.op_id,
            pkg_name: self.pkg_name.clone(),
            pkg_id: self.pkg_id.clone(),
            total: status.bytes_so_far.max(status.total_bytes),
        });
    }

    pub fn cancelled(&self) {
        self.events.emit(DepotEvent::DownloadCancelled {
            op_id: self.op_id,
            pkg_name: self.pkg_name.clone(),
            pkg_id: self.pkg_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use depot_dl::manager::TransferState;
    use depot_events::CollectorSink;

    use super::*;

    fn status(bytes_so_far: u64, total_bytes: u64) -> TransferStatus {
        TransferStatus {
            state: TransferState::Running,
            bytes_so_far,
            total_bytes,
        }
    }

    #[test]
    fn test_next_op_id_is_unique() {
        let id1 = next_op_id();
        let id2 = next_op_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_fraction_reported_only_on_change() {
        let collector = Arc::new(CollectorSink::default());
        let mut tracker = DownloadTracker::new(collector.clone(), 1, "App", "org.app");

        assert_eq!(tracker.observe(&status(0, 0)), None);
        assert_eq!(tracker.observe(&status(0, 100)), Some(0.0));
        assert_eq!(tracker.observe(&status(0, 100)), None);
        assert_eq!(tracker.observe(&status(50, 100)), Some(0.5));
        assert_eq!(tracker.observe(&status(50, 100)), None);
        assert_eq!(tracker.observe(&status(100, 100)), Some(1.0));
        tracker.complete(&status(100, 100));

        let events = collector.events();
        assert!(matches!(
            events[0],
            DepotEvent::DownloadStarting { total: 100, .. }
        ));
        let progress = events
            .iter()
            .filter(|e| matches!(e, DepotEvent::DownloadProgress { .. }))
            .count();
        assert_eq!(progress, 3);
        assert!(matches!(
            events.last(),
            Some(DepotEvent::DownloadComplete { total: 100, .. })
        ));
    }
}
