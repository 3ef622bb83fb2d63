mod bus;
mod event;
mod sink;

use std::sync::Arc;

pub use bus::*;
pub use event::*;
pub use sink::*;

/// Unique identifier for a running operation.
pub type OperationId = u64;

/// Shared handle to an event sink.
pub type EventSinkHandle = Arc<dyn EventSink>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink() {
        let (sink, rx) = ChannelSink::new();
        sink.emit(DepotEvent::DownloadStarting {
            op_id: 1,
            pkg_name: "F-Droid".to_string(),
            pkg_id: "org.fdroid.fdroid".to_string(),
            total: 1024,
        });
        sink.emit(DepotEvent::DownloadProgress {
            op_id: 1,
            pkg_name: "F-Droid".to_string(),
            pkg_id: "org.fdroid.fdroid".to_string(),
            current: 512,
            total: 1024,
        });

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            DepotEvent::DownloadProgress {
                current: 512,
                ..
            }
        ));
    }

    #[test]
    fn test_channel_sink_receiver_dropped() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(DepotEvent::Log {
            level: LogLevel::Info,
            message: "orphaned".to_string(),
        });
    }

    #[test]
    fn test_collector_sink() {
        let collector = Arc::new(CollectorSink::default());
        let sink: EventSinkHandle = collector.clone();
        assert!(collector.is_empty());

        sink.emit(DepotEvent::SyncProgress {
            repo_name: "fdroid".to_string(),
            index: 0,
            total: 2,
            stage: SyncStage::Fetching,
        });
        sink.emit(DepotEvent::SyncFailed {
            repo_name: "fdroid".to_string(),
            error: "HTTP 404".to_string(),
        });

        assert_eq!(collector.len(), 2);
        assert!(matches!(
            &collector.events()[1],
            DepotEvent::SyncFailed { repo_name, .. } if repo_name == "fdroid"
        ));
    }

    #[test]
    fn test_event_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NullSink>();
        assert_send_sync::<ChannelSink>();
        assert_send_sync::<CollectorSink>();
        assert_send_sync::<InstallResultBus>();
    }
}
