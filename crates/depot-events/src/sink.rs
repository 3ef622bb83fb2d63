use std::sync::{
    mpsc::{self, Receiver, Sender},
    Mutex, MutexGuard,
};

use crate::DepotEvent;

/// Trait for consuming events.
///
/// Each frontend provides its own implementation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DepotEvent);
}

/// Sends events through a standard mpsc channel whose receiver can be drained by any consumer.
pub struct ChannelSink {
    sender: Sender<DepotEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<DepotEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: DepotEvent) {
        let _ = self.sender.send(event);
    }
}

/// No-op event sink for headless operation.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: DepotEvent) {}
}

/// Stores all events for later inspection.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<DepotEvent>>,
}

impl CollectorSink {
    fn lock(&self) -> MutexGuard<'_, Vec<DepotEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<DepotEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectorSink {
    fn emit(&self, event: DepotEvent) {
        self.lock().push(event);
    }
}
