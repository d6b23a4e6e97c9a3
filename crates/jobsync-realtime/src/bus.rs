//! Best-effort fan-out of live frames.
//!
//! The bus keeps no history. A subscriber that cannot accept a frame
//! immediately is removed; it must reconnect to receive more.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use jobsync_core::types::time::utc_now;
use jobsync_entity::job::EventLevel;

use crate::message::BusEvent;
use crate::subscriber::{SubscriberHandle, SubscriberId};

/// Set of live subscribers and the broadcast entry point.
#[derive(Debug)]
pub struct EventBus {
    subscribers: DashMap<SubscriberId, Arc<SubscriberHandle>>,
    buffer_size: usize,
}

impl EventBus {
    /// Create a bus whose subscribers buffer up to `buffer_size` frames.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register a subscriber and return its handle plus the frame receiver.
    pub fn subscribe(&self) -> (Arc<SubscriberHandle>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let handle = Arc::new(SubscriberHandle::new(tx));
        self.subscribers.insert(handle.id, Arc::clone(&handle));
        debug!(subscriber_id = %handle.id, total = self.subscribers.len(), "Subscriber registered");
        (handle, rx)
    }

    /// Remove a subscriber. Unknown IDs are ignored.
    pub fn unsubscribe(&self, id: &SubscriberId) {
        if let Some((_, handle)) = self.subscribers.remove(id) {
            handle.mark_dead();
            debug!(subscriber_id = %id, "Subscriber removed");
        }
    }

    /// Serialize `event` once and offer it to every subscriber.
    ///
    /// Returns the number of subscribers that accepted the frame.
    pub fn broadcast(&self, event: &BusEvent) -> usize {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, event_type = event.event_type(), "Failed to serialize frame");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().try_deliver(&frame) {
                delivered += 1;
            } else {
                failed.push(*entry.key());
            }
        }
        for id in failed {
            self.unsubscribe(&id);
        }
        delivered
    }

    /// Log a message and broadcast it as a `log` frame.
    ///
    /// Messages that are empty after trimming are ignored.
    pub fn emit_log(&self, level: EventLevel, message: &str, meta: Option<serde_json::Value>) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }

        let meta_text = meta.as_ref().map(|m| m.to_string()).unwrap_or_default();
        match level {
            EventLevel::Info => info!(meta = %meta_text, "{message}"),
            EventLevel::Warn => warn!(meta = %meta_text, "{message}"),
            EventLevel::Error => error!(meta = %meta_text, "{message}"),
        }

        self.broadcast(&BusEvent::Log {
            level,
            message: message.to_string(),
            timestamp: utc_now(),
            meta,
        });
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
