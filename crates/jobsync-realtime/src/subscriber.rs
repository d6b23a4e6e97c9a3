//! Individual live subscriber handle.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique subscriber identifier.
pub type SubscriberId = Uuid;

/// A handle to one live subscriber.
///
/// Holds the bounded sender feeding the subscriber's outbound task.
#[derive(Debug)]
pub struct SubscriberHandle {
    /// Unique subscriber ID.
    pub id: SubscriberId,
    /// Sender for serialized frames.
    sender: mpsc::Sender<String>,
    /// When the subscription was opened.
    pub connected_at: DateTime<Utc>,
    alive: AtomicBool,
}

impl SubscriberHandle {
    pub(crate) fn new(sender: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            connected_at: Utc::now(),
            alive: AtomicBool::new(true),
        }
    }

    /// Try to queue a frame without waiting.
    ///
    /// A full or closed channel marks the handle dead and returns `false`.
    pub fn try_deliver(&self, frame: &str) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.try_send(frame.to_owned()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(subscriber_id = %self.id, "Subscriber buffer full, dropping subscriber");
                self.mark_dead();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                false
            }
        }
    }

    /// Check if the subscriber is still considered reachable.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the subscriber as unreachable.
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}
