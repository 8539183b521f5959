//! Process-wide invalidation bus.
//!
//! One topic, one subscriber. Publishers push onto an unbounded channel and
//! return immediately; a dedicated worker task drains the channel in order
//! and applies each event to the [`CacheSet`].

use crate::caches::CacheSet;
use crate::event::InvalidationEvent;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum Message {
    Event(InvalidationEvent),
    Settle(oneshot::Sender<()>),
}

/// Publishing half of the invalidation bus.
///
/// Cheap to clone; every clone feeds the same subscriber. The subscriber
/// task ends once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct InvalidationBus {
    sender: mpsc::UnboundedSender<Message>,
}
impl InvalidationBus {
    /// Start the subscriber on the current Tokio runtime.
    ///
    /// The receiver is moved into the spawned task, so there is exactly one
    /// subscriber per bus for its whole lifetime.
    pub fn spawn(runtime: &Handle, caches: Arc<CacheSet>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = runtime.spawn(subscribe(receiver, caches));
        (Self { sender }, worker)
    }

    /// Fire-and-forget publication.
    ///
    /// Never blocks and never fails the caller. Returns `false` (and logs)
    /// if the subscriber is gone; the periodic sweep is the backstop for
    /// anything missed.
    pub fn publish(&self, event: InvalidationEvent) -> bool {
        tracing::trace!(kind = %event.kind, table = event.table.as_deref(), "Publishing cache invalidation");
        match self.sender.send(Message::Event(event)) {
            Ok(()) => true,
            Err(mpsc::error::SendError(Message::Event(event))) => {
                tracing::warn!(kind = %event.kind, table = event.table.as_deref(), "Cache invalidation dropped; subscriber has stopped");
                false
            },
            Err(_) => false,
        }
    }

    /// Wait until every event published before this call has been applied.
    pub async fn settle(&self) {
        let (done, applied) = oneshot::channel();
        if self.sender.send(Message::Settle(done)).is_ok() {
            // An error here means the subscriber stopped, so nothing is
            // pending any more either.
            let _ = applied.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

async fn subscribe(mut receiver: mpsc::UnboundedReceiver<Message>, caches: Arc<CacheSet>) {
    tracing::debug!("Cache invalidation subscriber started");
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Event(event) => {
                caches.apply(&event);
            },
            Message::Settle(done) => {
                let _ = done.send(());
            },
        }
    }
    tracing::debug!("Cache invalidation subscriber stopped");
}
