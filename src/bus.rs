use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

/// Broadcast topic with bounded capacity.
/// `T` must be `Send + Sync` because we hop across threads.
#[derive(Debug, Clone)]
pub struct Topic<T> {
    tx: broadcast::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> Topic<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire and forget: with no live subscriber the message is dropped.
    pub fn publish(&self, msg: T) {
        let _ = self.tx.send(Arc::new(msg));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

/// Non-blocking receive for a synchronous consumer.
///
/// Returns `None` when nothing is queued or the topic is closed. Messages
/// dropped because the receiver lagged are logged and skipped.
pub fn poll<T>(rx: &mut broadcast::Receiver<Arc<T>>) -> Option<Arc<T>> {
    loop {
        match rx.try_recv() {
            Ok(msg) => return Some(msg),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "topic receiver lagged, messages dropped");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
        }
    }
}
