use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::KeyValueStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

const CHANNEL_CAPACITY: usize = 256;

pub type ContextId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
    pub origin: ContextId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    Changed(StorageEvent),
    /// The receiver fell behind and dropped this many notifications.
    Lagged(u64),
}

pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> StorageSubscription;
}

pub struct StorageSubscription {
    receiver: broadcast::Receiver<StorageEvent>,
    own_origin: ContextId,
}

impl StorageSubscription {
    /// Waits for the next foreign change. `None` once every writer is gone.
    pub async fn next(&mut self) -> Option<FeedMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.origin == self.own_origin => continue,
                Ok(event) => return Some(FeedMessage::Changed(event)),
                Err(RecvError::Lagged(missed)) => return Some(FeedMessage::Lagged(missed)),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_next(&mut self) -> Option<FeedMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.origin == self.own_origin => continue,
                Ok(event) => return Some(FeedMessage::Changed(event)),
                Err(TryRecvError::Lagged(missed)) => return Some(FeedMessage::Lagged(missed)),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

/// One backend shared by several contexts, the way tabs of one origin share
/// local storage.
pub struct StorageChannel {
    backend: Arc<dyn KeyValueStore>,
    sender: broadcast::Sender<StorageEvent>,
    next_context: AtomicU64,
}

impl StorageChannel {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Arc<Self> {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            backend,
            sender,
            next_context: AtomicU64::new(1),
        })
    }

    pub fn open_context(self: &Arc<Self>) -> TabStore {
        TabStore {
            channel: Arc::clone(self),
            context_id: self.next_context.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// A context's view of the shared store. Writes that change a value notify
/// every other context; the writer never hears its own changes.
#[derive(Clone)]
pub struct TabStore {
    channel: Arc<StorageChannel>,
    context_id: ContextId,
}

impl TabStore {
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    fn publish(&self, key: &str, new_value: Option<&str>) {
        // Sending fails only when nobody listens, which is fine.
        let _ = self.channel.sender.send(StorageEvent {
            key: key.to_string(),
            new_value: new_value.map(ToOwned::to_owned),
            origin: self.context_id,
        });
    }
}

impl KeyValueStore for TabStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        self.channel.backend.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let previous = self.channel.backend.get(key)?;
        self.channel.backend.set(key, value)?;
        if previous.as_deref() != Some(value) {
            self.publish(key, Some(value));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        let previous = self.channel.backend.get(key)?;
        self.channel.backend.remove(key)?;
        if previous.is_some() {
            self.publish(key, None);
        }
        Ok(())
    }
}

impl ChangeFeed for TabStore {
    fn subscribe(&self) -> StorageSubscription {
        StorageSubscription {
            receiver: self.channel.sender.subscribe(),
            own_origin: self.context_id,
        }
    }
}
