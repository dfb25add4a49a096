use std::sync::Arc;

use async_trait::async_trait;

pub mod event;
pub mod memory;
pub mod shared;

pub use event::AccessEvent;
pub use memory::MemoryQueue;
pub use shared::RedisQueue;

/// Default name of the FIFO shared by servers and workers.
pub const DEFAULT_QUEUE_NAME: &str = "messages";

/// FIFO transport carrying serialized events as opaque strings.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn connect(&mut self) -> anyhow::Result<()>;

    async fn push(&self, message: String) -> anyhow::Result<()>;

    /// Wait until a message is available and take it.
    async fn pop(&self) -> anyhow::Result<String>;

    /// Take a message if one is queued right now.
    async fn try_pop(&self) -> anyhow::Result<Option<String>>;
}

#[derive(Clone)]
pub struct EventQueue {
    backend: Arc<dyn QueueBackend>,
}

impl EventQueue {
    /// Connect `backend` and wrap it. Connection errors are returned as is.
    pub async fn open<B>(mut backend: B) -> anyhow::Result<Self>
    where
        B: QueueBackend + 'static,
    {
        backend.connect().await?;
        Ok(Self {
            backend: Arc::new(backend),
        })
    }

    pub async fn publish(&self, event: &AccessEvent) -> anyhow::Result<()> {
        self.backend.push(event.to_json()?).await
    }

    /// Next raw message, waiting for one if the queue is empty.
    pub async fn next(&self) -> anyhow::Result<String> {
        self.backend.pop().await
    }

    pub async fn try_next(&self) -> anyhow::Result<Option<String>> {
        self.backend.try_pop().await
    }
}
