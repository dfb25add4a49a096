use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::QueueBackend;

/// In-process FIFO. Every message is handed to exactly one consumer.
#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    available: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn push(&self, message: String) -> anyhow::Result<()> {
        self.items.lock().push_back(message);
        self.available.notify_one();
        Ok(())
    }

    async fn pop(&self) -> anyhow::Result<String> {
        loop {
            let next = self.items.lock().pop_front();
            if let Some(message) = next {
                return Ok(message);
            }
            self.available.notified().await;
        }
    }

    async fn try_pop(&self) -> anyhow::Result<Option<String>> {
        Ok(self.items.lock().pop_front())
    }
}
