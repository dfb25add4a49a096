use std::sync::Arc;

use anyhow::anyhow;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use warden_queue::{AccessEvent, EventQueue};

use crate::BlocklistEngine;

/// Consumer loops feeding queued access events to the engine.
pub struct Worker {
    engine: Arc<BlocklistEngine>,
    queue: EventQueue,
    workers: usize,
}

impl Worker {
    pub fn new(engine: Arc<BlocklistEngine>, queue: EventQueue, workers: usize) -> Self {
        Self {
            engine,
            queue,
            workers: workers.max(1),
        }
    }

    /// Consume forever. Returns only when the queue transport fails.
    ///
    /// A single feeder waits on the queue and hands messages to the handlers
    /// over a bounded channel.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(workers = self.workers, "worker waiting for events");

        let (tx, rx) = mpsc::channel::<String>(self.workers);
        let rx = Arc::new(Mutex::new(rx));

        let mut loops = JoinSet::new();
        loops.spawn(feed(self.queue.clone(), tx));
        for _ in 0..self.workers {
            loops.spawn(consume(self.engine.clone(), rx.clone()));
        }

        match loops.join_next().await {
            Some(Ok(result)) => result,
            Some(Err(e)) => Err(anyhow!("consumer task died: {e}")),
            None => Ok(()),
        }
    }

    /// Process what is queued right now, then return the number of messages seen.
    pub async fn drain(&self) -> anyhow::Result<usize> {
        let mut loops = JoinSet::new();
        for _ in 0..self.workers {
            let engine = self.engine.clone();
            let queue = self.queue.clone();
            loops.spawn(async move {
                let mut seen = 0usize;
                while let Some(raw) = queue.try_next().await? {
                    handle_message(&engine, &raw).await;
                    seen += 1;
                }
                Ok::<_, anyhow::Error>(seen)
            });
        }

        let mut total = 0;
        while let Some(joined) = loops.join_next().await {
            total += joined.map_err(|e| anyhow!("consumer task died: {e}"))??;
        }

        tracing::info!(messages = total, "queue drained");
        Ok(total)
    }
}

async fn feed(queue: EventQueue, tx: mpsc::Sender<String>) -> anyhow::Result<()> {
    loop {
        let raw = queue.next().await?;
        if tx.send(raw).await.is_err() {
            return Ok(());
        }
    }
}

async fn consume(engine: Arc<BlocklistEngine>, rx: Arc<Mutex<mpsc::Receiver<String>>>) -> anyhow::Result<()> {
    loop {
        // The lock is released before handling so other consumers can take the next message.
        let Some(raw) = rx.lock().await.recv().await else {
            return Ok(());
        };
        handle_message(&engine, &raw).await;
    }
}

/// Returns whether the event led to a block. Malformed messages are dropped.
pub async fn handle_message(engine: &BlocklistEngine, raw: &str) -> bool {
    match AccessEvent::from_json(raw) {
        Ok(event) => engine.process(&event).await,
        Err(e) => {
            tracing::warn!(message = raw, error = %e, "dropping malformed queue message");
            false
        }
    }
}
