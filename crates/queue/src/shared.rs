use anyhow::{Context, bail};
use async_trait::async_trait;
use redis::{
    Client,
    aio::{ConnectionManager, MultiplexedConnection},
};

use crate::QueueBackend;

/// FIFO backed by a Redis list (`RPUSH` to enqueue, `BLPOP`/`LPOP` to dequeue).
///
/// `pop` blocks server side with `BLPOP 0` on its own connection, so pushes and
/// `try_pop` on the shared manager are never queued behind it. One caller should
/// own `pop` and fan messages out; concurrent pops serialize on that connection.
pub struct RedisQueue {
    client: Client,
    name: String,
    manager: Option<ConnectionManager>,
    blocking: Option<MultiplexedConnection>,
}

impl RedisQueue {
    pub fn open(url: &str, name: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::open(url).context("invalid redis url")?;
        Ok(Self {
            client,
            name: name.into(),
            manager: None,
            blocking: None,
        })
    }

    fn conn(&self) -> anyhow::Result<ConnectionManager> {
        match &self.manager {
            Some(manager) => Ok(manager.clone()),
            None => bail!("redis queue used before connect"),
        }
    }

    fn blocking_conn(&self) -> anyhow::Result<MultiplexedConnection> {
        match &self.blocking {
            Some(conn) => Ok(conn.clone()),
            None => bail!("redis queue used before connect"),
        }
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    async fn connect(&mut self) -> anyhow::Result<()> {
        let manager = ConnectionManager::new(self.client.clone())
            .await
            .context("cannot connect to redis")?;
        let blocking = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("cannot open blocking redis connection")?;
        self.manager = Some(manager);
        self.blocking = Some(blocking);
        Ok(())
    }

    async fn push(&self, message: String) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let _: i64 = redis::cmd("RPUSH")
            .arg(&self.name)
            .arg(message)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop(&self) -> anyhow::Result<String> {
        let mut conn = self.blocking_conn()?;
        loop {
            // A zero timeout blocks until a message arrives.
            let reply: Option<(String, String)> = redis::cmd("BLPOP")
                .arg(&self.name)
                .arg(0)
                .query_async(&mut conn)
                .await?;
            if let Some((_, message)) = reply {
                return Ok(message);
            }
        }
    }

    async fn try_pop(&self) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn()?;
        let message: Option<String> = redis::cmd("LPOP").arg(&self.name).query_async(&mut conn).await?;
        Ok(message)
    }
}
