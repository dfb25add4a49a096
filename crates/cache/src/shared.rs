use anyhow::{Context, bail};
use async_trait::async_trait;
use bytes::Bytes;
use redis::{Client, aio::ConnectionManager};

use crate::CacheBackend;

/// Cache backend stored in Redis, shared by every server and worker process.
///
/// Values are stored hex encoded, so entries stay readable with `redis-cli`.
pub struct RedisBackend {
    client: Client,
    manager: Option<ConnectionManager>,
}

impl RedisBackend {
    /// Parse the connection URL. No connection is made until [`CacheBackend::connect`].
    pub fn open(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url).context("invalid redis url")?;
        Ok(Self { client, manager: None })
    }

    fn conn(&self) -> anyhow::Result<ConnectionManager> {
        match &self.manager {
            Some(manager) => Ok(manager.clone()),
            None => bail!("redis cache backend used before connect"),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn connect(&mut self) -> anyhow::Result<()> {
        let manager = ConnectionManager::new(self.client.clone())
            .await
            .context("cannot connect to redis")?;
        self.manager = Some(manager);
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        let mut conn = self.conn()?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        let Some(value) = value else {
            return Ok(None);
        };

        match decode_value(&value) {
            Some(bytes) => Ok(Some(bytes)),
            None => {
                tracing::warn!(key, "ignoring cache entry that is not hex encoded");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: u64) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(hex::encode(&value));
        if ttl > 0 {
            cmd.arg("EX").arg(ttl);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }
}

fn decode_value(value: &str) -> Option<Bytes> {
    hex::decode(value).ok().map(Bytes::from)
}
