use async_trait::async_trait;
use warden_queue::AccessEvent;

pub mod engine;
pub mod hosts;
pub mod urlhaus;
pub mod worker;

pub use engine::BlocklistEngine;
pub use hosts::HostsBlacklist;
pub use urlhaus::UrlhausBlocker;
pub use worker::Worker;

/// A policy deciding whether an accessed domain should be blocked.
///
/// Sync blockers are consulted in order before any async one; async blockers
/// race each other and the first positive verdict wins.
#[async_trait]
pub trait Blocker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Set up whatever the blocker needs, once, before the first verdict.
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_async(&self) -> bool;

    async fn is_bad(&self, event: &AccessEvent) -> anyhow::Result<bool>;
}
