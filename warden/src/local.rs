use std::time::{Duration, Instant};

/// Local state for a DNS request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    /// Whether the response was served from cache.
    pub cache_hit: bool,

    /// Whether the response was made up locally instead of resolved.
    pub synthesized: bool,

    /// When the request was started
    pub time_started: Instant,
}

impl Local {
    pub fn time_elapsed(&self) -> Duration {
        self.time_started.elapsed()
    }

    /// Answered without resolving, so there is nothing new to cache.
    pub fn answered_locally(&self) -> bool {
        self.cache_hit || self.synthesized
    }
}

impl Default for Local {
    fn default() -> Self {
        Self {
            cache_hit: false,
            synthesized: false,
            time_started: Instant::now(),
        }
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod local_tests;
