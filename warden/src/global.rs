use warden_cache::ResponseCache;

/// Global state shared across all requests.
pub struct Global {
    pub cache: ResponseCache,
}

impl Global {
    pub fn new(cache: ResponseCache) -> Self {
        Self { cache }
    }
}
