pub mod cache;
pub mod dotless;

pub use cache::CacheMiddleware;
pub use dotless::DotlessMiddleware;
