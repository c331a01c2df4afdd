pub mod caching;
pub mod config;
pub mod error;

pub use caching::{ApiCache, CacheKey};
pub use config::Config;
pub use error::{DiagError, GcpApiError, Result};
