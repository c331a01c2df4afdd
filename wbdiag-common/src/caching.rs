//! Memoization of API query results for one execution context.

use crate::error::{DiagError, Result};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

type CachedValue = Arc<dyn Any + Send + Sync>;
type Slot = Arc<OnceCell<CachedValue>>;

/// Identity of one cached call: the query function plus its argument tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    function: &'static str,
    args: Vec<String>,
}

impl CacheKey {
    pub fn new<I, S>(function: &'static str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            function,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Per-context call cache. Clones share the same storage.
///
/// Only successful results are stored; a failed computation leaves the slot empty so
/// the next caller tries again. Concurrent callers of one key wait on a single
/// computation.
#[derive(Clone, Default)]
pub struct ApiCache {
    slots: Arc<Mutex<HashMap<CacheKey, Slot>>>,
}

impl ApiCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_insert<T, F, Fut>(&self, key: CacheKey, compute: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(key.clone()).or_default().clone()
        };

        if slot.initialized() {
            tracing::debug!("cache hit for {:?}", key);
        }

        let value = slot
            .get_or_try_init(|| async {
                let v = compute().await?;
                Ok::<CachedValue, DiagError>(Arc::new(v))
            })
            .await?;

        (**value).downcast_ref::<T>().cloned().ok_or_else(|| {
            DiagError::Internal(format!("cached value for {:?} has an unexpected type", key))
        })
    }

    /// Number of keys holding a stored value.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|s| s.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
