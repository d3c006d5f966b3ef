//! Memoization on top of [`LruCache`].
//!
//! Cache keys are strings: either produced by a caller-supplied key
//! generator or by serializing the arguments with `serde_json`. Arguments
//! that fail to serialize are computed without touching the cache.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::lru::LruCache;
use crate::config::CacheConfig;
use crate::error::ValidationError;

type KeyFn<A> = Box<dyn Fn(&A) -> Option<String> + Send + Sync>;
type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Size and lifetime of a memoizer's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoizeOptions {
    pub max_size: usize,
    pub ttl: Option<Duration>,
}

impl Default for MemoizeOptions {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for MemoizeOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_size: config.max_size,
            ttl: config.ttl(),
        }
    }
}

impl MemoizeOptions {
    fn build_cache<V>(&self) -> Result<LruCache<String, V>, ValidationError> {
        let cache = LruCache::new(self.max_size)?;
        Ok(match self.ttl {
            Some(ttl) => cache.with_ttl(ttl),
            None => cache,
        })
    }
}

fn serialized_key<A: Serialize>(args: &A) -> Option<String> {
    match serde_json::to_string(args) {
        Ok(key) => Some(key),
        Err(e) => {
            tracing::warn!(error = %e, "Arguments not serializable, bypassing memo cache");
            None
        }
    }
}

/// A synchronous function with cached results.
pub struct Memoized<A, R, F> {
    func: F,
    cache: LruCache<String, R>,
    key_fn: KeyFn<A>,
}

/// Memoize `func`, keying by the serialized arguments.
pub fn memoize<A, R, F>(
    func: F,
    options: MemoizeOptions,
) -> Result<Memoized<A, R, F>, ValidationError>
where
    A: Serialize + 'static,
    F: Fn(A) -> R,
{
    memoize_keyed(func, options, Box::new(serialized_key::<A>))
}

/// Memoize `func` with a caller-supplied cache key.
pub fn memoize_with_key<A, R, F, K>(
    func: F,
    options: MemoizeOptions,
    key_generator: K,
) -> Result<Memoized<A, R, F>, ValidationError>
where
    A: 'static,
    F: Fn(A) -> R,
    K: Fn(&A) -> String + Send + Sync + 'static,
{
    memoize_keyed(func, options, Box::new(move |args: &A| Some(key_generator(args))))
}

fn memoize_keyed<A, R, F>(
    func: F,
    options: MemoizeOptions,
    key_fn: KeyFn<A>,
) -> Result<Memoized<A, R, F>, ValidationError> {
    Ok(Memoized {
        func,
        cache: options.build_cache()?,
        key_fn,
    })
}

impl<A, R, F> Memoized<A, R, F>
where
    F: Fn(A) -> R,
    R: Clone,
{
    pub fn call(&self, args: A) -> R {
        let Some(key) = (self.key_fn)(&args) else {
            return (self.func)(args);
        };
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        let result = (self.func)(args);
        self.cache.set(key, result.clone());
        result
    }

    pub fn cache(&self) -> &LruCache<String, R> {
        &self.cache
    }
}

impl<A, R, F> fmt::Debug for Memoized<A, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized").field("cache", &self.cache).finish()
    }
}

/// An async function whose in-flight and completed calls are shared.
///
/// Concurrent calls with the same key await one underlying computation.
/// A computation that resolves to `Err` is evicted once it completes, so the
/// next call recomputes.
pub struct MemoizedAsync<A, T, E, F> {
    func: Arc<F>,
    cache: LruCache<String, SharedResult<T, E>>,
    key_fn: KeyFn<A>,
}

/// Memoize an async `func`, keying by the serialized arguments.
pub fn memoize_async<A, T, E, F, Fut>(
    func: F,
    options: MemoizeOptions,
) -> Result<MemoizedAsync<A, T, E, F>, ValidationError>
where
    A: Serialize + 'static,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    memoize_async_keyed(func, options, Box::new(serialized_key::<A>))
}

/// Memoize an async `func` with a caller-supplied cache key.
pub fn memoize_async_with_key<A, T, E, F, Fut, K>(
    func: F,
    options: MemoizeOptions,
    key_generator: K,
) -> Result<MemoizedAsync<A, T, E, F>, ValidationError>
where
    A: 'static,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    K: Fn(&A) -> String + Send + Sync + 'static,
{
    memoize_async_keyed(func, options, Box::new(move |args: &A| Some(key_generator(args))))
}

fn memoize_async_keyed<A, T, E, F>(
    func: F,
    options: MemoizeOptions,
    key_fn: KeyFn<A>,
) -> Result<MemoizedAsync<A, T, E, F>, ValidationError> {
    Ok(MemoizedAsync {
        func: Arc::new(func),
        cache: options.build_cache()?,
        key_fn,
    })
}

impl<A, T, E, F, Fut> MemoizedAsync<A, T, E, F>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    pub async fn call(&self, args: A) -> Result<T, E> {
        let Some(key) = (self.key_fn)(&args) else {
            return (self.func)(args).await;
        };

        // The candidate only invokes `func` when first polled, so a candidate
        // that loses the insert race is dropped without running anything.
        let func = Arc::clone(&self.func);
        let candidate = async move { func(args).await }.boxed().shared();
        let shared = self.cache.get_or_insert(key.clone(), candidate);

        let result = shared.clone().await;
        if result.is_err() {
            let evicted = self
                .cache
                .delete_if(&key, |cached| Shared::ptr_eq(cached, &shared));
            if evicted {
                tracing::debug!(key = %key, "Evicted failed memoized computation");
            }
        }
        result
    }

    pub fn cache(&self) -> &LruCache<String, SharedResult<T, E>> {
        &self.cache
    }
}

impl<A, T, E, F> fmt::Debug for MemoizedAsync<A, T, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizedAsync")
            .field("cache", &self.cache)
            .finish()
    }
}
