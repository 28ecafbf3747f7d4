mod in_mem;

use std::boxed::Box;

use async_trait::async_trait;

pub use in_mem::{AppInMemMarkerCache, AppInMemThrottleCache};

/// atomic counters with time-boxed expiry, over-limit requests are rejected
/// outright, never queued
#[async_trait]
pub trait AbstractThrottleCache: Send + Sync {
    /// bump the counter of the current window, `false` means the limit
    /// would be exceeded and the counter was left untouched
    async fn incr_within(&self, key: &str, limit: u32, window_secs: u32) -> bool;
}

#[async_trait]
pub trait AbstractMarkerCache: Send + Sync {
    /// `false` when the marker already existed
    async fn set_marker(&self, key: &str) -> bool;
    async fn exists(&self, key: &str) -> bool;
    /// `false` when there was nothing to delete
    async fn delete(&self, key: &str) -> bool;
}

pub fn app_cache_throttle() -> Box<dyn AbstractThrottleCache> {
    Box::new(AppInMemThrottleCache::default())
}

pub fn app_cache_marker() -> Box<dyn AbstractMarkerCache> {
    Box::new(AppInMemMarkerCache::default())
}
