use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::Mutex;

use super::{AbstractMarkerCache, AbstractThrottleCache};

#[derive(Default)]
pub struct AppInMemThrottleCache {
    // key maps to (window sequence number, count within the window)
    _repr: Mutex<HashMap<String, (i64, u32)>>,
}

#[async_trait]
impl AbstractThrottleCache for AppInMemThrottleCache {
    async fn incr_within(&self, key: &str, limit: u32, window_secs: u32) -> bool {
        let now = Local::now().to_utc().timestamp();
        let window = now / (window_secs.max(1) as i64);
        let mut guard = self._repr.lock().await;
        let slot = guard.entry(key.to_string()).or_insert((window, 0));
        if slot.0 != window {
            *slot = (window, 0);
        }
        if slot.1 >= limit {
            false
        } else {
            slot.1 += 1;
            true
        }
    }
}

#[derive(Default)]
pub struct AppInMemMarkerCache {
    _repr: Mutex<HashSet<String>>,
}

#[async_trait]
impl AbstractMarkerCache for AppInMemMarkerCache {
    async fn set_marker(&self, key: &str) -> bool {
        let mut guard = self._repr.lock().await;
        guard.insert(key.to_string())
    }
    async fn exists(&self, key: &str) -> bool {
        let guard = self._repr.lock().await;
        guard.contains(key)
    }
    async fn delete(&self, key: &str) -> bool {
        let mut guard = self._repr.lock().await;
        guard.remove(key)
    }
}
