#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Cache-aside store for serialized read-API responses.
///
/// Not single-flight: two concurrent misses on the same key both invoke
/// their loaders and the last write wins. All loaders are idempotent
/// reads, so the only cost is the duplicate load.
pub struct ResponseCache {
	inner: Mutex<HashMap<String, CacheEntry>>,
	enabled: bool,
	max_entries: usize,
}

struct CacheEntry {
	value: String,
	expires_at: Instant,
}

impl ResponseCache {
	pub fn new(enabled: bool, max_entries: usize) -> Self {
		Self {
			inner: Mutex::new(HashMap::new()),
			// An entry cap of zero is the same as disabling the cache.
			enabled: enabled && max_entries > 0,
			max_entries,
		}
	}

	/// Disabled cache: every read degrades to its loader.
	#[cfg(test)]
	pub fn disabled() -> Self {
		Self::new(false, 0)
	}

	/// Return the live cached value for `key`, or run `loader`, cache its
	/// result for `ttl`, and return it.
	///
	/// Loader failures are never cached. An expired entry is evicted by
	/// the read that observes it. The map lock is not held while the
	/// loader runs.
	pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> anyhow::Result<String>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = anyhow::Result<String>>,
	{
		if !self.enabled {
			return loader().await;
		}

		{
			let mut map = self.inner.lock().await;
			match map.get(key) {
				Some(entry) if entry.expires_at > Instant::now() => {
					metrics::counter!("courier_server_cache_hits_total").increment(1);
					return Ok(entry.value.clone());
				}
				Some(_) => {
					map.remove(key);
				}
				None => {}
			}
		}

		metrics::counter!("courier_server_cache_misses_total").increment(1);
		let value = loader().await?;

		let mut map = self.inner.lock().await;
		if map.len() >= self.max_entries {
			sweep(&mut map);
			if map.len() >= self.max_entries {
				debug!(entries = map.len(), "response cache over capacity; clearing");
				map.clear();
			}
		}
		map.insert(
			key.to_string(),
			CacheEntry {
				value: value.clone(),
				expires_at: Instant::now() + ttl,
			},
		);

		Ok(value)
	}
}

fn sweep(map: &mut HashMap<String, CacheEntry>) {
	let now = Instant::now();
	map.retain(|_, entry| entry.expires_at > now);
}
