//! Bounded, in-memory dedup set for sync-wave propagation ids.

use std::collections::{HashSet, VecDeque};

use aimaestro_primitives::PropagationId;
use tokio::sync::Mutex;

/// Default capacity per the concurrency model's shared-resource policy.
pub const DEFAULT_CAPACITY: usize = 4096;

/// A bounded LRU-ish set: `insert` evicts the oldest entry once at capacity.
/// Good enough for loop suppression across one daemon's sync waves; it does
/// not need to survive a restart.
pub struct PropagationCache {
	capacity: usize,
	state: Mutex<CacheState>,
}

struct CacheState {
	seen: HashSet<PropagationId>,
	order: VecDeque<PropagationId>,
}

impl PropagationCache {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			state: Mutex::new(CacheState { seen: HashSet::new(), order: VecDeque::new() }),
		}
	}

	/// Records `id` as seen and reports whether it was already present. A
	/// `true` result means the caller should treat this as a repeat of a
	/// wave already handled and stop propagating further.
	pub async fn seen_or_insert(&self, id: PropagationId) -> bool {
		let mut state = self.state.lock().await;
		if state.seen.contains(&id) {
			return true;
		}
		if state.order.len() >= self.capacity {
			if let Some(oldest) = state.order.pop_front() {
				state.seen.remove(&oldest);
			}
		}
		state.seen.insert(id);
		state.order.push_back(id);
		false
	}
}

impl Default for PropagationCache {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn second_insert_of_same_id_reports_seen() {
		let cache = PropagationCache::new(8);
		let id = PropagationId::new();
		assert!(!cache.seen_or_insert(id).await);
		assert!(cache.seen_or_insert(id).await);
	}

	#[tokio::test]
	async fn eviction_forgets_the_oldest_entry_past_capacity() {
		let cache = PropagationCache::new(2);
		let a = PropagationId::new();
		let b = PropagationId::new();
		let c = PropagationId::new();

		cache.seen_or_insert(a).await;
		cache.seen_or_insert(b).await;
		cache.seen_or_insert(c).await; // evicts a

		assert!(!cache.seen_or_insert(a).await); // forgotten, treated as new
	}
}
