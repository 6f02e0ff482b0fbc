//! Global indexing slot allocator: the only global critical section shared
//! by every agent's Subconscious on a host.
//!
//! `MAX_CONCURRENT_INDEX = 1` by default. Acquisition is FIFO and release is
//! automatic: [`IndexingSlot`] releases its permit on `Drop`, so a panicking
//! or early-returning caller can never leak a held slot.

use std::sync::Arc;

use aimaestro_primitives::AgentId;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default concurrency cap per the component design.
pub const DEFAULT_MAX_CONCURRENT_INDEX: usize = 1;

/// Shared handle agents use to throttle indexing work against one another.
#[derive(Clone)]
pub struct IndexingSlotAllocator {
	semaphore: Arc<Semaphore>,
}

impl IndexingSlotAllocator {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			semaphore: Arc::new(Semaphore::new(capacity.max(1))),
		}
	}

	/// Waits in FIFO order for a free slot. The returned guard releases the
	/// slot when dropped, whether that happens at the end of a normal
	/// indexing pass or partway through on error.
	pub async fn acquire(&self, agent_id: AgentId) -> IndexingSlot {
		let permit = self.semaphore.clone().acquire_owned().await.expect("indexing slot semaphore is never closed");
		tracing::debug!(%agent_id, "acquired indexing slot");
		IndexingSlot { _permit: permit, agent_id }
	}
}

impl Default for IndexingSlotAllocator {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_CONCURRENT_INDEX)
	}
}

/// RAII guard for one held indexing slot.
pub struct IndexingSlot {
	_permit: OwnedSemaphorePermit,
	agent_id: AgentId,
}

impl Drop for IndexingSlot {
	fn drop(&mut self) {
		tracing::debug!(agent_id = %self.agent_id, "released indexing slot");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn second_acquire_waits_for_first_release() {
		let allocator = IndexingSlotAllocator::new(1);
		let agent = AgentId::new();

		let first = allocator.acquire(agent).await;
		let allocator2 = allocator.clone();
		let handle = tokio::spawn(async move {
			let _second = allocator2.acquire(agent).await;
		});

		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		assert!(!handle.is_finished());

		drop(first);
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn slot_releases_even_if_holder_task_panics() {
		let allocator = IndexingSlotAllocator::new(1);
		let agent = AgentId::new();

		let allocator2 = allocator.clone();
		let handle = tokio::spawn(async move {
			let _slot = allocator2.acquire(agent).await;
			panic!("simulated failure mid-index");
		});
		let _ = handle.await;

		let acquired = tokio::time::timeout(std::time::Duration::from_millis(200), allocator.acquire(agent)).await;
		assert!(acquired.is_ok());
	}
}
