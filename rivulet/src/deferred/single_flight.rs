//! Coalescing concurrent requests for one asynchronous task.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::deferred::Deferred;

/// A one-slot task coalescer: while a task is pending, every caller gets a
/// continuation of the same underlying future; once it completes, the slot
/// empties and the next caller starts fresh.
///
/// Returned futures are always fresh continuations, so cancelling one
/// caller's future never cancels the others'.
pub struct SingleFlight<V> {
	slot: Arc<Mutex<Option<Deferred<V>>>>,
}

impl<V> Clone for SingleFlight<V> {
	fn clone(&self) -> Self {
		Self {
			slot: Arc::clone(&self.slot),
		}
	}
}

impl<V> Default for SingleFlight<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V> SingleFlight<V> {
	#[must_use]
	pub fn new() -> Self {
		Self {
			slot: Arc::new(Mutex::new(None)),
		}
	}
}

impl<V: Clone + Send + Sync + 'static> SingleFlight<V> {
	/// Joins the in-flight task, or starts one with `produce`.
	pub fn perform(&self, produce: impl FnOnce() -> Deferred<V>) -> Deferred<V> {
		if let Some(active) = &*self.slot.lock() {
			return active.continued();
		}
		// `produce` runs outside the lock; it may well re-enter.
		let started = produce();
		let mut slot = self.slot.lock();
		if let Some(active) = &*slot {
			// Lost the race to a re-entrant or concurrent caller.
			started.cancel();
			return active.continued();
		}
		*slot = Some(started.clone());
		drop(slot);

		// The slot clears itself on completion. This keeps one listener on
		// the stored future for its whole pendency, which also pins it
		// against direct cancellation.
		let slot = Arc::clone(&self.slot);
		started
			.add_continuation(move |_| {
				*slot.lock() = None;
			})
			.defuse();

		started.continued()
	}

	/// Whether a task is currently pending.
	pub fn is_performing(&self) -> bool {
		self.slot.lock().is_some()
	}
}
