//! The per-subscription exclusive dispatcher.
//!
//! Every public subscription funnels through an [`ExclusiveSink`], which
//! serializes delivery for that subscription: an event emitted while the
//! callback is processing another event is queued and drained afterwards,
//! in FIFO order, instead of being delivered re-entrantly.

use std::{collections::VecDeque, sync::Arc};

use headwater::{Disposable, Disposer};
use parking_lot::Mutex;
use scopeguard::guard;

use crate::event::Pulse;

pub(crate) type PulseCallback<T> = Box<dyn FnMut(Pulse<T>) + Send>;

struct SinkState<T> {
	queue: VecDeque<Pulse<T>>,
	/// Events that arrived before the source's `Initial`; released right
	/// after it so the handshake always leads.
	held_back: Vec<Pulse<T>>,
	draining: bool,
	initial_seen: bool,
	ended: bool,
	disposed: bool,
	upstream: Option<Disposer>,
}

struct SinkInner<T> {
	state: Mutex<SinkState<T>>,
	/// Only ever locked by the single active drainer.
	callback: Mutex<PulseCallback<T>>,
}

pub(crate) struct ExclusiveSink<T> {
	inner: Arc<SinkInner<T>>,
}

impl<T> Clone for ExclusiveSink<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: Send + 'static> ExclusiveSink<T> {
	pub(crate) fn new(callback: PulseCallback<T>) -> Self {
		Self {
			inner: Arc::new(SinkInner {
				state: Mutex::new(SinkState {
					queue: VecDeque::new(),
					held_back: Vec::new(),
					draining: false,
					initial_seen: false,
					ended: false,
					disposed: false,
					upstream: None,
				}),
				callback: Mutex::new(callback),
			}),
		}
	}

	/// Enqueues `pulse` and drains the queue unless another frame on this
	/// subscription is already draining it.
	pub(crate) fn push(&self, pulse: Pulse<T>) {
		{
			let mut state = self.inner.state.lock();
			if state.disposed {
				return;
			}
			debug_assert!(
				!state.ended,
				"a subscription delivered an event after its end"
			);
			if state.ended {
				return;
			}
			if pulse.is_initial() {
				debug_assert!(
					!state.initial_seen,
					"a subscription delivered a second initial"
				);
				if state.initial_seen {
					return;
				}
				state.initial_seen = true;
				state.queue.push_back(pulse);
				// Anything the source fired during its own installation
				// follows the handshake, in arrival order.
				let held_back = std::mem::take(&mut state.held_back);
				state.queue.extend(held_back);
			} else if state.initial_seen {
				state.queue.push_back(pulse);
			} else {
				state.held_back.push(pulse);
				return;
			}
			if state.draining {
				return;
			}
			state.draining = true;
		}
		self.drain();
	}

	fn drain(&self) {
		let inner = &self.inner;
		let _not_draining = guard((), |()| {
			inner.state.lock().draining = false;
		});
		loop {
			let pulse = {
				let mut state = inner.state.lock();
				if state.disposed {
					state.queue.clear();
					break;
				}
				let Some(pulse) = state.queue.pop_front() else {
					break;
				};
				if pulse.is_end() {
					// Marked before delivery: anything pushed from inside
					// the terminal callback is an after-end violation.
					state.ended = true;
				}
				pulse
			};
			let is_end = pulse.is_end();
			(inner.callback.lock())(pulse);
			if is_end {
				self.release_upstream();
			}
		}
	}

	/// Hands the sink the upstream handle it tears down on end or disposal.
	pub(crate) fn attach_upstream(&self, upstream: Disposer) {
		{
			let mut state = self.inner.state.lock();
			if !(state.disposed || state.ended) {
				state.upstream = Some(upstream);
				return;
			}
		}
		// Ended (or disposed) before the source finished installing.
		upstream.dispose();
	}

	fn release_upstream(&self) {
		let upstream = self.inner.state.lock().upstream.take();
		if let Some(upstream) = upstream {
			upstream.dispose();
		}
		// The callback chain may pin operator state; cut it loose. The slot
		// is busy exactly when this runs from inside the callback itself (a
		// re-entrant dispose); the delivery in flight then finishes on the
		// old chain.
		if let Some(mut callback) = self.inner.callback.try_lock() {
			*callback = Box::new(|_| {});
		}
	}

	fn dispose(&self) {
		{
			let mut state = self.inner.state.lock();
			if state.disposed {
				return;
			}
			state.disposed = true;
			state.queue.clear();
			state.held_back.clear();
		}
		self.release_upstream();
	}

	/// The subscriber's handle. No further deliveries begin once `dispose`
	/// returns; a delivery already in flight completes.
	pub(crate) fn into_disposer(self) -> Disposer {
		Disposer::new(move || self.dispose())
	}
}
