//! A FIFO gating concurrent asynchronous operations on a shared resource.

use std::sync::{
	atomic::{AtomicBool, Ordering::Relaxed},
	Arc, Weak,
};

use headwater::{Disposable, Disposer, Scheduler};
use parking_lot::Mutex;

use crate::{
	deferred::Deferred,
	event::Event,
	outcome::{Aborted, DynError},
	signal::{ReadSignal, Signal},
	Relay,
};

type ExecuteFn = Box<dyn FnOnce(&Arc<QueueItem>) + Send>;
type FailFn = Box<dyn FnOnce(DynError) + Send>;

struct QueueItem {
	execute: Mutex<Option<ExecuteFn>>,
	/// Fails the item's pending future without executing it.
	abort: Mutex<Option<FailFn>>,
	executing: AtomicBool,
	/// Handle onto the running operation's future.
	running: Mutex<Option<Disposer>>,
}

struct QueueState {
	items: Vec<Arc<QueueItem>>,
	executing: usize,
	closed: Option<DynError>,
}

struct QueueCore<R> {
	resource: Arc<R>,
	max_concurrent: usize,
	scheduler: Scheduler,
	state: Mutex<QueueState>,
	emptiness: Relay<Event<bool>>,
}

/// A work queue: enqueued operations run in insertion order, at most
/// `max_concurrent` at a time, against a shared resource.
pub struct DeferredQueue<R> {
	core: Arc<QueueCore<R>>,
}

impl<R> Clone for DeferredQueue<R> {
	fn clone(&self) -> Self {
		Self {
			core: Arc::clone(&self.core),
		}
	}
}

impl<R: Send + Sync + 'static> DeferredQueue<R> {
	/// A queue running at most `max_concurrent` operations at a time,
	/// dispatching on `scheduler`.
	///
	/// # Panics
	///
	/// Panics if `max_concurrent` is zero.
	#[must_use]
	pub fn new(resource: R, max_concurrent: usize, scheduler: &Scheduler) -> Self {
		assert!(max_concurrent > 0, "a queue needs at least one slot");
		Self::with_resource(Arc::new(resource), max_concurrent, scheduler)
	}

	/// A fully serialized queue.
	#[must_use]
	pub fn serial(resource: R, scheduler: &Scheduler) -> Self {
		Self::new(resource, 1, scheduler)
	}

	fn with_resource(resource: Arc<R>, max_concurrent: usize, scheduler: &Scheduler) -> Self {
		Self {
			core: Arc::new(QueueCore {
				resource,
				max_concurrent,
				scheduler: scheduler.clone(),
				state: Mutex::new(QueueState {
					items: Vec::new(),
					executing: 0,
					closed: None,
				}),
				emptiness: Relay::new(),
			}),
		}
	}

	/// The shared resource.
	pub fn resource(&self) -> &R {
		&self.core.resource
	}

	pub fn is_empty(&self) -> bool {
		self.core.state.lock().items.is_empty()
	}

	/// The queue's emptiness as a distinct readable signal.
	#[must_use]
	pub fn is_empty_signal(&self) -> ReadSignal<bool> {
		let core = Arc::clone(&self.core);
		ReadSignal::readable_with(
			move || core.state.lock().items.is_empty(),
			&self.core.emptiness,
		)
		.distinct()
	}

	/// Fires whenever the queue drains.
	#[must_use]
	pub fn did_become_empty(&self) -> Signal<()> {
		self.is_empty_signal()
			.plain()
			.filter(|empty| *empty)
			.map(|_| ())
	}

	/// Appends `operation`; it runs once a concurrency slot is free, in
	/// insertion order. The returned future completes with the operation's
	/// outcome; cancelling it unqueues (or releases) the operation.
	///
	/// Enqueueing on a closed queue fails immediately with the close error.
	pub fn enqueue<U: Clone + Send + Sync + 'static>(
		&self,
		operation: impl FnOnce(&R) -> Deferred<U> + Send + 'static,
	) -> Deferred<U> {
		if let Some(error) = self.core.state.lock().closed.clone() {
			return Deferred::failed(error);
		}

		let (future, resolver) = Deferred::pending();
		let core = Arc::clone(&self.core);
		let item = Arc::new(QueueItem {
			execute: Mutex::new(None),
			abort: Mutex::new(Some(Box::new({
				let resolver = resolver.clone();
				move |error| resolver.complete(Err(error))
			}))),
			executing: AtomicBool::new(false),
			running: Mutex::new(None),
		});

		let execute: ExecuteFn = Box::new({
			let core = Arc::clone(&core);
			move |item: &Arc<QueueItem>| {
				let inner = operation(&core.resource);
				// Only a weak pointer back into the queue: a slow operation
				// must not keep a torn-down queue alive.
				let slot = Arc::downgrade(item);
				let handle = inner.add_continuation(move |outcome| {
					resolver.complete(outcome);
					finish(&core, &slot);
				});
				*item.running.lock() = Some(handle);
			}
		});
		*item.execute.lock() = Some(execute);

		{
			let mut state = self.core.state.lock();
			state.items.push(Arc::clone(&item));
		}
		self.announce_emptiness();
		pump(&self.core);

		let core = Arc::clone(&self.core);
		future.attach_upstream(Disposer::new(move || release(&core, &item)));
		future
	}

	/// Runs `operation` against a child queue sharing this queue's resource.
	/// The returned future completes once the operation's future has
	/// completed *and* the child queue has drained; cancelling it closes the
	/// child with [`Aborted`].
	pub fn enqueue_batch<U: Clone + Send + Sync + 'static>(
		&self,
		operation: impl FnOnce(&DeferredQueue<R>) -> Deferred<U> + Send + 'static,
	) -> Deferred<U> {
		let child = Self::with_resource(
			Arc::clone(&self.core.resource),
			self.core.max_concurrent,
			&self.core.scheduler,
		);
		let inner = operation(&child);
		let drained = child.when_drained();
		let close_child = child.clone();
		inner
			.join_with(&drained, false)
			.map(|(value, ())| value)
			.on_cancel(move || {
				close_child.abort_queued_operations(Aborted::erased(), true);
			})
	}

	/// A future completing once the queue is empty.
	fn when_drained(&self) -> Deferred<()> {
		let (future, resolver) = Deferred::pending();
		let subscription = self
			.is_empty_signal()
			.subscribe_pulse(move |pulse| match pulse {
				crate::event::Pulse::Initial(Some(true))
				| crate::event::Pulse::Event(Event::Value(true)) => resolver.succeed(()),
				_ => {}
			});
		future.attach_upstream(subscription);
		future
	}

	/// Fails every operation that has not started yet with `error`; with
	/// `close`, additionally fails every future enqueue immediately.
	pub fn abort_queued_operations(&self, error: DynError, close: bool) {
		let aborted: Vec<Arc<QueueItem>> = {
			let mut state = self.core.state.lock();
			if close {
				state.closed = Some(error.clone());
			}
			let (keep, aborted) = std::mem::take(&mut state.items)
				.into_iter()
				.partition(|item| item.executing.load(Relaxed));
			state.items = keep;
			aborted
		};
		for item in aborted {
			if let Some(abort) = item.abort.lock().take() {
				abort(error.clone());
			}
		}
		self.announce_emptiness();
	}

	fn announce_emptiness(&self) {
		self.core
			.emptiness
			.broadcast(Event::Value(self.core.state.lock().items.is_empty()));
	}
}

/// Starts queued items while concurrency slots are free, in insertion
/// order, picking the first item not yet executing.
fn pump<R: Send + Sync + 'static>(core: &Arc<QueueCore<R>>) {
	loop {
		let item = {
			let mut state = core.state.lock();
			if state.executing >= core.max_concurrent {
				return;
			}
			let Some(item) = state
				.items
				.iter()
				.find(|item| !item.executing.load(Relaxed))
				.cloned()
			else {
				return;
			};
			item.executing.store(true, Relaxed);
			state.executing += 1;
			item
		};
		item.abort.lock().take();
		let execute = item.execute.lock().take();
		if let Some(execute) = execute {
			core.scheduler.run({
				let item = Arc::clone(&item);
				move || execute(&item)
			});
		}
	}
}

/// Removes a finished item and starts the next.
fn finish<R: Send + Sync + 'static>(core: &Arc<QueueCore<R>>, slot: &Weak<QueueItem>) {
	let became_empty = {
		let mut state = core.state.lock();
		if let Some(item) = slot.upgrade() {
			state.items.retain(|queued| !Arc::ptr_eq(queued, &item));
			state.executing -= 1;
		}
		state.items.is_empty()
	};
	core.emptiness.broadcast(Event::Value(became_empty));
	pump(core);
}

/// Cancellation path for an enqueued future: unqueue a waiting item, or
/// release a running one.
fn release<R: Send + Sync + 'static>(core: &Arc<QueueCore<R>>, item: &Arc<QueueItem>) {
	let was_queued = {
		let mut state = core.state.lock();
		if item.executing.load(Relaxed) {
			false
		} else {
			state.items.retain(|queued| !Arc::ptr_eq(queued, item));
			true
		}
	};
	if was_queued {
		core.emptiness
			.broadcast(Event::Value(core.state.lock().items.is_empty()));
		return;
	}
	let running = item.running.lock().take();
	if let Some(running) = running {
		running.dispose();
	}
}
