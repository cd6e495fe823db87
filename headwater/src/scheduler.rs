//! Identity-compared executors with re-entrancy awareness.
//!
//! A [`Scheduler`] wraps a serialized (or concurrent) job queue. Work
//! submitted to a scheduler the current thread is already executing inside
//! runs synchronously instead of being re-queued, which is what makes
//! recursive dispatch through the reactive layers deadlock-free.

use std::{
	borrow::Cow,
	cell::RefCell,
	collections::{BinaryHeap, VecDeque},
	fmt::{self, Debug, Formatter},
	num::NonZeroUsize,
	panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
	sync::{Arc, OnceLock, Weak},
	thread::{self, ThreadId},
	time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use scopeguard::guard;

use crate::disposable::Disposer;

type Job = Box<dyn FnOnce() + Send>;

thread_local! {
	/// The scheduler inside whose asynchronous dispatch this thread runs.
	static ASYNC_CELL: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
	/// The scheduler holding this thread's current synchronous section.
	static SYNC_CELL: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
}

/// Marks `cell` with `scheduler` while `f` runs, restoring the previous
/// occupant afterwards (also across unwinds).
fn marked<R>(
	cell: &'static std::thread::LocalKey<RefCell<Option<Scheduler>>>,
	scheduler: &Scheduler,
	f: impl FnOnce() -> R,
) -> R {
	let previous = cell.with(|c| c.replace(Some(scheduler.clone())));
	let _restore = guard(previous, |previous| {
		cell.with(|c| *c.borrow_mut() = previous);
	});
	f()
}

struct QueueState {
	jobs: VecDeque<Job>,
	shutdown: bool,
}

struct Queue {
	label: Cow<'static, str>,
	state: Mutex<QueueState>,
	condvar: Condvar,
}

impl Queue {
	fn new(label: Cow<'static, str>) -> Arc<Self> {
		Arc::new(Self {
			label,
			state: Mutex::new(QueueState {
				jobs: VecDeque::new(),
				shutdown: false,
			}),
			condvar: Condvar::new(),
		})
	}

	fn push(&self, job: Job) {
		self.state.lock().jobs.push_back(job);
		self.condvar.notify_one();
	}
}

/// Owns the queue on behalf of all [`Scheduler`] clones sharing it. When the
/// last clone drops, the workers drain what is queued and exit.
struct QueueHandle {
	queue: Arc<Queue>,
	worker_ids: Vec<ThreadId>,
}

impl Drop for QueueHandle {
	fn drop(&mut self) {
		self.queue.state.lock().shutdown = true;
		self.queue.condvar.notify_all();
	}
}

fn worker_loop(queue: &Arc<Queue>, handle: &Weak<QueueHandle>) {
	loop {
		let job = {
			let mut state = queue.state.lock();
			loop {
				if let Some(job) = state.jobs.pop_front() {
					break job;
				}
				if state.shutdown {
					return;
				}
				queue.condvar.wait(&mut state);
			}
		};
		// A panicking job must not take the worker down with it; the panic
		// hook has already reported it by the time it is caught here.
		if let Some(handle) = handle.upgrade() {
			let scheduler = Scheduler {
				inner: Inner::Queue(handle),
			};
			let _ = catch_unwind(AssertUnwindSafe(|| {
				marked(&ASYNC_CELL, &scheduler, job);
			}));
		} else {
			let _ = catch_unwind(AssertUnwindSafe(job));
		}
	}
}

fn spawn_workers(queue: &Arc<Queue>, handle: &Weak<QueueHandle>, count: usize) -> Vec<ThreadId> {
	(0..count)
		.map(|_| {
			let queue = Arc::clone(queue);
			let handle = handle.clone();
			thread::Builder::new()
				.name(queue.label.to_string())
				.spawn(move || worker_loop(&queue, &handle))
				.expect("failed to spawn scheduler worker")
				.thread()
				.id()
		})
		.collect()
}

#[derive(Clone)]
enum Inner {
	Immediate,
	Queue(Arc<QueueHandle>),
}

/// An identity-comparable executor handle.
///
/// Cloning is cheap and clones compare equal. See the module documentation
/// for the immediacy rule.
#[derive(Clone)]
pub struct Scheduler {
	inner: Inner,
}

impl Debug for Scheduler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Scheduler").field(&self.label()).finish()
	}
}

impl PartialEq for Scheduler {
	fn eq(&self, other: &Self) -> bool {
		self.same(other)
	}
}

impl Eq for Scheduler {}

impl Scheduler {
	fn with_queue(label: Cow<'static, str>, workers: usize) -> Self {
		let queue = Queue::new(label);
		let handle = Arc::new_cyclic(|weak| QueueHandle {
			worker_ids: spawn_workers(&queue, weak, workers),
			queue,
		});
		Self {
			inner: Inner::Queue(handle),
		}
	}

	/// A new serialized queue.
	#[must_use]
	pub fn serial(label: impl Into<Cow<'static, str>>) -> Self {
		Self::with_queue(label.into(), 1)
	}

	/// A new concurrent queue with `workers` worker threads.
	///
	/// # Panics
	///
	/// Panics if `workers` is zero.
	#[must_use]
	pub fn concurrent(label: impl Into<Cow<'static, str>>, workers: usize) -> Self {
		assert!(workers > 0, "a queue needs at least one worker");
		Self::with_queue(label.into(), workers)
	}

	/// The sentinel that performs work in-line.
	///
	/// # Logic
	///
	/// The sentinel is only valid where callers check [`is_immediate`] and
	/// skip dispatch; its executor panics if ever asked to run a job.
	///
	/// [`is_immediate`]: `Scheduler::is_immediate`
	#[must_use]
	pub fn immediate() -> Self {
		Self {
			inner: Inner::Immediate,
		}
	}

	/// The process-wide designated serial queue.
	#[must_use]
	pub fn main() -> Self {
		static MAIN: OnceLock<Scheduler> = OnceLock::new();
		MAIN.get_or_init(|| Self::serial("main")).clone()
	}

	/// The process-wide serial background queue.
	#[must_use]
	pub fn background() -> Self {
		static BACKGROUND: OnceLock<Scheduler> = OnceLock::new();
		BACKGROUND.get_or_init(|| Self::serial("background")).clone()
	}

	/// The process-wide concurrent background queue.
	#[must_use]
	pub fn concurrent_background() -> Self {
		static CONCURRENT: OnceLock<Scheduler> = OnceLock::new();
		CONCURRENT
			.get_or_init(|| {
				let workers = thread::available_parallelism()
					.map_or(2, NonZeroUsize::get)
					.max(2);
				Self::concurrent("concurrent-background", workers)
			})
			.clone()
	}

	/// The scheduler the current thread is executing inside, resolved from
	/// the per-thread cells; falls back to [`main`](`Scheduler::main`) on the
	/// designated main worker and [`background`](`Scheduler::background`)
	/// elsewhere.
	#[must_use]
	pub fn current() -> Self {
		if let Some(scheduler) = ASYNC_CELL.with(|c| c.borrow().clone()) {
			return scheduler;
		}
		if let Some(scheduler) = SYNC_CELL.with(|c| c.borrow().clone()) {
			return scheduler;
		}
		let main = Self::main();
		if main.owns_current_thread() {
			main
		} else {
			Self::background()
		}
	}

	pub fn label(&self) -> &str {
		match &self.inner {
			Inner::Immediate => "immediate",
			Inner::Queue(handle) => &handle.queue.label,
		}
	}

	/// Object identity: clones of one scheduler compare equal, distinct
	/// queues never do.
	#[must_use]
	pub fn same(&self, other: &Self) -> bool {
		match (&self.inner, &other.inner) {
			(Inner::Immediate, Inner::Immediate) => true,
			(Inner::Queue(lhs), Inner::Queue(rhs)) => Arc::ptr_eq(lhs, rhs),
			_ => false,
		}
	}

	fn owns_current_thread(&self) -> bool {
		match &self.inner {
			Inner::Immediate => false,
			Inner::Queue(handle) => handle.worker_ids.contains(&thread::current().id()),
		}
	}

	/// Whether submitting to this scheduler right now would execute in-line:
	/// true for the immediate sentinel and whenever the current thread is
	/// already inside this scheduler.
	#[must_use]
	pub fn is_immediate(&self) -> bool {
		match &self.inner {
			Inner::Immediate => true,
			Inner::Queue(_) => {
				let inside = |cell: &RefCell<Option<Scheduler>>| {
					cell.borrow().as_ref().is_some_and(|s| s.same(self))
				};
				ASYNC_CELL.with(&inside) || SYNC_CELL.with(&inside)
			}
		}
	}

	fn submit(&self, job: Job) {
		match &self.inner {
			Inner::Immediate => panic!("the immediate scheduler cannot be dispatched to"),
			Inner::Queue(handle) => handle.queue.push(job),
		}
	}

	/// Executes `f` on this scheduler, in-line when already inside it.
	pub fn run(&self, f: impl FnOnce() + Send + 'static) {
		if self.is_immediate() {
			f();
		} else {
			self.submit(Box::new(f));
		}
	}

	/// Executes `f` on this scheduler and blocks for its result, in-line
	/// when already inside it.
	///
	/// # Logic
	///
	/// The immediacy rule is what keeps this from deadlocking against the
	/// scheduler's own worker; never circumvent it.
	///
	/// # Panics
	///
	/// Re-raises a panic from `f` on the calling thread.
	pub fn run_sync<R: Send + 'static>(&self, f: impl FnOnce() -> R + Send + 'static) -> R {
		if self.is_immediate() {
			return f();
		}
		let cell: Arc<(Mutex<Option<thread::Result<R>>>, Condvar)> =
			Arc::new((Mutex::new(None), Condvar::new()));
		let in_job = Arc::clone(&cell);
		let scheduler = self.clone();
		self.submit(Box::new(move || {
			let outcome = catch_unwind(AssertUnwindSafe(|| {
				marked(&SYNC_CELL, &scheduler, f)
			}));
			*in_job.0.lock() = Some(outcome);
			in_job.1.notify_one();
		}));
		let mut slot = cell.0.lock();
		while slot.is_none() {
			cell.1.wait(&mut slot);
		}
		match slot.take().expect("scheduler sync job vanished") {
			Ok(value) => value,
			Err(panic) => resume_unwind(panic),
		}
	}

	/// Runs `f` with this scheduler marked as the thread's synchronous
	/// section, bridging callbacks that arrive on an externally owned
	/// thread or queue.
	pub fn perform<R>(&self, f: impl FnOnce() -> R) -> R {
		marked(&SYNC_CELL, self, f)
	}

	/// Schedules `f` to run on this scheduler after `delay`.
	pub fn run_after(&self, delay: Duration, f: impl FnOnce() + Send + 'static) {
		drop(timer().schedule(self.clone(), delay, Box::new(f)));
	}

	/// Like [`run_after`](`Scheduler::run_after`), returning a handle that
	/// best-effort prevents `f` from running.
	///
	/// # Logic
	///
	/// `f` **may** still fire when disposal loses the race against the
	/// timer; callers needing strictness gate inside the callback.
	#[must_use]
	pub fn disposable_run_after(
		&self,
		delay: Duration,
		f: impl FnOnce() + Send + 'static,
	) -> Disposer {
		let slot = timer().schedule(self.clone(), delay, Box::new(f));
		let slot = Arc::downgrade(&slot);
		Disposer::new(move || {
			if let Some(slot) = slot.upgrade() {
				drop(slot.job.lock().take());
			}
		})
	}
}

struct TimerSlot {
	job: Mutex<Option<(Scheduler, Job)>>,
}

struct TimerEntry {
	deadline: Instant,
	seq: u64,
	slot: Arc<TimerSlot>,
}

impl PartialEq for TimerEntry {
	fn eq(&self, other: &Self) -> bool {
		(self.deadline, self.seq) == (other.deadline, other.seq)
	}
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for TimerEntry {
	// Reversed, so the max-heap surfaces the earliest deadline.
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		other
			.deadline
			.cmp(&self.deadline)
			.then_with(|| other.seq.cmp(&self.seq))
	}
}

struct TimerState {
	entries: BinaryHeap<TimerEntry>,
	next_seq: u64,
}

/// The shared timer source: one thread parked on the earliest deadline.
struct Timer {
	state: Mutex<TimerState>,
	condvar: Condvar,
}

impl Timer {
	fn schedule(&self, scheduler: Scheduler, delay: Duration, job: Job) -> Arc<TimerSlot> {
		let slot = Arc::new(TimerSlot {
			job: Mutex::new(Some((scheduler, job))),
		});
		{
			let mut state = self.state.lock();
			let seq = state.next_seq;
			state.next_seq += 1;
			state.entries.push(TimerEntry {
				deadline: Instant::now() + delay,
				seq,
				slot: Arc::clone(&slot),
			});
		}
		self.condvar.notify_one();
		slot
	}

	fn run(&self) {
		loop {
			let due = {
				let mut state = self.state.lock();
				loop {
					let Some(entry) = state.entries.peek() else {
						self.condvar.wait(&mut state);
						continue;
					};
					let deadline = entry.deadline;
					if deadline <= Instant::now() {
						break state.entries.pop().expect("peeked entry vanished");
					}
					self.condvar.wait_until(&mut state, deadline);
				}
			};
			let taken = due.slot.job.lock().take();
			if let Some((scheduler, job)) = taken {
				scheduler.run(job);
			}
		}
	}
}

fn timer() -> &'static Timer {
	static TIMER: OnceLock<&'static Timer> = OnceLock::new();
	TIMER.get_or_init(|| {
		let timer: &'static Timer = Box::leak(Box::new(Timer {
			state: Mutex::new(TimerState {
				entries: BinaryHeap::new(),
				next_seq: 0,
			}),
			condvar: Condvar::new(),
		}));
		thread::Builder::new()
			.name("headwater-timer".into())
			.spawn(move || timer.run())
			.expect("failed to spawn timer thread");
		timer
	})
}
