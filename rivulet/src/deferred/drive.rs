//! The serial execution driver behind repetition and sequence combinators.
//!
//! Runs one future at a time. A future that completes synchronously flags
//! the already-active drive loop to advance instead of recursing into it,
//! which keeps the stack flat no matter how many iterations complete
//! in-line.

use std::{sync::Arc, time::Duration};

use headwater::{Disposable, Disposer, Scheduler};
use parking_lot::Mutex;

use crate::{deferred::Deferred, outcome::Outcome};

pub(crate) enum Step {
	Continue,
	ContinueAfter(Duration),
	Stop,
}

type NextFn<V> = Box<dyn Fn(usize) -> Option<Deferred<V>> + Send + Sync>;
type OutcomeFn<V> = Box<dyn Fn(usize, Outcome<V>) -> Step + Send + Sync>;
type ExhaustedFn = Box<dyn Fn() + Send + Sync>;

pub(crate) struct SerialDriver<V> {
	/// Produces the future for iteration `index`, `None` when exhausted.
	next: NextFn<V>,
	/// Consumes iteration `index`'s outcome and decides how to proceed.
	on_outcome: OutcomeFn<V>,
	/// Runs when `next` is exhausted before `on_outcome` stopped.
	on_exhausted: ExhaustedFn,
	scheduler: Scheduler,
	state: Mutex<DriveState>,
}

struct DriveState {
	index: usize,
	looping: bool,
	advance: bool,
	stopped: bool,
	current: Option<Disposer>,
	timer: Option<Disposer>,
}

impl<V: Clone + Send + 'static> SerialDriver<V> {
	pub(crate) fn new(
		scheduler: Scheduler,
		next: NextFn<V>,
		on_outcome: OutcomeFn<V>,
		on_exhausted: ExhaustedFn,
	) -> Arc<Self> {
		Arc::new(Self {
			next,
			on_outcome,
			on_exhausted,
			scheduler,
			state: Mutex::new(DriveState {
				index: 0,
				looping: false,
				advance: false,
				stopped: false,
				current: None,
				timer: None,
			}),
		})
	}

	pub(crate) fn start(self: &Arc<Self>) {
		drive(self);
	}

	/// Stops driving and releases the in-flight iteration.
	pub(crate) fn stop_handle(self: &Arc<Self>) -> Disposer {
		let driver = Arc::clone(self);
		Disposer::new(move || {
			let (current, timer) = {
				let mut state = driver.state.lock();
				state.stopped = true;
				(state.current.take(), state.timer.take())
			};
			if let Some(current) = current {
				current.dispose();
			}
			if let Some(timer) = timer {
				timer.dispose();
			}
		})
	}
}

fn drive<V: Clone + Send + 'static>(driver: &Arc<SerialDriver<V>>) {
	loop {
		let index = {
			let mut state = driver.state.lock();
			if state.stopped {
				return;
			}
			state.looping = true;
			state.advance = false;
			state.index
		};
		let Some(future) = (driver.next)(index) else {
			driver.state.lock().looping = false;
			(driver.on_exhausted)();
			return;
		};
		let handle = future.add_continuation({
			let driver = Arc::clone(driver);
			move |outcome| iteration_completed(&driver, index, outcome)
		});
		let mut state = driver.state.lock();
		if state.stopped {
			drop(state);
			handle.dispose();
			return;
		}
		state.current = Some(handle);
		state.looping = false;
		if !state.advance {
			return;
		}
	}
}

fn iteration_completed<V: Clone + Send + 'static>(
	driver: &Arc<SerialDriver<V>>,
	index: usize,
	outcome: Outcome<V>,
) {
	{
		let mut state = driver.state.lock();
		if state.stopped {
			return;
		}
		state.index = index + 1;
		state.current = None;
	}
	match (driver.on_outcome)(index, outcome) {
		Step::Stop => driver.state.lock().stopped = true,
		Step::Continue => {
			let resume = {
				let mut state = driver.state.lock();
				if state.looping {
					// A drive loop is active below us; let it advance.
					state.advance = true;
					false
				} else {
					true
				}
			};
			if resume {
				drive(driver);
			}
		}
		Step::ContinueAfter(delay) => {
			let next_round = Arc::clone(driver);
			let timer = driver
				.scheduler
				.disposable_run_after(delay, move || drive(&next_round));
			let mut state = driver.state.lock();
			if state.stopped {
				drop(state);
				timer.dispose();
			} else {
				state.timer = Some(timer);
			}
		}
	}
}
