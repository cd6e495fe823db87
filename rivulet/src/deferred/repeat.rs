//! Repetition combinators.

use std::{mem, sync::Arc, time::Duration};

use headwater::{Disposer, Scheduler};
use parking_lot::Mutex;

use crate::{
	deferred::{
		drive::{SerialDriver, Step},
		Deferred, Mover,
	},
	outcome::{DynError, Outcome},
};

/// Produces iteration futures for a repetition driver: the body's own
/// upstream on the first round, recreations on every later round.
fn iteration_source<V: Clone + Send + 'static>(
	first: Deferred<V>,
	template: Deferred<V>,
) -> impl Fn(usize) -> Deferred<V> + Send + Sync {
	let first = Mutex::new(Some(first));
	move |index| {
		if index == 0 {
			first
				.lock()
				.take()
				.unwrap_or_else(|| template.recreated())
		} else {
			Mover::repeating().move_inside(template.clone())
		}
	}
}

impl<V: Clone + Send + Sync + 'static> Deferred<V> {
	/// Re-runs the future while `predicate` approves its outcome, waiting
	/// `delay` between rounds and repeating at most `max_repetitions` times;
	/// completes with the last outcome.
	///
	/// Synchronously completing rounds are driven iteratively, so tight
	/// repetition cannot overflow the stack.
	pub fn on_result_repeat(
		&self,
		delay: Option<Duration>,
		max_repetitions: Option<usize>,
		predicate: impl Fn(&Outcome<V>) -> bool + Send + Sync + 'static,
	) -> Deferred<V> {
		let predicate = Arc::new(predicate);
		let source = self.clone();
		Deferred::new(move |resolver, mover| {
			let template = source.clone();
			let next = iteration_source(mover.move_inside(source.clone()), template);
			let predicate = Arc::clone(&predicate);
			let driver = SerialDriver::new(
				Scheduler::current(),
				Box::new(move |index| Some(next(index))),
				Box::new(move |index, outcome| {
					let may_repeat =
						max_repetitions.map_or(true, |max| index < max);
					if may_repeat && predicate(&outcome) {
						match delay {
							Some(delay) => Step::ContinueAfter(delay),
							None => Step::Continue,
						}
					} else {
						resolver.complete(outcome);
						Step::Stop
					}
				}),
				Box::new(|| {}),
			);
			driver.start();
			driver.stop_handle()
		})
	}

	/// Re-runs the future while it fails with an error `predicate` approves.
	pub fn on_error_repeat(
		&self,
		delay: Option<Duration>,
		max_repetitions: Option<usize>,
		predicate: impl Fn(&DynError) -> bool + Send + Sync + 'static,
	) -> Deferred<V> {
		self.on_result_repeat(delay, max_repetitions, move |outcome| {
			matches!(outcome, Err(error) if predicate(error))
		})
	}

	/// Runs the future `runs` times in sequence, waiting `delay` between
	/// rounds, and completes with the successful values in order.
	pub fn repeat_and_collect(
		&self,
		runs: usize,
		delay: Option<Duration>,
	) -> Deferred<Vec<V>> {
		let source = self.clone();
		Deferred::new(move |resolver, mover| {
			if runs == 0 {
				resolver.complete(Ok(Vec::new()));
				return Disposer::noop();
			}
			let template = source.clone();
			let next = iteration_source(mover.move_inside(source.clone()), template);
			let collected = Arc::new(Mutex::new(Vec::new()));
			let driver = SerialDriver::new(
				Scheduler::current(),
				Box::new(move |index| (index < runs).then(|| next(index))),
				Box::new(move |index, outcome| {
					if let Ok(value) = outcome {
						collected.lock().push(value);
					}
					if index + 1 == runs {
						resolver.complete(Ok(mem::take(&mut *collected.lock())));
						Step::Stop
					} else {
						match delay {
							Some(delay) => Step::ContinueAfter(delay),
							None => Step::Continue,
						}
					}
				}),
				Box::new(|| {}),
			);
			driver.start();
			driver.stop_handle()
		})
	}
}
