//! Pairing, racing and serial sequence mapping.

use std::sync::Arc;

use headwater::{Disposable, DisposeBag, Disposer, Scheduler};
use parking_lot::Mutex;

use crate::{
	deferred::{
		drive::{SerialDriver, Step},
		Deferred,
	},
	outcome::Outcome,
};

/// Which contender of a [`select`](`Deferred::select`) finished first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Picked<A, B> {
	First(A),
	Second(B),
}

impl<V: Clone + Send + 'static> Deferred<V> {
	/// Succeeds with both values once both futures succeed; fails with the
	/// first failure. The other side is cancelled on completion.
	pub fn join<U: Clone + Send + 'static>(&self, other: &Deferred<U>) -> Deferred<(V, U)> {
		self.join_with(other, true)
	}

	/// Like [`join`](`Deferred::join`); `cancel_non_completed` controls
	/// whether completing the pair releases (and thereby cancels) the side
	/// still running.
	pub fn join_with<U: Clone + Send + 'static>(
		&self,
		other: &Deferred<U>,
		cancel_non_completed: bool,
	) -> Deferred<(V, U)> {
		let first = self.clone();
		let second = other.clone();
		Deferred::new(move |resolver, mover| {
			let first = mover.move_inside(first.clone());
			let second = mover.move_inside(second.clone());
			let slots: Arc<Mutex<(Option<V>, Option<U>)>> =
				Arc::new(Mutex::new((None, None)));
			let holder = Arc::new(DisposeBag::new());

			holder.add(first.add_continuation_with(
				{
					let slots = Arc::clone(&slots);
					let resolver = resolver.clone();
					move |outcome| match outcome {
						Ok(value) => {
							let pair = {
								let mut slots = slots.lock();
								slots.0 = Some(value);
								ready_pair(&mut *slots)
							};
							if let Some(pair) = pair {
								resolver.complete(Ok(pair));
							}
						}
						Err(error) => resolver.complete(Err(error)),
					}
				},
				cancel_non_completed,
			));
			holder.add(second.add_continuation_with(
				{
					let slots = Arc::clone(&slots);
					let resolver = resolver.clone();
					move |outcome| match outcome {
						Ok(value) => {
							let pair = {
								let mut slots = slots.lock();
								slots.1 = Some(value);
								ready_pair(&mut *slots)
							};
							if let Some(pair) = pair {
								resolver.complete(Ok(pair));
							}
						}
						Err(error) => resolver.complete(Err(error)),
					}
				},
				cancel_non_completed,
			));
			Disposer::new(move || holder.dispose())
		})
	}

	/// Completes with whichever future finishes first, tagged; the loser is
	/// cancelled.
	pub fn select<U: Clone + Send + 'static>(
		&self,
		other: &Deferred<U>,
	) -> Deferred<Picked<V, U>> {
		let first = self.clone();
		let second = other.clone();
		Deferred::new(move |resolver, mover| {
			let first = mover.move_inside(first.clone());
			let second = mover.move_inside(second.clone());
			let holder = Arc::new(DisposeBag::new());
			holder.add(first.add_continuation({
				let resolver = resolver.clone();
				move |outcome| resolver.complete(outcome.map(Picked::First))
			}));
			holder.add(second.add_continuation(move |outcome| {
				resolver.complete(outcome.map(Picked::Second));
			}));
			Disposer::new(move || holder.dispose())
		})
	}
}

fn ready_pair<V: Clone, U: Clone>(slots: &mut (Option<V>, Option<U>)) -> Option<(V, U)> {
	match slots {
		(Some(first), Some(second)) => Some((first.clone(), second.clone())),
		_ => None,
	}
}

/// Succeeds with every value once all `sources` succeed, in order; fails
/// with the first failure, releasing (and thereby cancelling) the rest.
pub fn join_all<V: Clone + Send + 'static>(
	sources: impl IntoIterator<Item = Deferred<V>>,
) -> Deferred<Vec<V>> {
	let sources: Vec<Deferred<V>> = sources.into_iter().collect();
	Deferred::new(move |resolver, mover| {
		if sources.is_empty() {
			resolver.complete(Ok(Vec::new()));
			return Disposer::noop();
		}
		let slots: Arc<Mutex<Vec<Option<V>>>> =
			Arc::new(Mutex::new(vec![None; sources.len()]));
		let holder = Arc::new(DisposeBag::new());
		for (index, source) in sources.iter().enumerate() {
			let source = mover.move_inside(source.clone());
			let slots = Arc::clone(&slots);
			let resolver = resolver.clone();
			holder.add(source.add_continuation(move |outcome| match outcome {
				Ok(value) => {
					let complete = {
						let mut slots = slots.lock();
						slots[index] = Some(value);
						slots.iter().cloned().collect::<Option<Vec<V>>>()
					};
					if let Some(values) = complete {
						resolver.complete(Ok(values));
					}
				}
				Err(error) => resolver.complete(Err(error)),
			}));
		}
		Disposer::new(move || holder.dispose())
	})
}

/// Completes with the first of `sources` to finish; the rest are released
/// (and thereby cancelled).
pub fn select_all<V: Clone + Send + 'static>(
	sources: impl IntoIterator<Item = Deferred<V>>,
) -> Deferred<V> {
	let sources: Vec<Deferred<V>> = sources.into_iter().collect();
	Deferred::new(move |resolver, mover| {
		let holder = Arc::new(DisposeBag::new());
		for source in &sources {
			let source = mover.move_inside(source.clone());
			let resolver = resolver.clone();
			holder.add(source.add_continuation(move |outcome| resolver.complete(outcome)));
		}
		Disposer::new(move || holder.dispose())
	})
}

/// Runs `operation` over `items` one at a time, collecting the values and
/// short-circuiting on the first failure.
pub fn map_to_deferred<T, U>(
	items: impl IntoIterator<Item = T>,
	operation: impl Fn(T) -> Deferred<U> + Send + Sync + 'static,
) -> Deferred<Vec<U>>
where
	T: Clone + Send + Sync + 'static,
	U: Clone + Send + Sync + 'static,
{
	let items: Vec<T> = items.into_iter().collect();
	let operation = Arc::new(operation);
	Deferred::new(move |resolver, _mover| {
		let items = items.clone();
		let operation = Arc::clone(&operation);
		let collected = Arc::new(Mutex::new(Vec::new()));
		let results = Arc::clone(&collected);
		let exhausted_resolver = resolver.clone();
		let driver = SerialDriver::new(
			Scheduler::current(),
			Box::new(move |index| items.get(index).cloned().map(|item| operation(item))),
			Box::new(move |_, outcome| match outcome {
				Ok(value) => {
					collected.lock().push(value);
					Step::Continue
				}
				Err(error) => {
					resolver.complete(Err(error));
					Step::Stop
				}
			}),
			Box::new(move || {
				exhausted_resolver.complete(Ok(std::mem::take(&mut *results.lock())));
			}),
		);
		driver.start();
		driver.stop_handle()
	})
}

/// Runs `operation` over `items` one at a time, collecting every per-item
/// outcome without short-circuiting.
pub fn map_to_deferred_outcomes<T, U>(
	items: impl IntoIterator<Item = T>,
	operation: impl Fn(T) -> Deferred<U> + Send + Sync + 'static,
) -> Deferred<Vec<Outcome<U>>>
where
	T: Clone + Send + Sync + 'static,
	U: Clone + Send + Sync + 'static,
{
	let items: Vec<T> = items.into_iter().collect();
	let operation = Arc::new(operation);
	Deferred::new(move |resolver, _mover| {
		let items = items.clone();
		let operation = Arc::clone(&operation);
		let collected = Arc::new(Mutex::new(Vec::new()));
		let results = Arc::clone(&collected);
		let driver = SerialDriver::new(
			Scheduler::current(),
			Box::new(move |index| items.get(index).cloned().map(|item| operation(item))),
			Box::new(move |_, outcome| {
				collected.lock().push(outcome);
				Step::Continue
			}),
			Box::new(move || {
				resolver.complete(Ok(std::mem::take(&mut *results.lock())));
			}),
		);
		driver.start();
		driver.stop_handle()
	})
}
