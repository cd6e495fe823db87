//! Result transformation and lifecycle taps.

use std::{
	sync::{
		atomic::{AtomicBool, Ordering::Relaxed},
		Arc,
	},
	time::Duration,
};

use headwater::{Disposable, DisposeBag, Disposer, Scheduler};

use crate::{
	deferred::{Deferred, Resolver},
	outcome::{Aborted, DynError, Outcome},
};

impl<V: Clone + Send + 'static> Deferred<V> {
	/// Builds a future whose body consumes this one through the mover.
	pub(crate) fn derive<U: Clone + Send + 'static>(
		&self,
		wire: impl Fn(Resolver<U>, Deferred<V>) -> Disposer + Send + Sync + 'static,
	) -> Deferred<U> {
		let source = self.clone();
		Deferred::new_on(&Scheduler::current(), move |resolver, mover| {
			wire(resolver, mover.move_inside(source.clone()))
		})
	}

	/// A fresh continuation of this future: completes with the same outcome,
	/// but carries its own listeners.
	#[must_use]
	pub fn continued(&self) -> Deferred<V> {
		self.derive(|resolver, source| {
			source.add_continuation(move |outcome| resolver.complete(outcome))
		})
	}

	/// Transforms the success value.
	///
	/// ```
	/// use futures_lite::future::block_on;
	/// use rivulet::Deferred;
	///
	/// let doubled = Deferred::value(21).map(|n| n * 2);
	/// assert_eq!(block_on(doubled.into_future()).unwrap(), 42);
	/// ```
	pub fn map<U: Clone + Send + 'static>(
		&self,
		transform: impl Fn(V) -> U + Send + Sync + 'static,
	) -> Deferred<U> {
		let transform = Arc::new(transform);
		self.derive(move |resolver, source| {
			let transform = Arc::clone(&transform);
			source.add_continuation(move |outcome| {
				resolver.complete(outcome.map(|value| transform(value)));
			})
		})
	}

	/// Transforms the failure error.
	pub fn map_err(
		&self,
		transform: impl Fn(DynError) -> DynError + Send + Sync + 'static,
	) -> Deferred<V> {
		let transform = Arc::new(transform);
		self.derive(move |resolver, source| {
			let transform = Arc::clone(&transform);
			source.add_continuation(move |outcome| {
				resolver.complete(outcome.map_err(|error| transform(error)));
			})
		})
	}

	/// Transforms the whole outcome.
	pub fn map_outcome<U: Clone + Send + 'static>(
		&self,
		transform: impl Fn(Outcome<V>) -> Outcome<U> + Send + Sync + 'static,
	) -> Deferred<U> {
		let transform = Arc::new(transform);
		self.derive(move |resolver, source| {
			let transform = Arc::clone(&transform);
			source.add_continuation(move |outcome| resolver.complete(transform(outcome)))
		})
	}

	/// Continues a success with another future; failures pass through.
	pub fn and_then<U: Clone + Send + 'static>(
		&self,
		continuation: impl Fn(V) -> Deferred<U> + Send + Sync + 'static,
	) -> Deferred<U> {
		let continuation = Arc::new(continuation);
		self.then_outcome(move |outcome| match outcome {
			Ok(value) => continuation(value),
			Err(error) => Deferred::failed(error),
		})
	}

	/// Continues a failure with another future; successes pass through.
	pub fn or_else(
		&self,
		continuation: impl Fn(DynError) -> Deferred<V> + Send + Sync + 'static,
	) -> Deferred<V> {
		let continuation = Arc::new(continuation);
		self.then_outcome(move |outcome| match outcome {
			Ok(value) => Deferred::value(value),
			Err(error) => continuation(error),
		})
	}

	/// Continues any outcome with another future.
	pub fn then_outcome<U: Clone + Send + 'static>(
		&self,
		continuation: impl Fn(Outcome<V>) -> Deferred<U> + Send + Sync + 'static,
	) -> Deferred<U> {
		let continuation = Arc::new(continuation);
		self.derive(move |resolver, source| {
			let continuation = Arc::clone(&continuation);
			let holder = Arc::new(DisposeBag::new());
			let holder_ = Arc::clone(&holder);
			holder.add(source.add_continuation(move |outcome| {
				let inner = continuation(outcome);
				holder_.add(
					inner.add_continuation(move |outcome| resolver.complete(outcome)),
				);
			}));
			Disposer::new(move || holder.dispose())
		})
	}

	/// Observes the outcome; pass-through.
	pub fn on_result(
		&self,
		effect: impl Fn(&Outcome<V>) + Send + Sync + 'static,
	) -> Deferred<V> {
		let effect = Arc::new(effect);
		self.derive(move |resolver, source| {
			let effect = Arc::clone(&effect);
			source.add_continuation(move |outcome| {
				effect(&outcome);
				resolver.complete(outcome);
			})
		})
	}

	/// Observes the success value; pass-through.
	pub fn on_value(&self, effect: impl Fn(&V) + Send + Sync + 'static) -> Deferred<V> {
		self.on_result(move |outcome| {
			if let Ok(value) = outcome {
				effect(value);
			}
		})
	}

	/// Observes the failure error; pass-through.
	pub fn on_error(&self, effect: impl Fn(&DynError) + Send + Sync + 'static) -> Deferred<V> {
		self.on_result(move |outcome| {
			if let Err(error) = outcome {
				effect(error);
			}
		})
	}

	/// Invokes `effect` on completion or cancellation of the returned
	/// future, whichever comes first.
	pub fn always(&self, effect: impl Fn() + Send + Sync + 'static) -> Deferred<V> {
		let effect = Arc::new(effect);
		self.derive(move |resolver, source| {
			let fired = Arc::new(AtomicBool::new(false));
			let effect = Arc::clone(&effect);
			let handle = source.add_continuation({
				let fired = Arc::clone(&fired);
				let effect = Arc::clone(&effect);
				move |outcome| {
					if !fired.swap(true, Relaxed) {
						effect();
					}
					resolver.complete(outcome);
				}
			});
			Disposer::new(move || {
				handle.dispose();
				if !fired.swap(true, Relaxed) {
					effect();
				}
			})
		})
	}

	/// Invokes `effect` only if the returned future is cancelled before the
	/// underlying one completes.
	pub fn on_cancel(&self, effect: impl Fn() + Send + Sync + 'static) -> Deferred<V> {
		let effect = Arc::new(effect);
		self.derive(move |resolver, source| {
			let completed = Arc::new(AtomicBool::new(false));
			let effect = Arc::clone(&effect);
			let handle = source.add_continuation({
				let completed = Arc::clone(&completed);
				move |outcome| {
					completed.store(true, Relaxed);
					resolver.complete(outcome);
				}
			});
			Disposer::new(move || {
				handle.dispose();
				if !completed.load(Relaxed) {
					effect();
				}
			})
		})
	}

	/// Invokes `effect` on failure or cancellation.
	pub fn on_error_or_cancel(&self, effect: impl Fn() + Send + Sync + 'static) -> Deferred<V> {
		let effect = Arc::new(effect);
		let effect_ = Arc::clone(&effect);
		self.on_error(move |_| effect()).on_cancel(move || effect_())
	}

	/// Delays completion by `duration`; `None` is a no-op.
	pub fn delay(&self, duration: Option<Duration>) -> Deferred<V>
	where
		V: Sync,
	{
		let Some(duration) = duration else {
			return self.clone();
		};
		let scheduler = Scheduler::current();
		self.derive(move |resolver, source| {
			let scheduler = scheduler.clone();
			let holder = Arc::new(DisposeBag::new());
			let holder_ = Arc::clone(&holder);
			holder.add(source.add_continuation(move |outcome| {
				holder_.add(scheduler.disposable_run_after(duration, move || {
					resolver.complete(outcome);
				}));
			}));
			Disposer::new(move || holder.dispose())
		})
	}

	/// While the returned future is pending (after an optional `delay`),
	/// keeps the handle returned by `work` alive; it is disposed on
	/// completion or cancellation.
	pub fn perform_while(
		&self,
		delay: Option<Duration>,
		work: impl Fn() -> Disposer + Send + Sync + 'static,
	) -> Deferred<V> {
		let work = Arc::new(work);
		let scheduler = Scheduler::current();
		self.derive(move |resolver, source| {
			let work = Arc::clone(&work);
			let holder = Arc::new(DisposeBag::new());
			match delay {
				None => holder.add(work()),
				Some(delay) => {
					let working = Arc::clone(&holder);
					let work = Arc::clone(&work);
					holder.add(scheduler.disposable_run_after(delay, move || {
						working.add(work());
					}));
				}
			}
			let holder_ = Arc::clone(&holder);
			holder.add(source.add_continuation(move |outcome| {
				resolver.complete(outcome);
				holder_.dispose();
			}));
			Disposer::new(move || holder.dispose())
		})
	}

	/// Completes with `outcome` instead if the source has not completed
	/// within `after`.
	pub fn replace(&self, outcome: Outcome<V>, after: Duration) -> Deferred<V>
	where
		V: Sync,
	{
		let scheduler = Scheduler::current();
		self.derive(move |resolver, source| {
			let holder = Arc::new(DisposeBag::new());
			let replacement = outcome.clone();
			let timer_resolver = resolver.clone();
			holder.add(scheduler.disposable_run_after(after, move || {
				timer_resolver.complete(replacement);
			}));
			holder.add(source.add_continuation(move |outcome| resolver.complete(outcome)));
			Disposer::new(move || holder.dispose())
		})
	}

	/// Succeeds with `value` instead if not completed within `after`.
	pub fn succeed_after(&self, value: V, after: Duration) -> Deferred<V>
	where
		V: Sync,
	{
		self.replace(Ok(value), after)
	}

	/// Fails with `error` instead if not completed within `after`.
	pub fn fail_after(
		&self,
		error: impl std::error::Error + Send + Sync + 'static,
		after: Duration,
	) -> Deferred<V>
	where
		V: Sync,
	{
		self.replace(Err(Arc::new(error)), after)
	}

	/// Completes with [`Aborted`] (or the trigger's own error) as soon as
	/// any of `triggers` completes first.
	pub fn abort_for(
		&self,
		triggers: impl IntoIterator<Item = Deferred<()>>,
	) -> Deferred<V> {
		let triggers: Vec<Deferred<()>> = triggers.into_iter().collect();
		self.derive(move |resolver, source| {
			let holder = Arc::new(DisposeBag::new());
			for trigger in &triggers {
				let resolver = resolver.clone();
				holder.add(trigger.add_continuation(move |outcome| {
					resolver.complete(Err(match outcome {
						Ok(()) => Aborted::erased(),
						Err(error) => error,
					}));
				}));
			}
			holder.add(source.add_continuation(move |outcome| resolver.complete(outcome)));
			Disposer::new(move || holder.dispose())
		})
	}
}
