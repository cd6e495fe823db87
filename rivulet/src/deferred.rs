//! Single-completion asynchronous values with cancellation.

use std::{
	collections::BTreeMap,
	error::Error,
	fmt::{self, Debug, Formatter},
	mem,
	sync::{Arc, Weak},
};

use headwater::{Disposable, Disposer, Key, Scheduler};
use parking_lot::Mutex;

use crate::outcome::{Aborted, DynError, Outcome};

mod bridge;
mod combinators;
mod drive;
pub(crate) mod join;
pub mod queue;
mod repeat;
mod single_flight;

pub use bridge::DeferredFuture;
pub use join::Picked;
pub use queue::DeferredQueue;
pub use single_flight::SingleFlight;

type Continuation<V> = Box<dyn FnOnce(Outcome<V>) + Send>;
type Body<V> = dyn Fn(Resolver<V>, &Mover) -> Disposer + Send + Sync;

enum State<V> {
	/// Not yet completed. Cancellable while `continuations` is empty.
	Pending {
		upstream: Option<Disposer>,
		continuations: BTreeMap<Key, Continuation<V>>,
	},
	Completed(Outcome<V>),
}

struct DeferredCore<V> {
	state: Mutex<State<V>>,
	/// Recreates an equivalent execution from the original construction
	/// closure; absent for futures that cannot be re-run (already-completed
	/// constructors, externally resolved ones).
	recreate: Option<Box<dyn Fn() -> Deferred<V> + Send + Sync>>,
}

/// A one-shot asynchronous value.
///
/// Completes at most once, with an [`Outcome`]. Continuations attached
/// after completion are invoked immediately. Cloning shares the same
/// completion.
///
/// # Cancellation
///
/// [`cancel`](`Deferred::cancel`) only acts on a future nobody listens to;
/// chaining combinators attaches listeners, so a chained future is cancelled
/// by disposing the *composite*'s continuation handle instead, which
/// cascades down the chain as each link loses its last listener.
pub struct Deferred<V> {
	core: Arc<DeferredCore<V>>,
}

impl<V> Clone for Deferred<V> {
	fn clone(&self) -> Self {
		Self {
			core: Arc::clone(&self.core),
		}
	}
}

impl<V> Debug for Deferred<V> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let state = match &*self.core.state.lock() {
			State::Pending { continuations, .. } => {
				if continuations.is_empty() {
					"pending"
				} else {
					"pending (listened)"
				}
			}
			State::Completed(Ok(_)) => "succeeded",
			State::Completed(Err(_)) => "failed",
		};
		f.debug_tuple("Deferred").field(&state).finish()
	}
}

/// The completion handle handed to a future's body.
///
/// Holds the future weakly: an execution whose future is gone completes
/// into the void.
pub struct Resolver<V> {
	core: Weak<DeferredCore<V>>,
}

impl<V> Clone for Resolver<V> {
	fn clone(&self) -> Self {
		Self {
			core: Weak::clone(&self.core),
		}
	}
}

impl<V: Clone + Send + 'static> Resolver<V> {
	pub fn complete(&self, outcome: Outcome<V>) {
		if let Some(core) = self.core.upgrade() {
			Deferred { core }.complete(outcome);
		}
	}

	pub fn succeed(&self, value: V) {
		self.complete(Ok(value));
	}

	pub fn fail(&self, error: impl Error + Send + Sync + 'static) {
		self.complete(Err(Arc::new(error)));
	}
}

/// The re-subscription helper passed to a future's body.
///
/// A future is single-shot; repetition operators obtain fresh executions by
/// consuming their upstream through the mover, which recreates it from the
/// original construction closure on repeat iterations.
pub struct Mover {
	repeating: bool,
}

impl Mover {
	pub(crate) fn direct() -> Self {
		Self { repeating: false }
	}

	pub(crate) fn repeating() -> Self {
		Self { repeating: true }
	}

	/// Consumes `future` inside the body: the future itself on the normal
	/// path, a fresh recreation on the repeat path.
	#[must_use]
	pub fn move_inside<V>(&self, future: Deferred<V>) -> Deferred<V> {
		if self.repeating {
			future.recreated()
		} else {
			future
		}
	}
}

impl<V> Deferred<V> {
	fn pending_core(recreate: Option<Box<dyn Fn() -> Deferred<V> + Send + Sync>>) -> Self {
		Self {
			core: Arc::new(DeferredCore {
				state: Mutex::new(State::Pending {
					upstream: None,
					continuations: BTreeMap::new(),
				}),
				recreate,
			}),
		}
	}

	/// An externally resolved future: complete it through the returned
	/// [`Resolver`].
	#[must_use]
	pub fn pending() -> (Self, Resolver<V>) {
		let deferred = Self::pending_core(None);
		let resolver = Resolver {
			core: Arc::downgrade(&deferred.core),
		};
		(deferred, resolver)
	}

	/// A future that never completes (but can be cancelled).
	#[must_use]
	pub fn never() -> Self {
		Self::pending_core(None)
	}

	/// A future already completed with `outcome`.
	#[must_use]
	pub fn completed(outcome: Outcome<V>) -> Self {
		Self {
			core: Arc::new(DeferredCore {
				state: Mutex::new(State::Completed(outcome)),
				recreate: None,
			}),
		}
	}

	/// A future already succeeded with `value`.
	#[must_use]
	pub fn value(value: V) -> Self {
		Self::completed(Ok(value))
	}

	/// A future already failed with `error`.
	#[must_use]
	pub fn error(error: impl Error + Send + Sync + 'static) -> Self {
		Self::completed(Err(Arc::new(error)))
	}

	/// A future already failed with an erased `error`.
	#[must_use]
	pub fn failed(error: DynError) -> Self {
		Self::completed(Err(error))
	}

	/// Whether this future has completed.
	pub fn is_completed(&self) -> bool {
		matches!(&*self.core.state.lock(), State::Completed(_))
	}

	pub(crate) fn recreated(&self) -> Self {
		match &self.core.recreate {
			Some(recreate) => recreate(),
			None => self.clone(),
		}
	}
}

impl<V: Clone + Send + 'static> Deferred<V> {
	/// Runs `body` asynchronously on the current scheduler; see
	/// [`new_on`](`Deferred::new_on`).
	pub fn new(body: impl Fn(Resolver<V>, &Mover) -> Disposer + Send + Sync + 'static) -> Self {
		Self::new_on(&Scheduler::current(), body)
	}

	/// Schedules `body` on `scheduler`. The body eventually completes the
	/// future through its [`Resolver`]; the handle it returns is the
	/// upstream cancellation, disposed on completion or cancellation.
	pub fn new_on(
		scheduler: &Scheduler,
		body: impl Fn(Resolver<V>, &Mover) -> Disposer + Send + Sync + 'static,
	) -> Self {
		Self::with_body(scheduler, Arc::new(body))
	}

	fn with_body(scheduler: &Scheduler, body: Arc<Body<V>>) -> Self {
		let recreate = {
			let scheduler = scheduler.clone();
			let body = Arc::clone(&body);
			Box::new(move || Self::with_body(&scheduler, Arc::clone(&body)))
				as Box<dyn Fn() -> Deferred<V> + Send + Sync>
		};
		let deferred = Self::pending_core(Some(recreate));
		let resolver = Resolver {
			core: Arc::downgrade(&deferred.core),
		};
		let this = deferred.clone();
		scheduler.run(move || {
			if this.is_completed() {
				return;
			}
			let upstream = body(resolver, &Mover::direct());
			this.attach_upstream(upstream);
		});
		deferred
	}

	/// Completes the future; at most the first call has any effect.
	fn complete(&self, outcome: Outcome<V>) {
		let previous = {
			let mut state = self.core.state.lock();
			if matches!(&*state, State::Completed(_)) {
				return;
			}
			mem::replace(&mut *state, State::Completed(outcome.clone()))
		};
		let State::Pending {
			upstream,
			continuations,
		} = previous
		else {
			return;
		};
		if let Some(upstream) = upstream {
			upstream.dispose();
		}
		for (_, continuation) in continuations {
			continuation(outcome.clone());
		}
	}

	pub(crate) fn attach_upstream(&self, upstream: Disposer) {
		{
			let mut state = self.core.state.lock();
			if let State::Pending {
				upstream: slot, ..
			} = &mut *state
			{
				*slot = Some(upstream);
				return;
			}
		}
		// Completed while the body was still installing.
		upstream.dispose();
	}

	/// Registers a completion callback. The returned handle removes it; when
	/// the removed callback was the last listener of a pending future, the
	/// future is cancelled.
	///
	/// The handle holds the future strongly (a chained future keeps its
	/// upstream alive); the stored callback only ever points back weakly.
	pub(crate) fn add_continuation(
		&self,
		continuation: impl FnOnce(Outcome<V>) + Send + 'static,
	) -> Disposer {
		self.add_continuation_with(continuation, true)
	}

	/// Like [`add_continuation`](`Deferred::add_continuation`), but removal
	/// never triggers cancellation when `cancel_on_removal` is false.
	pub(crate) fn add_continuation_with(
		&self,
		continuation: impl FnOnce(Outcome<V>) + Send + 'static,
		cancel_on_removal: bool,
	) -> Disposer {
		let key = Key::next();
		let mut continuation = Some(Box::new(continuation) as Continuation<V>);
		let immediate = {
			let mut state = self.core.state.lock();
			match &mut *state {
				State::Completed(outcome) => Some(outcome.clone()),
				State::Pending { continuations, .. } => {
					continuations.insert(
						key,
						continuation.take().expect("continuation consumed twice"),
					);
					None
				}
			}
		};
		if let Some(outcome) = immediate {
			(continuation.take().expect("continuation consumed twice"))(outcome);
			return Disposer::noop();
		}

		let this = self.clone();
		Disposer::new(move || {
			let cancel = {
				let mut state = this.core.state.lock();
				match &mut *state {
					State::Pending { continuations, .. } => {
						continuations.remove(&key);
						cancel_on_removal && continuations.is_empty()
					}
					State::Completed(_) => false,
				}
			};
			if cancel {
				this.cancel();
			}
		})
	}

	/// Cancels the future: a no-op if it has completed or anyone is
	/// listening; otherwise it completes with [`Aborted`] and the upstream
	/// is disposed.
	pub fn cancel(&self) {
		let proceed = matches!(
			&*self.core.state.lock(),
			State::Pending { continuations, .. } if continuations.is_empty()
		);
		if proceed {
			self.complete(Err(Aborted::erased()));
		}
	}

	/// The completed outcome, if any.
	pub fn peek(&self) -> Option<Outcome<V>> {
		match &*self.core.state.lock() {
			State::Completed(outcome) => Some(outcome.clone()),
			State::Pending { .. } => None,
		}
	}
}
