//! Single-shot cancellation handles and their aggregate.

use std::{any::Any, mem, sync::Arc};

use parking_lot::Mutex;

/// An owned cancellation handle.
///
/// # Logic
///
/// `dispose` **must** be idempotent.
/// Implementations **must** release their wrapped effect exactly once,
/// whether through `dispose` or through [`Drop`].
pub trait Disposable: Send + Sync {
	fn dispose(&self);
}

impl<D: ?Sized + Disposable> Disposable for Arc<D> {
	fn dispose(&self) {
		(**self).dispose();
	}
}

impl<D: ?Sized + Disposable> Disposable for Box<D> {
	fn dispose(&self) {
		(**self).dispose();
	}
}

/// The zero-cost no-op handle.
pub struct NilDisposer;

impl Disposable for NilDisposer {
	fn dispose(&self) {}
}

type Action = Box<dyn FnOnce() + Send>;

/// Wraps a closure that is invoked at most once, by whichever of `dispose`
/// or [`Drop`] happens first.
pub struct Disposer {
	action: Mutex<Option<Action>>,
}

impl Disposer {
	pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
		Self {
			action: Mutex::new(Some(Box::new(action))),
		}
	}

	/// A handle with nothing to release.
	pub fn noop() -> Self {
		Self {
			action: Mutex::new(None),
		}
	}

	/// Consumes the handle without running its action; whatever it guards
	/// stays live for good.
	pub fn defuse(self) {
		drop(self.action.lock().take());
	}
}

impl Disposable for Disposer {
	fn dispose(&self) {
		// The closure leaves the lock before it runs, so a re-entrant
		// `dispose` from inside it finds an empty slot instead of the mutex.
		let action = self.action.lock().take();
		if let Some(action) = action {
			action();
		}
	}
}

impl Drop for Disposer {
	fn drop(&mut self) {
		self.dispose();
	}
}

/// Retains a value until disposed.
struct Held(Mutex<Option<Box<dyn Any + Send>>>);

impl Disposable for Held {
	fn dispose(&self) {
		drop(self.0.lock().take());
	}
}

/// An ordered collection of [`Disposable`]s, disposed together.
///
/// The bag may be re-populated after `dispose` and disposed again.
#[derive(Default)]
pub struct DisposeBag {
	disposables: Mutex<Vec<Box<dyn Disposable>>>,
}

impl DisposeBag {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.disposables.lock().is_empty()
	}

	/// Appends `disposable`, to be disposed with the bag.
	pub fn add(&self, disposable: impl Disposable + 'static) {
		self.disposables.lock().push(Box::new(disposable));
	}

	/// Retains `value` until the next `dispose`.
	pub fn hold(&self, value: impl Any + Send + 'static) {
		self.add(Held(Mutex::new(Some(Box::new(value)))));
	}

	/// Creates a child bag that is disposed with (and registered in) `self`.
	pub fn inner_bag(&self) -> Arc<DisposeBag> {
		let inner = Arc::new(DisposeBag::new());
		self.add(Arc::clone(&inner));
		inner
	}
}

impl Disposable for DisposeBag {
	/// Disposes all entries in insertion order.
	///
	/// # Logic
	///
	/// The list is snapshotted and emptied under the lock, then disposed
	/// outside it. Re-entrant calls during disposal observe an empty bag.
	fn dispose(&self) {
		let snapshot = mem::take(&mut *self.disposables.lock());
		for disposable in snapshot {
			disposable.dispose();
		}
	}
}

impl Drop for DisposeBag {
	fn drop(&mut self) {
		self.dispose();
	}
}
