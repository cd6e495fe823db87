//! Bridges between [`Deferred`] and [`std::future::Future`].

use std::{
	future::Future,
	pin::Pin,
	task::{Context, Poll},
};

use futures_channel::oneshot;
use headwater::{Disposable, Disposer, Scheduler};
use pin_project::{pin_project, pinned_drop};

use crate::{
	deferred::Deferred,
	outcome::{Aborted, Outcome},
};

/// A [`Future`] over a [`Deferred`]'s outcome.
///
/// Dropping it before completion releases (and thereby may cancel) the
/// underlying deferred.
#[pin_project(PinnedDrop)]
pub struct DeferredFuture<V> {
	#[pin]
	receiver: oneshot::Receiver<Outcome<V>>,
	handle: Option<Disposer>,
}

impl<V> Future for DeferredFuture<V> {
	type Output = Outcome<V>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.project().receiver.poll(cx).map(|received| {
			received.unwrap_or_else(|oneshot::Canceled| Err(Aborted::erased()))
		})
	}
}

#[pinned_drop]
impl<V> PinnedDrop for DeferredFuture<V> {
	fn drop(self: Pin<&mut Self>) {
		if let Some(handle) = self.project().handle.take() {
			handle.dispose();
		}
	}
}

impl<V: Clone + Send + 'static> Deferred<V> {
	/// This deferred as a [`Future`].
	#[must_use]
	pub fn into_future(self) -> DeferredFuture<V> {
		let (sender, receiver) = oneshot::channel();
		let handle = self.add_continuation(move |outcome| {
			// The receiver being gone only means nobody awaits anymore.
			let _ = sender.send(outcome);
		});
		DeferredFuture {
			receiver,
			handle: Some(handle),
		}
	}

	/// Adapts a [`Future`] into a deferred by resolving it on `scheduler`.
	///
	/// The future is resolved by blocking one of `scheduler`'s workers, so
	/// pick a scheduler with workers to spare (the concurrent background
	/// scheduler, typically).
	pub fn from_future(
		scheduler: &Scheduler,
		future: impl Future<Output = Outcome<V>> + Send + 'static,
	) -> Self {
		let (deferred, resolver) = Self::pending();
		scheduler.run(move || {
			resolver.complete(futures_lite::future::block_on(future));
		});
		deferred
	}
}
