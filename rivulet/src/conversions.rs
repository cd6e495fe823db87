//! Kind conversions and bridges into the async ecosystem.

use std::{
	pin::Pin,
	sync::Arc,
	task::{Context, Poll},
};

use futures_channel::mpsc;
use futures_lite::Stream;
use headwater::Disposer;
use parking_lot::Mutex;
use pin_project::pin_project;

use crate::{
	event::{Event, Pulse},
	kind::Kind,
	signal::{CoreSignal, Getter, ReadSignal, ReadWriteSignal, Signal},
};

impl<T: Send + 'static> ReadWriteSignal<T> {
	/// Drops the write capability.
	#[must_use]
	pub fn read_only(&self) -> ReadSignal<T> {
		self.retag()
	}

	/// Drops read and write capabilities.
	#[must_use]
	pub fn plain(&self) -> Signal<T> {
		self.retag()
	}
}

impl<T: Send + 'static> ReadSignal<T> {
	/// Drops the read capability.
	#[must_use]
	pub fn plain(&self) -> Signal<T> {
		self.retag()
	}

	/// Attaches a write capability backed by `set`.
	///
	/// Whether writes reach subscribers is up to `set`; typically it feeds
	/// the same source this signal reads from.
	pub fn writable(&self, set: impl Fn(T) + Send + Sync + 'static) -> ReadWriteSignal<T> {
		let source = self.clone();
		CoreSignal::from_parts(
			{
				let source = source.clone();
				move |handler| source.subscribe_pulse(move |pulse| handler(pulse))
			},
			source.passthrough_getter(),
			Some(Box::new(set)),
		)
	}
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
	/// Promotes to a readable signal that tracks the latest delivered value,
	/// starting from `initial`.
	#[must_use]
	pub fn readable(&self, initial: T) -> ReadSignal<T> {
		let cache = Arc::new(Mutex::new(initial));
		let getter_cache = Arc::clone(&cache);
		let source = self.clone();
		CoreSignal::from_parts(
			move |handler| {
				let cache = Arc::clone(&cache);
				source.subscribe_pulse(move |pulse| match pulse {
					Pulse::Initial(_) => handler(Pulse::Initial(Some(cache.lock().clone()))),
					Pulse::Event(Event::Value(value)) => {
						*cache.lock() = value.clone();
						handler(Pulse::value(value));
					}
					end => handler(end),
				})
			},
			Some(Box::new(move || getter_cache.lock().clone()) as Box<Getter<T>>),
			None,
		)
	}
}

/// A [`Stream`] of a signal's values.
///
/// Dropping the stream disposes the underlying subscription.
#[pin_project]
pub struct SignalStream<T> {
	#[pin]
	receiver: mpsc::UnboundedReceiver<T>,
	_subscription: Disposer,
}

impl<T> Stream for SignalStream<T> {
	type Item = T;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
		self.project().receiver.poll_next(cx)
	}
}

impl<K: Kind, T: Send + 'static> CoreSignal<K, T> {
	/// Bridges this signal's values into a [`Stream`].
	///
	/// The stream ends when the signal terminates (never, for non-finite
	/// kinds) or when it is dropped.
	#[must_use]
	pub fn into_stream(&self) -> SignalStream<T> {
		let (sender, receiver) = mpsc::unbounded();
		let subscription = self.on_event(move |event| match event {
			Event::Value(value) => {
				// The receiver may be gone already; that only means nobody
				// is polling anymore.
				let _ = sender.unbounded_send(value);
			}
			Event::End(_) => sender.close_channel(),
		});
		SignalStream {
			receiver,
			_subscription: subscription,
		}
	}
}
