//! The four-variant stream type.

use std::{marker::PhantomData, sync::Arc};

use headwater::{Disposer, Relay};

use crate::{
	event::{Event, Pulse},
	kind::{Finite, Kind, Plain, Read, ReadWrite, Readable, Writable},
};

pub(crate) mod shared;
pub(crate) mod sink;
pub(crate) mod timers;

use sink::ExclusiveSink;

/// The wire-level callback: shareable and callable from any thread. All
/// re-entrancy protection lives behind it, in the subscriber's sink.
pub(crate) type PulseHandler<T> = Arc<dyn Fn(Pulse<T>) + Send + Sync>;
pub(crate) type RawSubscribe<T> = dyn Fn(PulseHandler<T>) -> Disposer + Send + Sync;
pub(crate) type Getter<T> = dyn Fn() -> T + Send + Sync;
pub(crate) type Setter<T> = dyn Fn(T) + Send + Sync;

pub(crate) struct SignalCore<T> {
	/// The subscription function. Must deliver `Initial` exactly once before
	/// any event; the subscriber's sink normalizes ordering around
	/// re-entrant installation.
	subscribe_raw: Box<RawSubscribe<T>>,
	getter: Option<Box<Getter<T>>>,
	setter: Option<Box<Setter<T>>>,
}

/// A stream of events over time, tagged with its capability [`Kind`].
///
/// Cloning shares the underlying subscription function; every clone behaves
/// identically.
///
/// Prefer the kind aliases: [`Signal`], [`ReadSignal`], [`ReadWriteSignal`],
/// [`FiniteSignal`].
pub struct CoreSignal<K: Kind, T> {
	core: Arc<SignalCore<T>>,
	_kind: PhantomData<fn(K) -> K>,
}

/// A plain stream: no current value, never terminates.
pub type Signal<T> = CoreSignal<Plain, T>;
/// A stream with a readable current value.
pub type ReadSignal<T> = CoreSignal<Read, T>;
/// A stream with a readable and writable current value.
pub type ReadWriteSignal<T> = CoreSignal<ReadWrite, T>;
/// A stream that may terminate.
pub type FiniteSignal<T> = CoreSignal<Finite, T>;

impl<K: Kind, T> Clone for CoreSignal<K, T> {
	fn clone(&self) -> Self {
		Self {
			core: Arc::clone(&self.core),
			_kind: PhantomData,
		}
	}
}

impl<K: Kind, T: Send + 'static> CoreSignal<K, T> {
	pub(crate) fn from_parts(
		subscribe_raw: impl Fn(PulseHandler<T>) -> Disposer + Send + Sync + 'static,
		getter: Option<Box<Getter<T>>>,
		setter: Option<Box<Setter<T>>>,
	) -> Self {
		Self {
			core: Arc::new(SignalCore {
				subscribe_raw: Box::new(subscribe_raw),
				getter,
				setter,
			}),
			_kind: PhantomData,
		}
	}

	pub(crate) fn from_subscribe(
		subscribe_raw: impl Fn(PulseHandler<T>) -> Disposer + Send + Sync + 'static,
	) -> Self {
		Self::from_parts(subscribe_raw, None, None)
	}

	pub(crate) fn has_getter(&self) -> bool {
		self.core.getter.is_some()
	}

	pub(crate) fn has_setter(&self) -> bool {
		self.core.setter.is_some()
	}

	pub(crate) fn read_current(&self) -> Option<T> {
		self.core.getter.as_ref().map(|getter| getter())
	}

	pub(crate) fn write_current(&self, value: T) {
		if let Some(setter) = &self.core.setter {
			setter(value);
		}
	}

	/// A getter delegating to this signal's, if any. Used by operators that
	/// keep the read capability.
	pub(crate) fn passthrough_getter(&self) -> Option<Box<Getter<T>>> {
		self.has_getter().then(|| {
			let source = self.clone();
			Box::new(move || source.read_current().expect("getter vanished")) as Box<Getter<T>>
		})
	}

	/// A setter delegating to this signal's, if any. Used by operators that
	/// keep the write capability.
	pub(crate) fn passthrough_setter(&self) -> Option<Box<Setter<T>>> {
		self.has_setter().then(|| {
			let source = self.clone();
			Box::new(move |value| source.write_current(value)) as Box<Setter<T>>
		})
	}

	/// Re-tags the same core with another kind. Callers guarantee the
	/// target kind's capabilities are present.
	pub(crate) fn retag<K2: Kind>(&self) -> CoreSignal<K2, T> {
		CoreSignal {
			core: Arc::clone(&self.core),
			_kind: PhantomData,
		}
	}

	/// Subscribes at the wire level, through the exclusive sink.
	pub(crate) fn subscribe_pulse(
		&self,
		callback: impl FnMut(Pulse<T>) + Send + 'static,
	) -> Disposer {
		let sink = ExclusiveSink::new(Box::new(callback));
		let upstream = (self.core.subscribe_raw)(Arc::new({
			let sink = sink.clone();
			move |pulse| sink.push(pulse)
		}));
		sink.attach_upstream(upstream);
		sink.into_disposer()
	}

	/// Subscribes to this signal's events.
	///
	/// The returned handle unsubscribes on disposal (and on drop). After an
	/// `End` the subscription tears itself down.
	pub fn on_event(&self, mut callback: impl FnMut(Event<T>) + Send + 'static) -> Disposer {
		self.subscribe_pulse(move |pulse| {
			if let Pulse::Event(event) = pulse {
				callback(event);
			}
		})
	}

	/// Subscribes to this signal's values, ignoring termination.
	pub fn on_value(&self, mut callback: impl FnMut(T) + Send + 'static) -> Disposer {
		self.on_event(move |event| {
			if let Event::Value(value) = event {
				callback(value);
			}
		})
	}
}

impl<K: Readable, T: Send + 'static> CoreSignal<K, T> {
	/// The current value.
	#[must_use]
	pub fn value(&self) -> T {
		(self
			.core
			.getter
			.as_ref()
			.expect("readable signal constructed without getter"))()
	}
}

impl<K: Writable, T: Send + 'static> CoreSignal<K, T> {
	/// Writes the current value and broadcasts it to subscribers.
	pub fn set_value(&self, value: T) {
		(self
			.core
			.setter
			.as_ref()
			.expect("writable signal constructed without setter"))(value);
	}
}

/// The per-subscription emitter handed to custom sources.
///
/// Events emitted before the source's subscribe closure returns are
/// delivered after the subscription handshake, in order.
pub struct Emitter<T> {
	handler: PulseHandler<T>,
}

impl<T> Clone for Emitter<T> {
	fn clone(&self) -> Self {
		Self {
			handler: Arc::clone(&self.handler),
		}
	}
}

impl<T: Send + 'static> Emitter<T> {
	pub fn emit(&self, value: T) {
		(self.handler)(Pulse::value(value));
	}

	/// Terminates the subscription gracefully. Only meaningful for finite
	/// sources.
	pub fn end(&self) {
		(self.handler)(Pulse::Event(Event::End(None)));
	}

	/// Terminates the subscription with `error`. Only meaningful for finite
	/// sources.
	pub fn end_with(&self, error: impl std::error::Error + Send + Sync + 'static) {
		(self.handler)(Pulse::Event(Event::end_with(error)));
	}
}

impl<T: Clone + Send + 'static> Signal<T> {
	/// A signal driven by a custom source: `subscribe` runs once per
	/// subscriber, receives that subscription's [`Emitter`], and returns the
	/// handle disposed on unsubscribe.
	#[must_use]
	pub fn with_subscribe(
		subscribe: impl Fn(Emitter<T>) -> Disposer + Send + Sync + 'static,
	) -> Self {
		Self::from_subscribe(move |handler| {
			handler(Pulse::Initial(None));
			subscribe(Emitter { handler })
		})
	}

	/// A plain signal fed by `relay`.
	#[must_use]
	pub fn from_relay(relay: &Relay<Event<T>>) -> Self {
		let relay = relay.clone();
		Self::from_subscribe(move |handler| {
			let subscription = relay.subscribe({
				let handler = Arc::clone(&handler);
				move |event| handler(Pulse::Event(event))
			});
			handler(Pulse::Initial(None));
			subscription
		})
	}

	/// A signal that emits `value` once to each subscriber, then holds.
	#[must_use]
	pub fn just(value: T) -> Self
	where
		T: Sync,
	{
		Self::from_subscribe(move |handler| {
			handler(Pulse::Initial(None));
			handler(Pulse::value(value.clone()));
			Disposer::noop()
		})
	}

	/// A signal that never emits.
	#[must_use]
	pub fn never() -> Self {
		Self::from_subscribe(|handler| {
			handler(Pulse::Initial(None));
			Disposer::noop()
		})
	}
}

impl<T: Clone + Send + 'static> FiniteSignal<T> {
	/// A finite signal driven by a custom source; see
	/// [`Signal::with_subscribe`]. The emitter's `end`/`end_with` terminate
	/// the subscription.
	#[must_use]
	pub fn with_subscribe(
		subscribe: impl Fn(Emitter<T>) -> Disposer + Send + Sync + 'static,
	) -> Self {
		Self::from_subscribe(move |handler| {
			handler(Pulse::Initial(None));
			subscribe(Emitter { handler })
		})
	}

	/// A finite signal fed by `relay`; a broadcast `End` terminates it.
	#[must_use]
	pub fn from_relay(relay: &Relay<Event<T>>) -> Self {
		let relay = relay.clone();
		Self::from_subscribe(move |handler| {
			let subscription = relay.subscribe({
				let handler = Arc::clone(&handler);
				move |event| handler(Pulse::Event(event))
			});
			handler(Pulse::Initial(None));
			subscription
		})
	}

	/// A finite signal that never emits.
	#[must_use]
	pub fn never() -> Self {
		Self::from_subscribe(|handler| {
			handler(Pulse::Initial(None));
			Disposer::noop()
		})
	}
}

impl<T: Clone + Send + Sync + 'static> ReadSignal<T> {
	/// A readable signal over `getter`, with changes announced on `relay`.
	///
	/// The handshake snapshot is taken by calling `getter` at subscription
	/// time, after registration, so no change is lost in between.
	#[must_use]
	pub fn readable_with(
		getter: impl Fn() -> T + Send + Sync + 'static,
		relay: &Relay<Event<T>>,
	) -> Self {
		let getter = Arc::new(getter);
		let relay = relay.clone();
		let subscribe_getter = Arc::clone(&getter);
		Self::from_parts(
			move |handler| {
				let subscription = relay.subscribe({
					let handler = Arc::clone(&handler);
					move |event| handler(Pulse::Event(event))
				});
				handler(Pulse::Initial(Some(subscribe_getter())));
				subscription
			},
			Some(Box::new(move || getter())),
			None,
		)
	}

	/// A readable signal with a fixed value.
	#[must_use]
	pub fn constant(value: T) -> Self {
		let getter_value = value.clone();
		Self::from_parts(
			move |handler| {
				handler(Pulse::Initial(Some(value.clone())));
				Disposer::noop()
			},
			Some(Box::new(move || getter_value.clone())),
			None,
		)
	}
}

impl<T: Clone + Send + Sync + 'static> ReadWriteSignal<T> {
	/// A read-write signal over `getter`/`setter`, with changes announced on
	/// `relay`. [`set_value`](`CoreSignal::set_value`) invokes the setter and
	/// broadcasts the written value.
	#[must_use]
	pub fn read_write_with(
		getter: impl Fn() -> T + Send + Sync + 'static,
		setter: impl Fn(T) + Send + Sync + 'static,
		relay: &Relay<Event<T>>,
	) -> Self {
		let getter = Arc::new(getter);
		let relay = relay.clone();
		let subscribe_relay = relay.clone();
		let subscribe_getter = Arc::clone(&getter);
		Self::from_parts(
			move |handler| {
				let subscription = subscribe_relay.subscribe({
					let handler = Arc::clone(&handler);
					move |event| handler(Pulse::Event(event))
				});
				handler(Pulse::Initial(Some(subscribe_getter())));
				subscription
			},
			Some(Box::new(move || getter())),
			Some(Box::new(move |value: T| {
				setter(value.clone());
				relay.broadcast(Event::Value(value));
			})),
		)
	}

	/// A read-write signal over interior state, the reactive equivalent of a
	/// shared cell.
	///
	/// ```
	/// use rivulet::ReadWriteSignal;
	///
	/// let count = ReadWriteSignal::cell(1);
	/// assert_eq!(count.value(), 1);
	/// count.set_value(2);
	/// assert_eq!(count.value(), 2);
	/// ```
	#[must_use]
	pub fn cell(initial: T) -> Self {
		let state = Arc::new(parking_lot::Mutex::new(initial));
		let relay = Relay::new();
		let getter_state = Arc::clone(&state);
		Self::read_write_with(
			move || getter_state.lock().clone(),
			move |value| *state.lock() = value,
			&relay,
		)
	}
}
