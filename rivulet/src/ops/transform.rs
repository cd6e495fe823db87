//! Stateless (and near-stateless) element transforms.

use std::sync::{Arc, Weak};

use crate::{
	event::{Event, Pulse},
	kind::{Finite, Kind},
	outcome::DynError,
	signal::{CoreSignal, Getter, ReadWriteSignal, Signal},
};

impl<K: Kind, T: Send + 'static> CoreSignal<K, T> {
	/// Transforms every value (and the readable snapshot) with `transform`.
	pub fn map<U: Send + 'static>(
		&self,
		transform: impl Fn(T) -> U + Send + Sync + 'static,
	) -> CoreSignal<K::DropWrite, U> {
		let transform = Arc::new(transform);
		let getter: Option<Box<Getter<U>>> = self.has_getter().then(|| {
			let source = self.clone();
			let transform = Arc::clone(&transform);
			Box::new(move || transform(source.read_current().expect("getter vanished")))
				as Box<Getter<U>>
		});
		let source = self.clone();
		CoreSignal::from_parts(
			move |handler| {
				let transform = Arc::clone(&transform);
				source.subscribe_pulse(move |pulse| {
					handler(match pulse {
						Pulse::Initial(value) => Pulse::Initial(value.map(&*transform)),
						Pulse::Event(event) => Pulse::Event(event.map(&*transform)),
					});
				})
			},
			getter,
			None,
		)
	}

	/// Transforms every value with a fallible `transform`; the first failure
	/// terminates the stream with its error.
	pub fn try_map<U: Send + 'static, E: std::error::Error + Send + Sync + 'static>(
		&self,
		transform: impl Fn(T) -> Result<U, E> + Send + Sync + 'static,
	) -> CoreSignal<Finite, U> {
		let transform = Arc::new(transform);
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let transform = Arc::clone(&transform);
			let mut done = false;
			source.subscribe_pulse(move |pulse| {
				if done {
					return;
				}
				match pulse {
					Pulse::Initial(_) => handler(Pulse::Initial(None)),
					Pulse::Event(Event::Value(value)) => match transform(value) {
						Ok(value) => handler(Pulse::value(value)),
						Err(error) => {
							done = true;
							handler(Pulse::Event(Event::end_with(error)));
						}
					},
					Pulse::Event(Event::End(error)) => {
						done = true;
						handler(Pulse::Event(Event::End(error)));
					}
				}
			})
		})
	}

	/// Keeps the values for which `transform` returns `Some`, mapped.
	pub fn filter_map<U: Send + 'static>(
		&self,
		transform: impl Fn(T) -> Option<U> + Send + Sync + 'static,
	) -> CoreSignal<K::DropRead, U> {
		let transform = Arc::new(transform);
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let transform = Arc::clone(&transform);
			source.subscribe_pulse(move |pulse| match pulse {
				Pulse::Initial(_) => handler(Pulse::Initial(None)),
				Pulse::Event(Event::Value(value)) => {
					if let Some(value) = transform(value) {
						handler(Pulse::value(value));
					}
				}
				Pulse::Event(Event::End(error)) => handler(Pulse::Event(Event::End(error))),
			})
		})
	}

	/// Keeps the values satisfying `predicate`.
	pub fn filter(
		&self,
		predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
	) -> CoreSignal<K::DropRead, T> {
		self.filter_map(move |value| predicate(&value).then_some(value))
	}

	/// Discards payloads.
	pub fn to_void(&self) -> CoreSignal<K::DropWrite, ()> {
		self.map(|_| ())
	}

	/// Emits `values` to each subscriber right after the handshake, before
	/// any upstream value.
	pub fn start_with(
		&self,
		values: impl IntoIterator<Item = T>,
	) -> CoreSignal<K::DropRead, T>
	where
		T: Clone + Sync,
	{
		let values: Arc<[T]> = values.into_iter().collect();
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let values = Arc::clone(&values);
			source.subscribe_pulse(move |pulse| match pulse {
				Pulse::Initial(_) => {
					handler(Pulse::Initial(None));
					for value in values.iter() {
						handler(Pulse::value(value.clone()));
					}
				}
				other => handler(other),
			})
		})
	}

	/// Multiplexes one upstream subscription over any number of listeners.
	#[must_use]
	pub fn shared(&self) -> CoreSignal<K, T>
	where
		T: Clone + Sync,
	{
		crate::signal::shared::shared(self)
	}

	/// Observes every value without consuming it; pass-through.
	pub fn at_value(&self, effect: impl Fn(&T) + Send + Sync + 'static) -> CoreSignal<K, T> {
		self.tap(move |event| {
			if let Event::Value(value) = event {
				effect(value);
			}
		})
	}

	/// Observes every event; pass-through.
	pub fn at_event(
		&self,
		effect: impl Fn(&Event<T>) + Send + Sync + 'static,
	) -> CoreSignal<K, T> {
		self.tap(effect)
	}

	/// Observes termination; pass-through.
	pub fn at_end(&self, effect: impl Fn() + Send + Sync + 'static) -> CoreSignal<K, T> {
		self.tap(move |event| {
			if event.is_end() {
				effect();
			}
		})
	}

	/// Observes failing termination; pass-through.
	pub fn at_error(
		&self,
		effect: impl Fn(&DynError) + Send + Sync + 'static,
	) -> CoreSignal<K, T> {
		self.tap(move |event| {
			if let Some(error) = event.error() {
				effect(error);
			}
		})
	}

	fn tap(&self, effect: impl Fn(&Event<T>) + Send + Sync + 'static) -> CoreSignal<K, T> {
		let effect = Arc::new(effect);
		let source = self.clone();
		CoreSignal::from_parts(
			{
				let source = source.clone();
				move |handler| {
					let effect = Arc::clone(&effect);
					source.subscribe_pulse(move |pulse| {
						if let Pulse::Event(event) = &pulse {
							effect(event);
						}
						handler(pulse);
					})
				}
			},
			source.passthrough_getter(),
			source.passthrough_setter(),
		)
	}

	/// Pairs every value with `object`, terminating when `object` is
	/// dropped elsewhere.
	pub fn with_weak<O: Send + Sync + 'static>(
		&self,
		object: &Arc<O>,
	) -> CoreSignal<Finite, (T, Arc<O>)> {
		let object: Weak<O> = Arc::downgrade(object);
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let object = object.clone();
			let mut done = false;
			source.subscribe_pulse(move |pulse| {
				if done {
					return;
				}
				match pulse {
					Pulse::Initial(_) => handler(Pulse::Initial(None)),
					Pulse::Event(Event::Value(value)) => match object.upgrade() {
						Some(object) => handler(Pulse::value((value, object))),
						None => {
							done = true;
							handler(Pulse::Event(Event::End(None)));
						}
					},
					Pulse::Event(Event::End(error)) => {
						done = true;
						handler(Pulse::Event(Event::End(error)));
					}
				}
			})
		})
	}
}

impl<K: Kind, T: Send + 'static> CoreSignal<K, T> {
	/// Attaches a running index, starting at 0.
	pub fn enumerate(&self) -> CoreSignal<K::DropRead, (usize, T)> {
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let mut index = 0;
			source.subscribe_pulse(move |pulse| match pulse {
				Pulse::Initial(_) => handler(Pulse::Initial(None)),
				Pulse::Event(Event::Value(value)) => {
					let numbered = (index, value);
					index += 1;
					handler(Pulse::value(numbered));
				}
				Pulse::Event(Event::End(error)) => handler(Pulse::Event(Event::End(error))),
			})
		})
	}
}

impl<T: Clone + Send + Sync + 'static> ReadWriteSignal<T> {
	/// Projects a read-write signal through a lens, round-tripping writes
	/// through the whole value.
	pub fn project<P: Clone + Send + Sync + 'static>(
		&self,
		read: impl Fn(&T) -> P + Send + Sync + 'static,
		write: impl Fn(&mut T, P) + Send + Sync + 'static,
	) -> ReadWriteSignal<P> {
		let read = Arc::new(read);
		let getter_source = self.clone();
		let setter_source = self.clone();
		let getter_read = Arc::clone(&read);
		let source = self.clone();
		CoreSignal::from_parts(
			move |handler| {
				let read = Arc::clone(&read);
				source.subscribe_pulse(move |pulse| {
					handler(match pulse {
						Pulse::Initial(value) => {
							Pulse::Initial(value.map(|whole| read(&whole)))
						}
						Pulse::Event(event) => Pulse::Event(event.map(|whole| read(&whole))),
					});
				})
			},
			Some(Box::new(move || getter_read(&getter_source.value()))),
			Some(Box::new(move |part| {
				let mut whole = setter_source.value();
				write(&mut whole, part);
				setter_source.set_value(whole);
			})),
		)
	}
}

impl<T: Send + 'static> Signal<Option<T>> {
	/// Unwraps present values, dropping `None`s.
	pub fn flatten_some(&self) -> Signal<T> {
		self.filter_map(|value| value)
	}
}
