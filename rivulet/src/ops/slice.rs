//! Prefix/suffix slicing, gating and de-duplication.

use std::sync::Arc;

use headwater::{Disposable, Disposer};
use parking_lot::Mutex;

use crate::{
	event::{Event, Pulse},
	kind::{Finite, Kind},
	signal::{CoreSignal, ReadSignal, Setter},
};

impl<K: Kind, T: Send + 'static> CoreSignal<K, T> {
	/// Delivers values while `predicate` holds, then terminates. The first
	/// failing value is not delivered.
	pub fn take_while(
		&self,
		predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
	) -> CoreSignal<Finite, T> {
		let predicate = Arc::new(predicate);
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let predicate = Arc::clone(&predicate);
			let mut done = false;
			source.subscribe_pulse(move |pulse| {
				if done {
					return;
				}
				match pulse {
					Pulse::Initial(_) => handler(Pulse::Initial(None)),
					Pulse::Event(Event::Value(value)) => {
						if predicate(&value) {
							handler(Pulse::value(value));
						} else {
							done = true;
							handler(Pulse::Event(Event::End(None)));
						}
					}
					Pulse::Event(Event::End(error)) => {
						done = true;
						handler(Pulse::Event(Event::End(error)));
					}
				}
			})
		})
	}

	/// Delivers the first `count` values, then terminates.
	///
	/// `take_first(0)` terminates immediately after the handshake.
	pub fn take_first(&self, count: usize) -> CoreSignal<Finite, T> {
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let mut remaining = count;
			let mut done = false;
			source.subscribe_pulse(move |pulse| {
				if done {
					return;
				}
				match pulse {
					Pulse::Initial(_) => {
						handler(Pulse::Initial(None));
						if remaining == 0 {
							done = true;
							handler(Pulse::Event(Event::End(None)));
						}
					}
					Pulse::Event(Event::Value(value)) => {
						remaining -= 1;
						handler(Pulse::value(value));
						if remaining == 0 {
							done = true;
							handler(Pulse::Event(Event::End(None)));
						}
					}
					Pulse::Event(Event::End(error)) => {
						done = true;
						handler(Pulse::Event(Event::End(error)));
					}
				}
			})
		})
	}

	/// Drops the first `count` values.
	pub fn skip_first(&self, count: usize) -> CoreSignal<K::DropRead, T> {
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let mut remaining = count;
			source.subscribe_pulse(move |pulse| match pulse {
				Pulse::Initial(_) => handler(Pulse::Initial(None)),
				Pulse::Event(Event::Value(value)) => {
					if remaining == 0 {
						handler(Pulse::value(value));
					} else {
						remaining -= 1;
					}
				}
				Pulse::Event(Event::End(error)) => handler(Pulse::Event(Event::End(error))),
			})
		})
	}

	/// Drops values until `predicate` first holds; the triggering value and
	/// everything after it is delivered.
	pub fn skip_until(
		&self,
		predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
	) -> CoreSignal<K::DropRead, T> {
		let predicate = Arc::new(predicate);
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let predicate = Arc::clone(&predicate);
			let mut open = false;
			source.subscribe_pulse(move |pulse| match pulse {
				Pulse::Initial(_) => handler(Pulse::Initial(None)),
				Pulse::Event(Event::Value(value)) => {
					if open || predicate(&value) {
						open = true;
						handler(Pulse::value(value));
					}
				}
				Pulse::Event(Event::End(error)) => handler(Pulse::Event(Event::End(error))),
			})
		})
	}

	/// Buffers at most one value while `gate` is false, releasing it on the
	/// rising edge.
	pub fn wait_until(&self, gate: &ReadSignal<bool>) -> CoreSignal<K::DropRead, T>
	where
		T: Sync,
	{
		let source = self.clone();
		let gate = gate.clone();
		CoreSignal::from_subscribe(move |handler| {
			let open = Arc::new(Mutex::new(false));
			let pending: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));

			let gate_subscription = gate.subscribe_pulse({
				let open = Arc::clone(&open);
				let pending = Arc::clone(&pending);
				let handler = Arc::clone(&handler);
				move |pulse| {
					let now_open = match pulse {
						Pulse::Initial(value) => value.unwrap_or(false),
						Pulse::Event(Event::Value(value)) => value,
						Pulse::Event(Event::End(_)) => return,
					};
					let released = {
						let mut open = open.lock();
						let rising = now_open && !*open;
						*open = now_open;
						if rising {
							pending.lock().take()
						} else {
							None
						}
					};
					if let Some(value) = released {
						handler(Pulse::value(value));
					}
				}
			});

			let source_subscription = source.subscribe_pulse({
				let open = Arc::clone(&open);
				let pending = Arc::clone(&pending);
				move |pulse| match pulse {
					Pulse::Initial(_) => handler(Pulse::Initial(None)),
					Pulse::Event(Event::Value(value)) => {
						if *open.lock() {
							handler(Pulse::value(value));
						} else {
							*pending.lock() = Some(value);
						}
					}
					Pulse::Event(Event::End(error)) => {
						pending.lock().take();
						handler(Pulse::Event(Event::End(error)));
					}
				}
			});

			Disposer::new(move || {
				source_subscription.dispose();
				gate_subscription.dispose();
			})
		})
	}

	/// Drops values equal (under `eq`) to the previously delivered value.
	///
	/// Readable sources seed the comparison with the subscription snapshot;
	/// writable sources additionally suppress writes equal to the current
	/// value.
	pub fn distinct_by(
		&self,
		eq: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
	) -> CoreSignal<K, T>
	where
		T: Clone + Sync,
	{
		let eq = Arc::new(eq);
		let setter: Option<Box<Setter<T>>> = self.has_setter().then(|| {
			let source = self.clone();
			let eq = Arc::clone(&eq);
			Box::new(move |value: T| {
				let unchanged = source
					.read_current()
					.is_some_and(|current| eq(&current, &value));
				if !unchanged {
					source.write_current(value);
				}
			}) as Box<Setter<T>>
		});
		let source = self.clone();
		CoreSignal::from_parts(
			{
				let source = source.clone();
				move |handler| {
					let eq = Arc::clone(&eq);
					let mut last: Option<T> = None;
					source.subscribe_pulse(move |pulse| match pulse {
						Pulse::Initial(value) => {
							last.clone_from(&value);
							handler(Pulse::Initial(value));
						}
						Pulse::Event(Event::Value(value)) => {
							let repeated =
								last.as_ref().is_some_and(|last| eq(last, &value));
							if !repeated {
								last = Some(value.clone());
								handler(Pulse::value(value));
							}
						}
						Pulse::Event(Event::End(error)) => {
							handler(Pulse::Event(Event::End(error)));
						}
					})
				}
			},
			source.passthrough_getter(),
			setter,
		)
	}

	/// [`distinct_by`](`CoreSignal::distinct_by`) under `==`.
	pub fn distinct(&self) -> CoreSignal<K, T>
	where
		T: Clone + Sync + PartialEq,
	{
		self.distinct_by(T::eq)
	}
}
