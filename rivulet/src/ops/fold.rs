//! Running aggregations.

use std::sync::Arc;

use crate::{
	event::{Event, Pulse},
	kind::Kind,
	signal::{CoreSignal, FiniteSignal, Getter},
};

impl<K: Kind, T: Send + 'static> CoreSignal<K, T> {
	/// Emits the running fold of `combine` over the values, seeded with
	/// `initial`.
	///
	/// For readable sources the handshake snapshot is
	/// `combine(initial, snapshot)`; the running fold itself starts from
	/// `initial` and covers delivered values only.
	pub fn reduce<U: Clone + Send + Sync + 'static>(
		&self,
		initial: U,
		combine: impl Fn(U, T) -> U + Send + Sync + 'static,
	) -> CoreSignal<K::DropWrite, U> {
		let combine = Arc::new(combine);
		let getter: Option<Box<Getter<U>>> = self.has_getter().then(|| {
			let source = self.clone();
			let combine = Arc::clone(&combine);
			let initial = initial.clone();
			Box::new(move || {
				combine(
					initial.clone(),
					source.read_current().expect("getter vanished"),
				)
			}) as Box<Getter<U>>
		});
		let source = self.clone();
		CoreSignal::from_parts(
			move |handler| {
				let combine = Arc::clone(&combine);
				let mut accumulated = Some(initial.clone());
				let seed = initial.clone();
				source.subscribe_pulse(move |pulse| match pulse {
					Pulse::Initial(value) => handler(Pulse::Initial(
						value.map(|value| combine(seed.clone(), value)),
					)),
					Pulse::Event(Event::Value(value)) => {
						let next = combine(
							accumulated.take().expect("fold state vanished"),
							value,
						);
						accumulated = Some(next.clone());
						handler(Pulse::value(next));
					}
					Pulse::Event(Event::End(error)) => {
						handler(Pulse::Event(Event::End(error)));
					}
				})
			},
			getter,
			None,
		)
	}

	/// Running "any value satisfied `predicate` so far".
	pub fn contains(
		&self,
		predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
	) -> CoreSignal<K::DropWrite, bool> {
		self.reduce(false, move |found, value| found || predicate(&value))
	}

	/// Running "every value satisfied `predicate` so far".
	pub fn all_satisfy(
		&self,
		predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
	) -> CoreSignal<K::DropWrite, bool> {
		self.reduce(true, move |all, value| all && predicate(&value))
	}

	/// Emits the accumulated values on every value.
	pub fn buffer(&self) -> CoreSignal<K::DropRead, Vec<T>>
	where
		T: Clone,
	{
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let mut buffered = Vec::new();
			source.subscribe_pulse(move |pulse| match pulse {
				Pulse::Initial(_) => handler(Pulse::Initial(None)),
				Pulse::Event(Event::Value(value)) => {
					buffered.push(value);
					handler(Pulse::value(buffered.clone()));
				}
				Pulse::Event(Event::End(error)) => handler(Pulse::Event(Event::End(error))),
			})
		})
	}

	/// Emits `(previous, current)` pairs, starting with the first pair.
	pub fn latest_two(&self) -> CoreSignal<K::DropRead, (T, T)>
	where
		T: Clone,
	{
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let mut previous: Option<T> = None;
			source.subscribe_pulse(move |pulse| match pulse {
				Pulse::Initial(_) => handler(Pulse::Initial(None)),
				Pulse::Event(Event::Value(value)) => {
					if let Some(previous) = previous.replace(value.clone()) {
						handler(Pulse::value((previous, value)));
					}
				}
				Pulse::Event(Event::End(error)) => handler(Pulse::Event(Event::End(error))),
			})
		})
	}
}

impl<T: Clone + Send + 'static> FiniteSignal<T> {
	/// Accumulates every value and emits the collection once, on `End`,
	/// followed by the `End` itself.
	pub fn collect_all(&self) -> FiniteSignal<Vec<T>> {
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let mut collected = Vec::new();
			source.subscribe_pulse(move |pulse| match pulse {
				Pulse::Initial(_) => handler(Pulse::Initial(None)),
				Pulse::Event(Event::Value(value)) => collected.push(value),
				Pulse::Event(Event::End(error)) => {
					handler(Pulse::value(std::mem::take(&mut collected)));
					handler(Pulse::Event(Event::End(error)));
				}
			})
		})
	}
}
