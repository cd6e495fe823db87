//! Fan-in combiners.

use std::sync::{
	atomic::{AtomicBool, Ordering::Relaxed},
	Arc,
};

use headwater::Disposer;
use parking_lot::Mutex;

use crate::{
	event::{Event, Pulse},
	signal::{CoreSignal, FiniteSignal, Getter, ReadSignal, Signal},
};

impl<T: Clone + Send + 'static> Signal<T> {
	/// Interleaves the values of all `sources`, preserving per-source order.
	pub fn merge(sources: impl IntoIterator<Item = Signal<T>>) -> Signal<T> {
		let sources: Arc<[Signal<T>]> = sources.into_iter().collect();
		Signal::from_subscribe(move |handler| {
			if sources.is_empty() {
				handler(Pulse::Initial(None));
				return Disposer::noop();
			}
			// Exactly one handshake is forwarded, from whichever source
			// installs first.
			let initial_sent = Arc::new(AtomicBool::new(false));
			let subscriptions: Vec<Disposer> = sources
				.iter()
				.map(|source| {
					let handler = Arc::clone(&handler);
					let initial_sent = Arc::clone(&initial_sent);
					source.subscribe_pulse(move |pulse| match pulse {
						Pulse::Initial(_) => {
							if !initial_sent.swap(true, Relaxed) {
								handler(Pulse::Initial(None));
							}
						}
						Pulse::Event(Event::Value(value)) => handler(Pulse::value(value)),
						Pulse::Event(Event::End(_)) => {}
					})
				})
				.collect();
			Disposer::new(move || drop(subscriptions))
		})
	}
}

struct MergeState {
	remaining: usize,
	initial_sent: bool,
	done: bool,
}

impl<T: Clone + Send + 'static> FiniteSignal<T> {
	/// Interleaves the values of all `sources`; terminates once every source
	/// has terminated without error, or immediately on the first error.
	pub fn merge(sources: impl IntoIterator<Item = FiniteSignal<T>>) -> FiniteSignal<T> {
		let sources: Arc<[FiniteSignal<T>]> = sources.into_iter().collect();
		FiniteSignal::from_subscribe(move |handler| {
			if sources.is_empty() {
				handler(Pulse::Initial(None));
				handler(Pulse::Event(Event::End(None)));
				return Disposer::noop();
			}
			let state = Arc::new(Mutex::new(MergeState {
				remaining: sources.len(),
				initial_sent: false,
				done: false,
			}));
			let subscriptions: Vec<Disposer> = sources
				.iter()
				.map(|source| {
					let handler = Arc::clone(&handler);
					let state = Arc::clone(&state);
					source.subscribe_pulse(move |pulse| match pulse {
						Pulse::Initial(_) => {
							let first = {
								let mut state = state.lock();
								!std::mem::replace(&mut state.initial_sent, true)
							};
							if first {
								handler(Pulse::Initial(None));
							}
						}
						Pulse::Event(Event::Value(value)) => {
							if !state.lock().done {
								handler(Pulse::value(value));
							}
						}
						Pulse::Event(Event::End(error)) => {
							let emit = {
								let mut state = state.lock();
								if state.done {
									None
								} else if error.is_some() {
									state.done = true;
									Some(error)
								} else {
									state.remaining -= 1;
									if state.remaining == 0 {
										state.done = true;
										Some(None)
									} else {
										None
									}
								}
							};
							if let Some(error) = emit {
								handler(Pulse::Event(Event::End(error)));
							}
						}
					})
				})
				.collect();
			Disposer::new(move || drop(subscriptions))
		})
	}
}

/// Tuple-arity `combine_latest`.
///
/// Implemented for tuples of `&Signal` (plain result) and of `&ReadSignal`
/// (readable result, tuple getter), arities 2 through 14.
pub trait CombineLatest {
	type Combined;

	/// Emits the tuple of latest values whenever any source delivers, once
	/// every source has delivered at least one value.
	fn combine_latest(self) -> Self::Combined;
}

macro_rules! impl_combine_latest {
	($( ($($source:ident : $T:ident : $idx:tt),+) )+) => { $(
		impl<'a, $($T: Clone + Send + Sync + 'static),+> CombineLatest
			for ($(&'a Signal<$T>,)+)
		{
			type Combined = Signal<($($T,)+)>;

			fn combine_latest(self) -> Self::Combined {
				let ($($source,)+) = ($(CoreSignal::clone(self.$idx),)+);
				Signal::from_subscribe(move |handler| {
					let state = Arc::new(Mutex::new(($(Option::<$T>::None,)+)));
					let initial_sent = Arc::new(AtomicBool::new(false));
					let snapshot = Arc::new({
						let state = Arc::clone(&state);
						move || {
							let state = state.lock();
							match ($(state.$idx.clone(),)+) {
								($(Some($source),)+) => Some(($($source,)+)),
								_ => None,
							}
						}
					});
					let subscriptions: Vec<Disposer> = vec![$(
						{
							let state = Arc::clone(&state);
							let handler = Arc::clone(&handler);
							let initial_sent = Arc::clone(&initial_sent);
							let snapshot = Arc::clone(&snapshot);
							$source.subscribe_pulse(move |pulse| match pulse {
								Pulse::Initial(_) => {
									if !initial_sent.swap(true, Relaxed) {
										handler(Pulse::Initial(None));
									}
								}
								Pulse::Event(Event::Value(value)) => {
									state.lock().$idx = Some(value);
									if let Some(combined) = snapshot() {
										handler(Pulse::value(combined));
									}
								}
								Pulse::Event(Event::End(_)) => {}
							})
						},
					)+];
					Disposer::new(move || drop(subscriptions))
				})
			}
		}

		impl<'a, $($T: Clone + Send + Sync + 'static),+> CombineLatest
			for ($(&'a ReadSignal<$T>,)+)
		{
			type Combined = ReadSignal<($($T,)+)>;

			fn combine_latest(self) -> Self::Combined {
				let getter = {
					let ($($source,)+) = ($(CoreSignal::clone(self.$idx),)+);
					Box::new(move || ($($source.value(),)+)) as Box<Getter<($($T,)+)>>
				};
				let ($($source,)+) = ($(CoreSignal::clone(self.$idx),)+);
				CoreSignal::from_parts(
					move |handler| {
						let state = Arc::new(Mutex::new(($(Option::<$T>::None,)+)));
						let initial_sent = Arc::new(AtomicBool::new(false));
						let snapshot = Arc::new({
							let state = Arc::clone(&state);
							move || {
								let state = state.lock();
								match ($(state.$idx.clone(),)+) {
									($(Some($source),)+) => Some(($($source,)+)),
									_ => None,
								}
							}
						});
						// The tuple handshake goes out once every source has
						// contributed; afterwards any slot update emits.
						let deliver = Arc::new({
							let handler = Arc::clone(&handler);
							let snapshot = Arc::clone(&snapshot);
							let initial_sent = Arc::clone(&initial_sent);
							move |from_value: bool| {
								if let Some(combined) = snapshot() {
									if !initial_sent.swap(true, Relaxed) {
										handler(Pulse::Initial(Some(combined)));
									} else if from_value {
										handler(Pulse::value(combined));
									}
								}
							}
						});
						let subscriptions: Vec<Disposer> = vec![$(
							{
								let state = Arc::clone(&state);
								let deliver = Arc::clone(&deliver);
								$source.subscribe_pulse(move |pulse| match pulse {
									Pulse::Initial(value) => {
										if let Some(value) = value {
											state.lock().$idx = Some(value);
										}
										deliver(false);
									}
									Pulse::Event(Event::Value(value)) => {
										state.lock().$idx = Some(value);
										deliver(true);
									}
									Pulse::Event(Event::End(_)) => {}
								})
							},
						)+];
						Disposer::new(move || drop(subscriptions))
					},
					Some(getter),
					None,
				)
			}
		}
	)+ };
}

impl_combine_latest! {
	(a: A: 0, b: B: 1)
	(a: A: 0, b: B: 1, c: C: 2)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4, f: F: 5)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4, f: F: 5, g: G: 6)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4, f: F: 5, g: G: 6, h: H: 7)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4, f: F: 5, g: G: 6, h: H: 7, i: I: 8)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4, f: F: 5, g: G: 6, h: H: 7, i: I: 8,
		j: J: 9)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4, f: F: 5, g: G: 6, h: H: 7, i: I: 8,
		j: J: 9, k: K: 10)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4, f: F: 5, g: G: 6, h: H: 7, i: I: 8,
		j: J: 9, k: K: 10, l: L: 11)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4, f: F: 5, g: G: 6, h: H: 7, i: I: 8,
		j: J: 9, k: K: 10, l: L: 11, m: M: 12)
	(a: A: 0, b: B: 1, c: C: 2, d: D: 3, e: E: 4, f: F: 5, g: G: 6, h: H: 7, i: I: 8,
		j: J: 9, k: K: 10, l: L: 11, m: M: 12, n: N: 13)
}

/// `combine_latest` over a homogeneous sequence of plain signals.
///
/// An empty sequence produces a signal that only completes its handshake.
pub fn combine_latest_seq<T: Clone + Send + Sync + 'static>(
	sources: impl IntoIterator<Item = Signal<T>>,
) -> Signal<Vec<T>> {
	let sources: Arc<[Signal<T>]> = sources.into_iter().collect();
	Signal::from_subscribe(move |handler| {
		if sources.is_empty() {
			handler(Pulse::Initial(None));
			return Disposer::noop();
		}
		let state: Arc<Mutex<Vec<Option<T>>>> =
			Arc::new(Mutex::new(vec![None; sources.len()]));
		let initial_sent = Arc::new(AtomicBool::new(false));
		let subscriptions: Vec<Disposer> = sources
			.iter()
			.enumerate()
			.map(|(index, source)| {
				let state = Arc::clone(&state);
				let handler = Arc::clone(&handler);
				let initial_sent = Arc::clone(&initial_sent);
				source.subscribe_pulse(move |pulse| match pulse {
					Pulse::Initial(_) => {
						if !initial_sent.swap(true, Relaxed) {
							handler(Pulse::Initial(None));
						}
					}
					Pulse::Event(Event::Value(value)) => {
						let combined = {
							let mut state = state.lock();
							state[index] = Some(value);
							state
								.iter()
								.cloned()
								.collect::<Option<Vec<T>>>()
						};
						if let Some(combined) = combined {
							handler(Pulse::value(combined));
						}
					}
					Pulse::Event(Event::End(_)) => {}
				})
			})
			.collect();
		Disposer::new(move || drop(subscriptions))
	})
}

/// `combine_latest` over a homogeneous sequence of readable signals.
///
/// An empty sequence yields the constant empty collection.
pub fn combine_latest_read_seq<T: Clone + Send + Sync + 'static>(
	sources: impl IntoIterator<Item = ReadSignal<T>>,
) -> ReadSignal<Vec<T>> {
	let sources: Arc<[ReadSignal<T>]> = sources.into_iter().collect();
	if sources.is_empty() {
		return ReadSignal::constant(Vec::new());
	}
	let getter = {
		let sources = Arc::clone(&sources);
		Box::new(move || sources.iter().map(ReadSignal::value).collect::<Vec<T>>())
			as Box<Getter<Vec<T>>>
	};
	CoreSignal::from_parts(
		move |handler| {
			let state: Arc<Mutex<Vec<Option<T>>>> =
				Arc::new(Mutex::new(vec![None; sources.len()]));
			let initial_sent = Arc::new(AtomicBool::new(false));
			let deliver = Arc::new({
				let state = Arc::clone(&state);
				let handler = Arc::clone(&handler);
				let initial_sent = Arc::clone(&initial_sent);
				move |from_value: bool| {
					let combined = state.lock().iter().cloned().collect::<Option<Vec<T>>>();
					if let Some(combined) = combined {
						if !initial_sent.swap(true, Relaxed) {
							handler(Pulse::Initial(Some(combined)));
						} else if from_value {
							handler(Pulse::value(combined));
						}
					}
				}
			});
			let subscriptions: Vec<Disposer> = sources
				.iter()
				.enumerate()
				.map(|(index, source)| {
					let state = Arc::clone(&state);
					let deliver = Arc::clone(&deliver);
					source.subscribe_pulse(move |pulse| match pulse {
						Pulse::Initial(value) => {
							if let Some(value) = value {
								state.lock()[index] = Some(value);
							}
							deliver(false);
						}
						Pulse::Event(Event::Value(value)) => {
							state.lock()[index] = Some(value);
							deliver(true);
						}
						Pulse::Event(Event::End(_)) => {}
					})
				})
				.collect();
			Disposer::new(move || drop(subscriptions))
		},
		Some(getter),
		None,
	)
}
