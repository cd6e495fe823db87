//! Switching and sampling combinators.

use std::sync::Arc;

use headwater::{Disposable, Disposer};
use parking_lot::Mutex;

use crate::{
	event::{Event, Pulse},
	kind::Kind,
	signal::{CoreSignal, PulseHandler},
};

struct SwitchState {
	inner: Option<Disposer>,
	inner_active: bool,
	upstream_ended: bool,
	initial_sent: bool,
	done: bool,
}

impl<K: Kind, T: Send + 'static> CoreSignal<K, T> {
	/// Maps every value to an inner signal and forwards the latest one,
	/// disposing the previous inner subscription first.
	///
	/// The composite handshake is the first one available: the upstream
	/// handshake for plain sources, the first inner handshake for readable
	/// ones. Later inner handshakes are promoted to values. The composite
	/// terminates when the upstream has ended and no finite inner is still
	/// running, or immediately on any error.
	pub fn flat_map_latest<K2: Kind, U: Send + 'static>(
		&self,
		transform: impl Fn(T) -> CoreSignal<K2, U> + Send + Sync + 'static,
	) -> CoreSignal<K::DropRead, U> {
		self.flat_map_latest_impl(transform, false)
	}

	/// Like [`flat_map_latest`](`CoreSignal::flat_map_latest`), but an inner
	/// stream failing only ends that inner stream; the composite keeps
	/// switching.
	pub fn flat_map_latest_ignoring_error<K2: Kind, U: Send + 'static>(
		&self,
		transform: impl Fn(T) -> CoreSignal<K2, U> + Send + Sync + 'static,
	) -> CoreSignal<K::DropRead, U> {
		self.flat_map_latest_impl(transform, true)
	}

	fn flat_map_latest_impl<K2: Kind, U: Send + 'static>(
		&self,
		transform: impl Fn(T) -> CoreSignal<K2, U> + Send + Sync + 'static,
		ignore_inner_errors: bool,
	) -> CoreSignal<K::DropRead, U> {
		let transform = Arc::new(transform);
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let transform = Arc::clone(&transform);
			let state = Arc::new(Mutex::new(SwitchState {
				inner: None,
				inner_active: false,
				upstream_ended: false,
				initial_sent: false,
				done: false,
			}));

			let subscription = source.subscribe_pulse({
				let state = Arc::clone(&state);
				let handler = Arc::clone(&handler);
				move |pulse| match pulse {
					Pulse::Initial(None) => {
						state.lock().initial_sent = true;
						handler(Pulse::Initial(None));
					}
					Pulse::Initial(Some(value)) => {
						switch_to(&state, &handler, transform(value), ignore_inner_errors);
					}
					Pulse::Event(Event::Value(value)) => {
						switch_to(&state, &handler, transform(value), ignore_inner_errors);
					}
					Pulse::Event(Event::End(error)) => {
						let emit = {
							let mut state = state.lock();
							if state.done {
								false
							} else if error.is_some() {
								state.done = true;
								true
							} else {
								state.upstream_ended = true;
								if state.inner_active {
									false
								} else {
									state.done = true;
									true
								}
							}
						};
						if emit {
							handler(Pulse::Event(Event::End(error)));
						}
					}
				}
			});

			let state_ = Arc::clone(&state);
			Disposer::new(move || {
				subscription.dispose();
				let inner = state_.lock().inner.take();
				if let Some(inner) = inner {
					inner.dispose();
				}
			})
		})
	}
}

/// Disposes the current inner subscription and installs one on `next`.
fn switch_to<K2: Kind, U: Send + 'static>(
	state: &Arc<Mutex<SwitchState>>,
	handler: &PulseHandler<U>,
	next: CoreSignal<K2, U>,
	ignore_inner_errors: bool,
) {
	let previous = {
		let mut state = state.lock();
		if state.done {
			return;
		}
		state.inner_active = true;
		state.inner.take()
	};
	if let Some(previous) = previous {
		previous.dispose();
	}

	let subscription = next.subscribe_pulse({
		let state = Arc::clone(state);
		let handler = Arc::clone(handler);
		move |pulse| match pulse {
			Pulse::Initial(value) => {
				let promote = {
					let mut state = state.lock();
					if state.done {
						return;
					}
					if state.initial_sent {
						true
					} else {
						state.initial_sent = true;
						false
					}
				};
				if promote {
					if let Some(value) = value {
						handler(Pulse::value(value));
					}
				} else {
					handler(Pulse::Initial(value));
				}
			}
			Pulse::Event(Event::Value(value)) => {
				if !state.lock().done {
					handler(Pulse::value(value));
				}
			}
			Pulse::Event(Event::End(error)) => {
				let error = if ignore_inner_errors { None } else { error };
				let emit = {
					let mut state = state.lock();
					if state.done {
						false
					} else if error.is_some() {
						state.done = true;
						true
					} else {
						state.inner_active = false;
						if state.upstream_ended {
							state.done = true;
							true
						} else {
							false
						}
					}
				};
				if emit {
					handler(Pulse::Event(Event::End(error)));
				}
			}
		}
	});

	let mut state = state.lock();
	if state.done {
		drop(state);
		subscription.dispose();
	} else {
		state.inner = Some(subscription);
	}
}

impl<K: Kind, T: Send + 'static> CoreSignal<K, T> {
	/// Pairs every value with the latest value of `other`, suppressing
	/// values until `other` has delivered at least one.
	pub fn with_latest_from<K2: Kind, U: Clone + Send + 'static>(
		&self,
		other: &CoreSignal<K2, U>,
	) -> CoreSignal<K::DropRead, (T, U)> {
		let source = self.clone();
		let other = other.clone();
		CoreSignal::from_subscribe(move |handler| {
			let latest: Arc<Mutex<Option<U>>> = Arc::new(Mutex::new(None));

			let other_subscription = other.subscribe_pulse({
				let latest = Arc::clone(&latest);
				move |pulse| match pulse {
					Pulse::Initial(Some(value)) | Pulse::Event(Event::Value(value)) => {
						*latest.lock() = Some(value);
					}
					Pulse::Initial(None) | Pulse::Event(Event::End(_)) => {}
				}
			});

			let source_subscription = source.subscribe_pulse({
				let latest = Arc::clone(&latest);
				move |pulse| match pulse {
					Pulse::Initial(_) => handler(Pulse::Initial(None)),
					Pulse::Event(Event::Value(value)) => {
						let sampled = latest.lock().clone();
						if let Some(sampled) = sampled {
							handler(Pulse::value((value, sampled)));
						}
					}
					Pulse::Event(Event::End(error)) => {
						handler(Pulse::Event(Event::End(error)));
					}
				}
			});

			Disposer::new(move || {
				source_subscription.dispose();
				other_subscription.dispose();
			})
		})
	}
}
