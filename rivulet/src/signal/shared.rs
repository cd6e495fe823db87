//! Shared (multicast) subscriptions.
//!
//! A shared signal installs at most one upstream subscription regardless of
//! listener count: the first listener triggers it, later listeners join the
//! fan-out, and the last listener's disposal tears it down and clears the
//! cached state.

use std::sync::Arc;

use headwater::{Disposable, Disposer, Relay};
use parking_lot::Mutex;

use crate::{
	event::{Event, Pulse},
	kind::Kind,
	signal::{CoreSignal, Getter, Setter},
};

struct SharedState {
	listener_count: usize,
	upstream: Option<Disposer>,
}

struct SharedCache<T> {
	last: Mutex<Option<T>>,
}

pub(crate) fn shared<K: Kind, T: Clone + Send + Sync + 'static>(
	source: &CoreSignal<K, T>,
) -> CoreSignal<K, T> {
	let state = Arc::new(Mutex::new(SharedState {
		listener_count: 0,
		upstream: None,
	}));
	let cache = Arc::new(SharedCache {
		last: Mutex::new(None),
	});
	let relay: Relay<Pulse<T>> = Relay::new();

	let getter: Option<Box<Getter<T>>> = source.has_getter().then(|| {
		let cache = Arc::clone(&cache);
		let source = source.clone();
		Box::new(move || {
			cache
				.last
				.lock()
				.clone()
				.or_else(|| source.read_current())
				.expect("readable shared signal without a current value")
		}) as Box<Getter<T>>
	});
	let setter: Option<Box<Setter<T>>> = source.passthrough_setter();

	let readable = source.has_getter();
	let subscribe_source = source.clone();
	let source_for_initial = source.clone();
	CoreSignal::from_parts(
		move |handler| {
			let registration = relay.subscribe({
				let handler = Arc::clone(&handler);
				move |pulse| handler(pulse)
			});

			let first = {
				let mut state = state.lock();
				state.listener_count += 1;
				state.listener_count == 1
			};
			if first {
				let upstream = subscribe_source.subscribe_pulse({
					let cache = Arc::clone(&cache);
					let relay = relay.clone();
					move |pulse| match pulse {
						Pulse::Initial(value) => {
							if let Some(value) = value {
								*cache.last.lock() = Some(value);
							}
						}
						Pulse::Event(event) => {
							if let Event::Value(value) = &event {
								*cache.last.lock() = Some(value.clone());
							}
							relay.broadcast(Pulse::Event(event));
						}
					}
				});
				state.lock().upstream = Some(upstream);
			}

			// Each listener gets its own handshake: the last observed value
			// for readable shared signals (the upstream snapshot if nothing
			// was observed yet), absent for plain ones.
			let initial = if readable {
				cache
					.last
					.lock()
					.clone()
					.or_else(|| source_for_initial.read_current())
			} else {
				None
			};
			handler(Pulse::Initial(initial));

			let state = Arc::clone(&state);
			let cache = Arc::clone(&cache);
			Disposer::new(move || {
				registration.dispose();
				let upstream = {
					let mut state = state.lock();
					state.listener_count -= 1;
					if state.listener_count == 0 {
						*cache.last.lock() = None;
						state.upstream.take()
					} else {
						None
					}
				};
				if let Some(upstream) = upstream {
					upstream.dispose();
				}
			})
		},
		getter,
		setter,
	)
}
