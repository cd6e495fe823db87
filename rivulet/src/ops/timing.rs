//! Time-based operators and explicit rescheduling.

use std::{sync::Arc, time::Duration};

use headwater::{Disposable, Disposer, Scheduler};
use parking_lot::Mutex;

use crate::{
	event::{Event, Pulse},
	kind::Kind,
	signal::CoreSignal,
};

impl<K: Kind, T: Send + 'static> CoreSignal<K, T> {
	/// Re-delivers every event on `scheduler`.
	///
	/// The handshake is never rescheduled; it stays the synchronous part of
	/// subscribing. Passing the immediate scheduler makes this a no-op
	/// wrapper.
	pub fn receive_on(&self, scheduler: &Scheduler) -> CoreSignal<K, T> {
		let scheduler = scheduler.clone();
		let source = self.clone();
		CoreSignal::from_parts(
			{
				let source = source.clone();
				move |handler| {
					let scheduler = scheduler.clone();
					source.subscribe_pulse(move |pulse| {
						if pulse.is_initial() || scheduler.is_immediate() {
							handler(pulse);
						} else {
							let handler = Arc::clone(&handler);
							scheduler.run(move || handler(pulse));
						}
					})
				}
			},
			source.passthrough_getter(),
			source.passthrough_setter(),
		)
	}

	/// Delivers a value only once `interval` has elapsed without a newer
	/// one; every upstream value restarts the clock. The handshake and
	/// termination pass through immediately.
	///
	/// A zero interval still defers to the next scheduler tick.
	pub fn debounce(
		&self,
		interval: Duration,
		scheduler: &Scheduler,
	) -> CoreSignal<K::DropRead, T> {
		let scheduler = scheduler.clone();
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let scheduler = scheduler.clone();
			let pending: Arc<Mutex<Option<Disposer>>> = Arc::new(Mutex::new(None));
			let subscription = source.subscribe_pulse({
				let pending = Arc::clone(&pending);
				move |pulse| match pulse {
					Pulse::Initial(_) => handler(Pulse::Initial(None)),
					Pulse::Event(Event::Value(value)) => {
						let handler = Arc::clone(&handler);
						let timer = scheduler.disposable_run_after(interval, move || {
							handler(Pulse::value(value));
						});
						if let Some(stale) = pending.lock().replace(timer) {
							stale.dispose();
						}
					}
					Pulse::Event(Event::End(error)) => {
						if let Some(stale) = pending.lock().take() {
							stale.dispose();
						}
						handler(Pulse::Event(Event::End(error)));
					}
				}
			});
			Disposer::new(move || {
				subscription.dispose();
				if let Some(timer) = pending.lock().take() {
					timer.dispose();
				}
			})
		})
	}

	/// Delivers the first value immediately, then suppresses values for
	/// `interval`; a window that saw suppressed values closes by delivering
	/// the last of them and opening the next window.
	pub fn throttle(
		&self,
		interval: Duration,
		scheduler: &Scheduler,
	) -> CoreSignal<K::DropRead, T> {
		let scheduler = scheduler.clone();
		let source = self.clone();
		CoreSignal::from_subscribe(move |handler| {
			let state = Arc::new(ThrottleState {
				scheduler: scheduler.clone(),
				interval,
				inner: Mutex::new(ThrottleInner {
					in_window: false,
					trailing: None,
					window: None,
				}),
			});
			let subscription = source.subscribe_pulse({
				let state = Arc::clone(&state);
				let handler = Arc::clone(&handler);
				move |pulse| match pulse {
					Pulse::Initial(_) => handler(Pulse::Initial(None)),
					Pulse::Event(Event::Value(value)) => {
						let emit = {
							let mut inner = state.inner.lock();
							if inner.in_window {
								inner.trailing = Some(value);
								None
							} else {
								inner.in_window = true;
								inner.window = Some(arm_window(&state, &handler));
								Some(value)
							}
						};
						if let Some(value) = emit {
							handler(Pulse::value(value));
						}
					}
					Pulse::Event(Event::End(error)) => {
						let mut inner = state.inner.lock();
						inner.trailing = None;
						if let Some(window) = inner.window.take() {
							window.dispose();
						}
						drop(inner);
						handler(Pulse::Event(Event::End(error)));
					}
				}
			});
			Disposer::new(move || {
				subscription.dispose();
				let mut inner = state.inner.lock();
				inner.trailing = None;
				if let Some(window) = inner.window.take() {
					window.dispose();
				}
			})
		})
	}
}

struct ThrottleInner<T> {
	in_window: bool,
	trailing: Option<T>,
	window: Option<Disposer>,
}

struct ThrottleState<T> {
	scheduler: Scheduler,
	interval: Duration,
	inner: Mutex<ThrottleInner<T>>,
}

/// Arms one throttle window. A window that caught a trailing value closes by
/// delivering it and arming the next window; an idle window just reopens the
/// gate.
fn arm_window<T: Send + 'static>(
	state: &Arc<ThrottleState<T>>,
	handler: &crate::signal::PulseHandler<T>,
) -> Disposer {
	let state_ = Arc::clone(state);
	let handler = Arc::clone(handler);
	state.scheduler.disposable_run_after(state.interval, move || {
		let released = {
			let mut inner = state_.inner.lock();
			match inner.trailing.take() {
				Some(value) => {
					inner.window = Some(arm_window(&state_, &handler));
					Some(value)
				}
				None => {
					inner.in_window = false;
					inner.window = None;
					None
				}
			}
		};
		if let Some(value) = released {
			handler(Pulse::value(value));
		}
	})
}
