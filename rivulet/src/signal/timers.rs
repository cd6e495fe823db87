//! Timer-driven signal sources.

use std::{
	sync::{
		atomic::{AtomicBool, Ordering::Relaxed},
		Arc,
	},
	time::Duration,
};

use headwater::{Disposable, Disposer, Scheduler};
use parking_lot::Mutex;

use crate::{
	event::Pulse,
	signal::{PulseHandler, Signal},
};

struct Ticker {
	handler: PulseHandler<()>,
	scheduler: Scheduler,
	interval: Duration,
	timer: Mutex<Option<Disposer>>,
	disposed: AtomicBool,
}

fn arm(ticker: &Arc<Ticker>, delay: Duration) {
	let tick = Arc::clone(ticker);
	let timer = ticker.scheduler.disposable_run_after(delay, move || {
		// The timer may fire after disposal loses the race; gate here.
		if tick.disposed.load(Relaxed) {
			return;
		}
		(tick.handler)(Pulse::value(()));
		if !tick.disposed.load(Relaxed) {
			arm(&tick, tick.interval);
		}
	});
	*ticker.timer.lock() = Some(timer);
}

impl Signal<()> {
	/// A plain `()` stream ticking every `interval` on `scheduler`, first
	/// tick one interval in.
	#[must_use]
	pub fn every(interval: Duration, scheduler: &Scheduler) -> Self {
		Self::every_delayed(interval, interval, scheduler)
	}

	/// Like [`every`](`Signal::every`), with the first tick after `delay`.
	#[must_use]
	pub fn every_delayed(delay: Duration, interval: Duration, scheduler: &Scheduler) -> Self {
		let scheduler = scheduler.clone();
		Self::from_subscribe(move |handler| {
			handler(Pulse::Initial(None));
			let ticker = Arc::new(Ticker {
				handler,
				scheduler: scheduler.clone(),
				interval,
				timer: Mutex::new(None),
				disposed: AtomicBool::new(false),
			});
			arm(&ticker, delay);
			Disposer::new(move || {
				ticker.disposed.store(true, Relaxed);
				if let Some(timer) = ticker.timer.lock().take() {
					timer.dispose();
				}
			})
		})
	}

	/// A plain `()` stream firing once after `delay` on `scheduler`.
	#[must_use]
	pub fn after(delay: Duration, scheduler: &Scheduler) -> Self {
		let scheduler = scheduler.clone();
		Self::from_subscribe(move |handler| {
			handler(Pulse::Initial(None));
			let disposed = Arc::new(AtomicBool::new(false));
			let timer = scheduler.disposable_run_after(delay, {
				let disposed = Arc::clone(&disposed);
				move || {
					if !disposed.load(Relaxed) {
						handler(Pulse::value(()));
					}
				}
			});
			Disposer::new(move || {
				disposed.store(true, Relaxed);
				timer.dispose();
			})
		})
	}
}
