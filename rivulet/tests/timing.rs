use std::{
	sync::{mpsc, Arc},
	thread,
	time::Duration,
};

use parking_lot::Mutex;
use rivulet::{Event, Relay, Scheduler, Signal};

mod _validator;
use _validator::Validator;

fn plain_source() -> (Relay<Event<i32>>, Signal<i32>) {
	let relay = Relay::new();
	let signal = Signal::from_relay(&relay);
	(relay, signal)
}

#[test]
fn debounce_emits_only_after_quiet_time() {
	let scheduler = Scheduler::serial("debounce-test");
	let (relay, signal) = plain_source();
	let v = Arc::new(Validator::new());
	let _keep = signal.debounce(Duration::from_millis(50), &scheduler).on_value({
		let v = v.clone();
		move |n| v.push(n)
	});

	for n in [1, 2, 3] {
		relay.broadcast(Event::Value(n));
		thread::sleep(Duration::from_millis(5));
	}
	// The burst is still within the quiet window.
	v.expect([]);
	thread::sleep(Duration::from_millis(200));
	v.expect([3]);

	relay.broadcast(Event::Value(4));
	thread::sleep(Duration::from_millis(200));
	v.expect([4]);
}

#[test]
fn throttle_emits_leading_and_trailing() {
	let scheduler = Scheduler::serial("throttle-test");
	let (relay, signal) = plain_source();
	let v = Arc::new(Validator::new());
	let _keep = signal
		.throttle(Duration::from_millis(100), &scheduler)
		.on_value({
			let v = v.clone();
			move |n| v.push(n)
		});

	relay.broadcast(Event::Value(1));
	v.expect([1]);
	relay.broadcast(Event::Value(2));
	relay.broadcast(Event::Value(3));
	// Suppressed inside the window; the last one is delivered at its end.
	thread::sleep(Duration::from_millis(300));
	v.expect([3]);
}

#[test]
fn receive_on_moves_delivery_to_the_scheduler() {
	let scheduler = Scheduler::serial("receive-test");
	let (relay, signal) = plain_source();
	let (sender, receiver) = mpsc::channel();
	let scheduler_ = scheduler.clone();
	let _keep = signal.receive_on(&scheduler).on_value(move |n: i32| {
		sender
			.send((n, Scheduler::current().same(&scheduler_)))
			.unwrap();
	});

	relay.broadcast(Event::Value(5));
	let (n, on_scheduler) = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
	assert_eq!(n, 5);
	assert!(on_scheduler);
}

#[test]
fn after_fires_once() {
	let scheduler = Scheduler::serial("after-test");
	let fired = Arc::new(Mutex::new(0));
	let _keep = Signal::after(Duration::from_millis(30), &scheduler).on_value({
		let fired = fired.clone();
		move |()| *fired.lock() += 1
	});
	thread::sleep(Duration::from_millis(200));
	assert_eq!(*fired.lock(), 1);
}

#[test]
fn every_keeps_ticking_until_disposed() {
	let scheduler = Scheduler::serial("every-test");
	let ticks = Arc::new(Mutex::new(0));
	let subscription = Signal::every(Duration::from_millis(25), &scheduler).on_value({
		let ticks = ticks.clone();
		move |()| *ticks.lock() += 1
	});
	thread::sleep(Duration::from_millis(200));
	use rivulet::Disposable;
	subscription.dispose();
	let after_dispose = *ticks.lock();
	assert!(after_dispose >= 3, "expected a few ticks, got {after_dispose}");
	thread::sleep(Duration::from_millis(100));
	// The ticker stops once disposed (modulo one already-scheduled tick).
	assert!(*ticks.lock() <= after_dispose + 1);
}
