use std::sync::Arc;

use futures_lite::{future::block_on, StreamExt};
use parking_lot::Mutex;
use rivulet::{Deferred, Event, ReadWriteSignal, Relay, Scheduler, Signal};

mod _validator;
use _validator::Validator;

#[test]
fn cell_reads_writes_and_notifies() {
	let cell = ReadWriteSignal::cell(1);
	assert_eq!(cell.value(), 1);

	let v = Arc::new(Validator::new());
	let _keep = cell.on_value({
		let v = v.clone();
		move |n| v.push(n)
	});
	cell.set_value(2);
	assert_eq!(cell.value(), 2);
	v.expect([2]);
}

#[test]
fn read_only_then_writable_reads_like_the_original() {
	let cell = ReadWriteSignal::cell(10);
	let read = cell.read_only();
	let writable = read.writable({
		let cell = cell.clone();
		move |n| cell.set_value(n)
	});

	let original = Arc::new(Validator::new());
	let roundtrip = Arc::new(Validator::new());
	let _keep = cell.on_value({
		let original = original.clone();
		move |n| original.push(n)
	});
	let _keep2 = writable.on_value({
		let roundtrip = roundtrip.clone();
		move |n| roundtrip.push(n)
	});

	writable.set_value(11);
	cell.set_value(12);
	assert_eq!(writable.value(), 12);
	original.expect([11, 12]);
	roundtrip.expect([11, 12]);
}

#[test]
fn readable_promotion_tracks_the_latest_value() {
	let relay = Relay::new();
	let signal = Signal::from_relay(&relay);
	let readable = signal.readable(0);
	assert_eq!(readable.value(), 0);

	let v = Arc::new(Validator::new());
	let _keep = readable.on_value({
		let v = v.clone();
		move |n| v.push(n)
	});
	relay.broadcast(Event::Value(3));
	assert_eq!(readable.value(), 3);
	v.expect([3]);
}

#[test]
fn plain_conversion_delivers_the_same_values() {
	let cell = ReadWriteSignal::cell(0);
	let plain = cell.plain();
	let v = Arc::new(Validator::new());
	let _keep = plain.on_value({
		let v = v.clone();
		move |n| v.push(n)
	});
	cell.set_value(1);
	cell.set_value(2);
	v.expect([1, 2]);
}

#[test]
fn projection_round_trips_through_the_whole_value() {
	#[derive(Clone, PartialEq, Debug)]
	struct Point {
		x: i32,
		y: i32,
	}

	let cell = ReadWriteSignal::cell(Point { x: 1, y: 2 });
	let x = cell.project(|point| point.x, |point, x| point.x = x);
	assert_eq!(x.value(), 1);

	x.set_value(7);
	assert_eq!(cell.value(), Point { x: 7, y: 2 });
	assert_eq!(x.value(), 7);

	let seen = Arc::new(Mutex::new(Vec::new()));
	let _keep = x.on_value({
		let seen = seen.clone();
		move |x| seen.lock().push(x)
	});
	cell.set_value(Point { x: 8, y: 3 });
	assert_eq!(*seen.lock(), [8]);
}

#[test]
fn constant_has_a_fixed_value() {
	let constant = rivulet::ReadSignal::constant(5);
	assert_eq!(constant.value(), 5);
	let seen = Arc::new(Mutex::new(Vec::new()));
	let _keep = constant.on_value({
		let seen = seen.clone();
		move |n: i32| seen.lock().push(n)
	});
	assert!(seen.lock().is_empty());
}

#[test]
fn signals_bridge_into_streams() {
	let relay = Relay::new();
	let signal = Signal::from_relay(&relay);
	let mut stream = signal.into_stream();

	relay.broadcast(Event::Value(1));
	relay.broadcast(Event::Value(2));
	assert_eq!(block_on(stream.next()), Some(1));
	assert_eq!(block_on(stream.next()), Some(2));

	// Dropping the stream releases the subscription.
	drop(stream);
	assert!(relay.is_empty());
}

#[test]
fn finite_streams_finish_with_the_signal() {
	let relay = Relay::new();
	let signal = rivulet::FiniteSignal::from_relay(&relay);
	let mut stream = signal.into_stream();

	relay.broadcast(Event::Value(7));
	relay.broadcast(Event::end());
	assert_eq!(block_on(stream.next()), Some(7));
	assert_eq!(block_on(stream.next()), None);
}

#[test]
fn deferreds_bridge_both_ways() {
	let value = block_on(Deferred::value(3).map(|n| n + 1).into_future()).unwrap();
	assert_eq!(value, 4);

	let from = Deferred::from_future(&Scheduler::concurrent_background(), async { Ok(9) });
	assert_eq!(block_on(from.into_future()).unwrap(), 9);
}
