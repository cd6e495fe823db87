use std::{
	sync::{
		atomic::{AtomicUsize, Ordering::Relaxed},
		Arc,
	},
	thread,
	time::Duration,
};

use futures_lite::future::block_on;
use rivulet::{
	is_aborted, join_all, map_to_deferred, map_to_deferred_outcomes, select_all, Aborted,
	Deferred, Disposer, Picked, Scheduler, SingleFlight,
};

fn delayed_value(value: i32, delay: Duration) -> Deferred<i32> {
	Deferred::new_on(&Scheduler::background(), move |resolver, _mover| {
		Scheduler::current().disposable_run_after(delay, move || resolver.succeed(value))
	})
}

#[test]
fn completed_constructors() {
	assert_eq!(Deferred::value(3).peek().unwrap().unwrap(), 3);
	assert!(Deferred::<i32>::error(Aborted).peek().unwrap().is_err());
	assert!(Deferred::<i32>::never().peek().is_none());
}

#[test]
fn map_and_chain() {
	let doubled = Deferred::value(21).map(|n| n * 2);
	assert_eq!(block_on(doubled.into_future()).unwrap(), 42);

	let chained = Deferred::value(2).and_then(|n| delayed_value(n + 5, Duration::from_millis(20)));
	assert_eq!(block_on(chained.into_future()).unwrap(), 7);

	let recovered = Deferred::<i32>::error(Aborted).or_else(|_| Deferred::value(1));
	assert_eq!(block_on(recovered.into_future()).unwrap(), 1);
}

#[test]
fn completion_happens_at_most_once() {
	let (future, resolver) = Deferred::pending();
	let completions = Arc::new(AtomicUsize::new(0));
	let _keep = {
		let completions = completions.clone();
		future.on_result(move |_| {
			completions.fetch_add(1, Relaxed);
		})
	};
	// Give the tap's body a moment to install.
	thread::sleep(Duration::from_millis(50));
	resolver.succeed(1);
	resolver.succeed(2);
	resolver.fail(Aborted);
	thread::sleep(Duration::from_millis(50));
	assert_eq!(completions.load(Relaxed), 1);
	assert_eq!(future.peek().unwrap().unwrap(), 1);
}

#[test]
fn cancel_is_refused_while_listened_to() {
	// An unlistened future cancels into Aborted.
	let lone = delayed_value(42, Duration::from_millis(100));
	lone.cancel();
	assert!(is_aborted(&lone.peek().expect("cancelled").unwrap_err()));

	// A listener pins the future: cancel is a no-op and the value arrives.
	let listened = delayed_value(42, Duration::from_millis(100));
	let tapped = listened.on_value(|_| {});
	thread::sleep(Duration::from_millis(30));
	listened.cancel();
	assert!(listened.peek().is_none());
	assert_eq!(block_on(tapped.into_future()).unwrap(), 42);
}

#[test]
fn disposing_the_composite_cascades_the_cancellation() {
	let upstream = delayed_value(42, Duration::from_millis(60_000));
	let cancelled = Arc::new(AtomicUsize::new(0));
	let composite = upstream.on_cancel({
		let cancelled = cancelled.clone();
		move || {
			cancelled.fetch_add(1, Relaxed);
		}
	});
	// Let the combinator bodies install their wiring.
	thread::sleep(Duration::from_millis(50));

	composite.cancel();
	thread::sleep(Duration::from_millis(50));
	assert_eq!(cancelled.load(Relaxed), 1);
	assert!(is_aborted(&composite.peek().expect("cancelled").unwrap_err()));
	// The upstream lost its only listener and was cancelled with it.
	assert!(is_aborted(&upstream.peek().expect("cancelled").unwrap_err()));
}

#[test]
fn always_fires_on_completion_and_on_cancellation() {
	let fired = Arc::new(AtomicUsize::new(0));
	let completed = Deferred::value(1).always({
		let fired = fired.clone();
		move || {
			fired.fetch_add(1, Relaxed);
		}
	});
	assert_eq!(block_on(completed.into_future()).unwrap(), 1);
	assert_eq!(fired.load(Relaxed), 1);

	let cancelled = delayed_value(1, Duration::from_millis(60_000)).always({
		let fired = fired.clone();
		move || {
			fired.fetch_add(1, Relaxed);
		}
	});
	thread::sleep(Duration::from_millis(50));
	cancelled.cancel();
	thread::sleep(Duration::from_millis(50));
	assert_eq!(fired.load(Relaxed), 2);
}

#[test]
fn join_pairs_and_select_races() {
	let pair = delayed_value(1, Duration::from_millis(20)).join(&Deferred::value(2));
	assert_eq!(block_on(pair.into_future()).unwrap(), (1, 2));

	let slow = delayed_value(1, Duration::from_millis(60_000));
	let winner = slow.select(&Deferred::value(9));
	assert_eq!(
		block_on(winner.into_future()).unwrap(),
		Picked::Second(9)
	);
	// The loser was released and thereby cancelled.
	thread::sleep(Duration::from_millis(100));
	assert!(is_aborted(&slow.peek().expect("loser cancelled").unwrap_err()));
}

#[test]
fn join_fails_fast() {
	let slow = delayed_value(1, Duration::from_millis(60_000));
	let failed = slow.join(&Deferred::<i32>::error(Aborted));
	assert!(block_on(failed.into_future()).is_err());
}

#[test]
fn sequences_run_serially() {
	assert_eq!(
		block_on(join_all([Deferred::value(1), Deferred::value(2)]).into_future()).unwrap(),
		[1, 2]
	);
	assert_eq!(
		block_on(
			select_all([
				delayed_value(1, Duration::from_millis(60_000)),
				Deferred::value(5)
			])
			.into_future()
		)
		.unwrap(),
		5
	);

	let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
	let mapped = map_to_deferred([1, 2, 3], {
		let order = order.clone();
		move |n| {
			order.lock().push(n);
			Deferred::value(n * 10)
		}
	});
	assert_eq!(block_on(mapped.into_future()).unwrap(), [10, 20, 30]);
	assert_eq!(*order.lock(), [1, 2, 3]);

	// The collecting variant keeps per-element failures.
	let outcomes = map_to_deferred_outcomes([1, 2], |n| {
		if n == 1 {
			Deferred::value(n)
		} else {
			Deferred::error(Aborted)
		}
	});
	let outcomes = block_on(outcomes.into_future()).unwrap();
	assert!(outcomes[0].is_ok());
	assert!(outcomes[1].is_err());
}

#[test]
fn repetition_is_driven_iteratively() {
	let runs = Arc::new(AtomicUsize::new(0));
	let counting = {
		let runs = runs.clone();
		Deferred::new(move |resolver, _mover| {
			let n = runs.fetch_add(1, Relaxed) + 1;
			resolver.succeed(n as i32);
			Disposer::noop()
		})
	};
	// Repeat while the value is small; every round completes synchronously.
	let repeated = counting.on_result_repeat(None, None, |outcome| {
		matches!(outcome, Ok(n) if *n < 100)
	});
	assert_eq!(block_on(repeated.into_future()).unwrap(), 100);
	assert_eq!(runs.load(Relaxed), 100);
}

#[test]
fn repeat_and_collect_gathers_successes() {
	let runs = Arc::new(AtomicUsize::new(0));
	let counting = {
		let runs = runs.clone();
		Deferred::new(move |resolver, _mover| {
			let n = runs.fetch_add(1, Relaxed) + 1;
			resolver.succeed(n as i32);
			Disposer::noop()
		})
	};
	let collected = counting.repeat_and_collect(3, None);
	assert_eq!(block_on(collected.into_future()).unwrap(), [1, 2, 3]);
}

#[test]
fn replace_races_a_timer() {
	let slow = delayed_value(42, Duration::from_millis(60_000));
	let replaced = slow.succeed_after(7, Duration::from_millis(30));
	assert_eq!(block_on(replaced.into_future()).unwrap(), 7);

	let fast = delayed_value(42, Duration::from_millis(20));
	let kept = fast.succeed_after(7, Duration::from_millis(60_000));
	assert_eq!(block_on(kept.into_future()).unwrap(), 42);
}

#[test]
fn single_flight_coalesces_concurrent_requests() {
	let produced = Arc::new(AtomicUsize::new(0));
	let flight: SingleFlight<i32> = SingleFlight::new();

	let (task, resolver) = Deferred::pending();
	let first = flight.perform({
		let produced = produced.clone();
		let task = task.clone();
		move || {
			produced.fetch_add(1, Relaxed);
			task
		}
	});
	let second = flight.perform({
		let produced = produced.clone();
		move || {
			produced.fetch_add(1, Relaxed);
			unreachable!("the slot was occupied")
		}
	});
	assert!(flight.is_performing());
	assert_eq!(produced.load(Relaxed), 1);

	resolver.succeed(5);
	assert_eq!(block_on(first.into_future()).unwrap(), 5);
	assert_eq!(block_on(second.into_future()).unwrap(), 5);
	assert!(!flight.is_performing());

	// A fresh call starts a fresh task.
	let third = flight.perform({
		let produced = produced.clone();
		move || {
			produced.fetch_add(1, Relaxed);
			Deferred::value(6)
		}
	});
	assert_eq!(produced.load(Relaxed), 2);
	assert_eq!(block_on(third.into_future()).unwrap(), 6);
}
