use std::{
	sync::{
		atomic::{AtomicUsize, Ordering::Relaxed},
		Arc,
	},
	thread,
	time::{Duration, Instant},
};

use futures_lite::future::block_on;
use parking_lot::Mutex;
use rivulet::{is_aborted, join_all, Aborted, Deferred, DeferredQueue, Scheduler};

fn sleeping_op(duration: Duration) -> Deferred<i32> {
	Deferred::new_on(&Scheduler::background(), move |resolver, _mover| {
		Scheduler::current().disposable_run_after(duration, move || resolver.succeed(0))
	})
}

#[test]
fn serial_queue_runs_in_enqueue_order_one_at_a_time() {
	let queue = DeferredQueue::serial((), &Scheduler::serial("queue-serial"));
	let starts: Arc<Mutex<Vec<(usize, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

	let futures: Vec<Deferred<i32>> = (0..3)
		.map(|index| {
			let starts = starts.clone();
			queue.enqueue(move |_| {
				starts.lock().push((index, Instant::now()));
				sleeping_op(Duration::from_millis(100))
			})
		})
		.collect();

	block_on(join_all(futures).into_future()).unwrap();
	let starts = starts.lock();
	assert_eq!(
		starts.iter().map(|(index, _)| *index).collect::<Vec<_>>(),
		[0, 1, 2]
	);
	// Serial execution: each start waits out the previous sleep.
	for window in starts.windows(2) {
		let gap = window[1].1 - window[0].1;
		assert!(gap >= Duration::from_millis(50), "items overlapped: {gap:?}");
	}
}

#[test]
fn concurrency_is_bounded_by_the_limit() {
	let queue = DeferredQueue::new((), 2, &Scheduler::serial("queue-bounded"));
	let running = Arc::new(AtomicUsize::new(0));
	let peak = Arc::new(AtomicUsize::new(0));

	let futures: Vec<Deferred<i32>> = (0..5)
		.map(|_| {
			let running = running.clone();
			let peak = peak.clone();
			queue.enqueue(move |_| {
				let now = running.fetch_add(1, Relaxed) + 1;
				peak.fetch_max(now, Relaxed);
				let running = running.clone();
				sleeping_op(Duration::from_millis(50)).on_result(move |_| {
					running.fetch_sub(1, Relaxed);
				})
			})
		})
		.collect();

	block_on(join_all(futures).into_future()).unwrap();
	assert_eq!(peak.load(Relaxed), 2);
}

#[test]
fn closing_fails_queued_and_future_work() {
	let queue = DeferredQueue::serial((), &Scheduler::serial("queue-close"));

	let blocker = queue.enqueue(|_| sleeping_op(Duration::from_millis(200)));
	let waiting = queue.enqueue(|_| Deferred::value(1));
	thread::sleep(Duration::from_millis(50));

	queue.abort_queued_operations(Aborted::erased(), true);
	assert!(is_aborted(
		&block_on(waiting.into_future()).unwrap_err()
	));
	// The running operation is left alone.
	assert!(block_on(blocker.into_future()).is_ok());

	// Enqueueing on the closed queue fails immediately.
	let refused = queue.enqueue(|_| Deferred::value(2));
	assert!(refused.peek().expect("refused synchronously").is_err());
}

#[test]
fn emptiness_is_observable() {
	let queue = DeferredQueue::serial((), &Scheduler::serial("queue-empty"));
	assert!(queue.is_empty());

	let transitions = Arc::new(Mutex::new(Vec::new()));
	let _watch = queue.is_empty_signal().on_value({
		let transitions = transitions.clone();
		move |empty| transitions.lock().push(empty)
	});
	let drained = Arc::new(AtomicUsize::new(0));
	let _watch2 = queue.did_become_empty().on_value({
		let drained = drained.clone();
		move |()| {
			drained.fetch_add(1, Relaxed);
		}
	});

	let work = queue.enqueue(|_| sleeping_op(Duration::from_millis(50)));
	assert!(!queue.is_empty());
	block_on(work.into_future()).unwrap();
	thread::sleep(Duration::from_millis(50));

	assert!(queue.is_empty());
	assert_eq!(*transitions.lock(), [false, true]);
	assert_eq!(drained.load(Relaxed), 1);
}

#[test]
fn batches_complete_once_the_child_drains() {
	let queue = DeferredQueue::new(AtomicUsize::new(0), 2, &Scheduler::serial("queue-batch"));

	let batched = queue.enqueue_batch(|child| {
		let first = child.enqueue(|counter| {
			counter.fetch_add(1, Relaxed);
			sleeping_op(Duration::from_millis(40))
		});
		let second = child.enqueue(|counter| {
			counter.fetch_add(1, Relaxed);
			sleeping_op(Duration::from_millis(60))
		});
		first.join(&second).map(|_| 9)
	});

	assert_eq!(block_on(batched.into_future()).unwrap(), 9);
	assert_eq!(queue.resource().load(Relaxed), 2);
}
