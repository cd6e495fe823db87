use std::{
	sync::{
		atomic::{AtomicUsize, Ordering::Relaxed},
		Arc,
	},
	thread,
	time::Duration,
};

use parking_lot::Mutex;
use rivulet::{
	combine_latest_read_seq, combine_latest_seq, Event, FiniteSignal, ReadWriteSignal, Relay,
	Scheduler, Signal,
};

#[derive(Debug)]
struct Odd(i32);

impl std::fmt::Display for Odd {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "odd value {}", self.0)
	}
}

impl std::error::Error for Odd {}

#[test]
fn try_map_fails_the_stream_on_the_first_error() {
	let relay: Relay<Event<i32>> = Relay::new();
	let halved = Signal::from_relay(&relay)
		.try_map(|n| if n % 2 == 0 { Ok(n / 2) } else { Err(Odd(n)) });

	let values = Arc::new(Mutex::new(Vec::new()));
	let errors = Arc::new(Mutex::new(Vec::new()));
	let _keep = halved
		.at_error({
			let errors = errors.clone();
			move |error| errors.lock().push(error.to_string())
		})
		.on_event({
			let values = values.clone();
			move |event| {
				if let Event::Value(n) = event {
					values.lock().push(n);
				}
			}
		});

	relay.broadcast(Event::Value(4));
	relay.broadcast(Event::Value(3));
	relay.broadcast(Event::Value(8)); // past the end; dropped
	assert_eq!(*values.lock(), [2]);
	assert_eq!(*errors.lock(), ["odd value 3"]);
}

#[test]
fn finite_merge_fails_fast() {
	let relay_a: Relay<Event<i32>> = Relay::new();
	let relay_b: Relay<Event<i32>> = Relay::new();
	let merged = FiniteSignal::merge([
		FiniteSignal::from_relay(&relay_a),
		FiniteSignal::from_relay(&relay_b),
	]);

	let outcomes = Arc::new(Mutex::new(Vec::new()));
	let _keep = merged.on_event({
		let outcomes = outcomes.clone();
		move |event| {
			outcomes.lock().push(match event {
				Event::Value(n) => n.to_string(),
				Event::End(None) => "end".into(),
				Event::End(Some(error)) => error.to_string(),
			});
		}
	});

	relay_a.broadcast(Event::Value(1));
	relay_b.broadcast(Event::end_with(Odd(5)));
	// The error terminated the merge; survivors are ignored.
	relay_a.broadcast(Event::Value(2));
	assert_eq!(*outcomes.lock(), ["1", "odd value 5"]);
}

#[test]
fn flat_map_latest_can_opt_out_of_inner_errors() {
	let relay: Relay<Event<i32>> = Relay::new();
	let inners: Relay<Event<i32>> = Relay::new();
	let switched = Signal::from_relay(&relay).flat_map_latest_ignoring_error({
		let inners = inners.clone();
		move |_| FiniteSignal::from_relay(&inners)
	});

	let seen = Arc::new(Mutex::new(Vec::new()));
	let ended = Arc::new(AtomicUsize::new(0));
	let _keep = switched.on_event({
		let seen = seen.clone();
		let ended = ended.clone();
		move |event| match event {
			Event::Value(n) => seen.lock().push(n),
			Event::End(_) => {
				ended.fetch_add(1, Relaxed);
			}
		}
	});

	relay.broadcast(Event::Value(0));
	inners.broadcast(Event::Value(1));
	inners.broadcast(Event::end_with(Odd(9)));
	// The inner failure is swallowed; a new switch keeps the stream going.
	relay.broadcast(Event::Value(0));
	inners.broadcast(Event::Value(2));
	assert_eq!(*seen.lock(), [1, 2]);
	assert_eq!(ended.load(Relaxed), 0);
}

#[test]
fn combine_latest_over_an_empty_sequence() {
	let plain = combine_latest_seq(Vec::<Signal<i32>>::new());
	let values = Arc::new(AtomicUsize::new(0));
	let _keep = plain.on_value({
		let values = values.clone();
		move |_| {
			values.fetch_add(1, Relaxed);
		}
	});
	assert_eq!(values.load(Relaxed), 0);

	let readable = combine_latest_read_seq(Vec::<rivulet::ReadSignal<i32>>::new());
	assert_eq!(readable.value(), Vec::<i32>::new());
}

#[test]
fn combine_latest_over_a_sequence_of_cells() {
	let cells: Vec<ReadWriteSignal<i32>> =
		(0..3).map(ReadWriteSignal::cell).collect();
	let combined =
		combine_latest_read_seq(cells.iter().map(ReadWriteSignal::read_only));
	assert_eq!(combined.value(), [0, 1, 2]);

	let seen = Arc::new(Mutex::new(Vec::new()));
	let _keep = combined.on_value({
		let seen = seen.clone();
		move |all| seen.lock().push(all)
	});
	cells[1].set_value(9);
	assert_eq!(*seen.lock(), [vec![0, 9, 2]]);
}

#[test]
fn zero_debounce_still_defers_to_the_scheduler() {
	let scheduler = Scheduler::serial("edge-debounce");
	let relay: Relay<Event<i32>> = Relay::new();
	let debounced = Signal::from_relay(&relay).debounce(Duration::ZERO, &scheduler);

	let seen = Arc::new(Mutex::new(Vec::new()));
	let _keep = debounced.on_value({
		let seen = seen.clone();
		let scheduler = scheduler.clone();
		move |n| {
			seen.lock()
				.push((n, Scheduler::current().same(&scheduler)));
		}
	});

	relay.broadcast(Event::Value(1));
	thread::sleep(Duration::from_millis(100));
	// Not synchronous, even at zero: delivery happened on the scheduler's
	// tick, not in the broadcasting frame.
	assert_eq!(*seen.lock(), [(1, true)]);
}
