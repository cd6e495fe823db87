use std::sync::{
	atomic::{AtomicUsize, Ordering::Relaxed},
	Arc,
};

use headwater::{Disposable, DisposeBag, Disposer, NilDisposer};

#[test]
fn disposer_runs_exactly_once() {
	let count = Arc::new(AtomicUsize::new(0));

	let disposer = Disposer::new({
		let count = count.clone();
		move || { count.fetch_add(1, Relaxed); }
	});
	disposer.dispose();
	disposer.dispose();
	assert_eq!(count.load(Relaxed), 1);

	// Drop after an explicit dispose must not fire again.
	drop(disposer);
	assert_eq!(count.load(Relaxed), 1);
}

#[test]
fn disposer_runs_on_drop() {
	let count = Arc::new(AtomicUsize::new(0));
	drop(Disposer::new({
		let count = count.clone();
		move || { count.fetch_add(1, Relaxed); }
	}));
	assert_eq!(count.load(Relaxed), 1);
}

#[test]
fn disposer_tolerates_reentrant_dispose() {
	let slot: Arc<parking_lot::Mutex<Option<Arc<Disposer>>>> =
		Arc::new(parking_lot::Mutex::new(None));
	let count = Arc::new(AtomicUsize::new(0));

	let disposer = Arc::new(Disposer::new({
		let slot = slot.clone();
		let count = count.clone();
		move || {
			// Dispose the owner from inside its own closure.
			if let Some(own) = slot.lock().take() {
				own.dispose();
			}
			count.fetch_add(1, Relaxed);
		}
	}));
	*slot.lock() = Some(disposer.clone());

	disposer.dispose();
	assert_eq!(count.load(Relaxed), 1);
}

#[test]
fn nil_disposer_is_a_no_op() {
	NilDisposer.dispose();
	NilDisposer.dispose();
}

#[test]
fn bag_disposes_in_insertion_order() {
	let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
	let bag = DisposeBag::new();
	for n in 0..4 {
		let order = order.clone();
		bag.add(Disposer::new(move || order.lock().push(n)));
	}
	assert!(!bag.is_empty());

	bag.dispose();
	assert_eq!(*order.lock(), [0, 1, 2, 3]);
	assert!(bag.is_empty());

	// A second dispose is a no-op.
	bag.dispose();
	assert_eq!(order.lock().len(), 4);
}

#[test]
fn bag_is_reusable_after_dispose() {
	let count = Arc::new(AtomicUsize::new(0));
	let bag = DisposeBag::new();

	for _ in 0..2 {
		let count = count.clone();
		bag.add(Disposer::new(move || { count.fetch_add(1, Relaxed); }));
		bag.dispose();
	}
	assert_eq!(count.load(Relaxed), 2);
}

#[test]
fn reentrant_dispose_observes_empty_bag() {
	let bag = Arc::new(DisposeBag::new());
	let count = Arc::new(AtomicUsize::new(0));

	bag.add(Disposer::new({
		let bag = bag.clone();
		let count = count.clone();
		move || {
			assert!(bag.is_empty());
			bag.dispose();
			count.fetch_add(1, Relaxed);
		}
	}));
	bag.dispose();
	assert_eq!(count.load(Relaxed), 1);
}

#[test]
fn bag_drop_disposes() {
	let count = Arc::new(AtomicUsize::new(0));
	{
		let bag = DisposeBag::new();
		let count = count.clone();
		bag.add(Disposer::new(move || { count.fetch_add(1, Relaxed); }));
	}
	assert_eq!(count.load(Relaxed), 1);
}

#[test]
fn inner_bag_is_tied_to_its_parent() {
	let count = Arc::new(AtomicUsize::new(0));
	let parent = DisposeBag::new();
	let child = parent.inner_bag();
	{
		let count = count.clone();
		child.add(Disposer::new(move || { count.fetch_add(1, Relaxed); }));
	}
	parent.dispose();
	assert_eq!(count.load(Relaxed), 1);
}

#[test]
fn held_values_live_until_dispose() {
	struct Tally(Arc<AtomicUsize>);
	impl Drop for Tally {
		fn drop(&mut self) {
			drop(self.0.fetch_add(1, Relaxed));
		}
	}

	let count = Arc::new(AtomicUsize::new(0));
	let bag = DisposeBag::new();
	bag.hold(Tally(count.clone()));
	assert_eq!(count.load(Relaxed), 0);
	bag.dispose();
	assert_eq!(count.load(Relaxed), 1);
}
