//! The keyed multicast primitive.

use std::{
	collections::BTreeMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Weak,
	},
};

use parking_lot::Mutex;

use crate::disposable::Disposer;

/// A process-unique registration key.
///
/// Keys are handed out from one monotonic counter, so they are ordered by
/// allocation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(u64);

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

impl Key {
	/// Allocates a fresh key.
	#[must_use]
	pub fn next() -> Self {
		Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
	}
}

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// The listener table, specialized for the common zero- and one-listener
/// cases to skip the map allocation. Observationally equivalent to a single
/// map.
enum Listeners<T> {
	Empty,
	Single(Key, Callback<T>),
	Multiple(BTreeMap<Key, Callback<T>>),
}

impl<T> Listeners<T> {
	fn insert(&mut self, key: Key, callback: Callback<T>) {
		match self {
			Self::Empty => *self = Self::Single(key, callback),
			Self::Single(existing_key, existing) => {
				let mut map = BTreeMap::new();
				map.insert(*existing_key, Arc::clone(existing));
				map.insert(key, callback);
				*self = Self::Multiple(map);
			}
			Self::Multiple(map) => {
				map.insert(key, callback);
			}
		}
	}

	fn remove(&mut self, key: Key) {
		match self {
			Self::Empty => {}
			Self::Single(existing_key, _) => {
				if *existing_key == key {
					*self = Self::Empty;
				}
			}
			Self::Multiple(map) => {
				map.remove(&key);
				if map.is_empty() {
					*self = Self::Empty;
				}
			}
		}
	}

	fn is_empty(&self) -> bool {
		match self {
			Self::Empty => true,
			Self::Single(..) => false,
			Self::Multiple(map) => map.is_empty(),
		}
	}
}

/// A keyed multicast point: register callbacks, broadcast values to all of
/// them.
///
/// Cloning shares the listener table.
pub struct Relay<T> {
	listeners: Arc<Mutex<Listeners<T>>>,
}

impl<T> Clone for Relay<T> {
	fn clone(&self) -> Self {
		Self {
			listeners: Arc::clone(&self.listeners),
		}
	}
}

impl<T> Default for Relay<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> Relay<T> {
	#[must_use]
	pub fn new() -> Self {
		Self {
			listeners: Arc::new(Mutex::new(Listeners::Empty)),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.listeners.lock().is_empty()
	}

	/// Registers `callback`, returning a handle that removes it on disposal.
	///
	/// The handle holds the table weakly, so outstanding handles do not keep
	/// the relay alive.
	pub fn subscribe(&self, callback: impl Fn(T) + Send + Sync + 'static) -> Disposer
	where
		T: 'static,
	{
		let key = Key::next();
		self.listeners.lock().insert(key, Arc::new(callback));

		let listeners: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.listeners);
		Disposer::new(move || {
			if let Some(listeners) = listeners.upgrade() {
				listeners.lock().remove(key);
			}
		})
	}

	/// Invokes every registered callback with `value`.
	///
	/// # Logic
	///
	/// The registrations are snapshotted under the lock and invoked outside
	/// it, in key order, isolating the broadcast against concurrent mutation
	/// (including mutation by the callbacks themselves).
	pub fn broadcast(&self, value: T)
	where
		T: Clone,
	{
		let snapshot: Vec<Callback<T>> = match &*self.listeners.lock() {
			Listeners::Empty => return,
			Listeners::Single(_, callback) => vec![Arc::clone(callback)],
			Listeners::Multiple(map) => map.values().map(Arc::clone).collect(),
		};
		for callback in snapshot {
			callback(value.clone());
		}
	}
}
