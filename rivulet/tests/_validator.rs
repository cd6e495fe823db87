use std::{collections::VecDeque, fmt::Debug};

use parking_lot::Mutex;

/// Records a sequence of observations and asserts on it.
pub struct Validator<T>(Mutex<VecDeque<T>>);

impl<T> Validator<T> {
	pub const fn new() -> Self {
		Self(Mutex::new(VecDeque::new()))
	}

	pub fn push(&self, value: T) {
		self.0.lock().push_back(value);
	}

	#[track_caller]
	pub fn expect(&self, expected: impl IntoIterator<Item = T>)
	where
		T: Debug + Eq,
	{
		let mut recorded = self.0.lock();
		let mut actual = recorded.drain(..);
		let mut expected = expected.into_iter();
		loop {
			match (actual.next(), expected.next()) {
				(None, None) => break,
				(actual, expected) => assert_eq!(actual, expected),
			}
		}
	}
}
