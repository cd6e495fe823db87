//! The event protocol shared by every stream kind.

use std::{
	error::Error,
	fmt::{self, Debug, Formatter},
	sync::Arc,
};

use crate::outcome::DynError;

/// A signal's payload: a value, or the terminal marker.
///
/// After an [`End`](`Event::End`) no further events are delivered on that
/// subscription. A `None` error denotes graceful completion.
pub enum Event<T> {
	Value(T),
	End(Option<DynError>),
}

impl<T> Event<T> {
	/// The graceful terminal event.
	#[must_use]
	pub fn end() -> Self {
		Self::End(None)
	}

	/// The failing terminal event.
	pub fn end_with(error: impl Error + Send + Sync + 'static) -> Self {
		Self::End(Some(Arc::new(error)))
	}

	#[must_use]
	pub fn is_end(&self) -> bool {
		matches!(self, Self::End(_))
	}

	/// The terminal error, if this is a failing end.
	#[must_use]
	pub fn error(&self) -> Option<&DynError> {
		match self {
			Self::Value(_) => None,
			Self::End(error) => error.as_ref(),
		}
	}

	/// Maps the payload, carrying terminal events across unchanged.
	pub fn map<U>(self, transform: impl FnOnce(T) -> U) -> Event<U> {
		match self {
			Self::Value(value) => Event::Value(transform(value)),
			Self::End(error) => Event::End(error),
		}
	}
}

impl<T: Clone> Clone for Event<T> {
	fn clone(&self) -> Self {
		match self {
			Self::Value(value) => Self::Value(value.clone()),
			Self::End(error) => Self::End(error.clone()),
		}
	}
}

impl<T: Debug> Debug for Event<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
			Self::End(None) => f.write_str("End"),
			Self::End(Some(error)) => f.debug_tuple("End").field(error).finish(),
		}
	}
}

/// The internal wire protocol: [`Event`] plus the subscription handshake.
///
/// `Initial` is delivered exactly once, before any event. For readable
/// streams it carries the snapshot value at subscription time; for plain and
/// finite streams the payload is absent.
pub(crate) enum Pulse<T> {
	Initial(Option<T>),
	Event(Event<T>),
}

impl<T> Pulse<T> {
	pub(crate) fn value(value: T) -> Self {
		Self::Event(Event::Value(value))
	}

	pub(crate) fn is_initial(&self) -> bool {
		matches!(self, Self::Initial(_))
	}

	pub(crate) fn is_end(&self) -> bool {
		matches!(self, Self::Event(Event::End(_)))
	}
}

impl<T: Clone> Clone for Pulse<T> {
	fn clone(&self) -> Self {
		match self {
			Self::Initial(value) => Self::Initial(value.clone()),
			Self::Event(event) => Self::Event(event.clone()),
		}
	}
}

impl<T: Debug> Debug for Pulse<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Initial(value) => f.debug_tuple("Initial").field(value).finish(),
			Self::Event(event) => Debug::fmt(event, f),
		}
	}
}
