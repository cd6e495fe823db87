//! The shared error vocabulary of signals and deferreds.

use std::{
	error::Error,
	fmt::{self, Display, Formatter},
	sync::Arc,
};

/// A shareable dynamic error.
///
/// `Arc`ed rather than boxed: terminal events and completion outcomes are
/// multicast to every listener.
pub type DynError = Arc<dyn Error + Send + Sync + 'static>;

/// How a [`Deferred`](`crate::Deferred`) completed.
pub type Outcome<V> = Result<V, DynError>;

/// The well-known cancellation error.
///
/// Reported when a deferred is cancelled, when a `select` loser is dropped,
/// and when enqueueing on a closed queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Aborted;

impl Display for Aborted {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str("the operation was aborted")
	}
}

impl Error for Aborted {}

impl Aborted {
	/// This error, erased.
	#[must_use]
	pub fn erased() -> DynError {
		Arc::new(Self)
	}
}

/// Whether `error` is the [`Aborted`] marker.
#[must_use]
pub fn is_aborted(error: &DynError) -> bool {
	error.downcast_ref::<Aborted>().is_some()
}
