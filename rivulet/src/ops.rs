//! The transformation algebra.
//!
//! Every operator subscribes through its source and returns a fresh signal;
//! output kinds follow the algebra on [`Kind`](`crate::kind::Kind`).

mod combine;
mod fold;
mod latest;
mod slice;
mod timing;
mod transform;

pub use combine::{combine_latest_read_seq, combine_latest_seq, CombineLatest};
