#![warn(clippy::pedantic)]

//! Push-based reactive streams (`Signal` and friends), single-completion
//! asynchronous values (`Deferred`), and the work queue gating them, over
//! the `headwater` scheduling and lifetime substrate.

mod outcome;
pub use outcome::{is_aborted, Aborted, DynError, Outcome};

mod event;
pub use event::Event;

pub mod kind;

mod signal;
pub use signal::{CoreSignal, Emitter, FiniteSignal, ReadSignal, ReadWriteSignal, Signal};

mod ops;
pub use ops::{combine_latest_read_seq, combine_latest_seq, CombineLatest};

mod conversions;
pub use conversions::SignalStream;

mod deferred;
pub use deferred::{
	join::{join_all, map_to_deferred, map_to_deferred_outcomes, select_all},
	Deferred, DeferredFuture, DeferredQueue, Mover, Picked, Resolver, SingleFlight,
};

pub use headwater::{Disposable, DisposeBag, Disposer, Key, NilDisposer, Relay, Scheduler};
