#![warn(clippy::pedantic)]
#![warn(unreachable_pub)]

pub mod disposable;
pub use disposable::{Disposable, DisposeBag, Disposer, NilDisposer};

pub mod relay;
pub use relay::{Key, Relay};

pub mod scheduler;
pub use scheduler::Scheduler;
