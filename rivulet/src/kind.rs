//! The stream kind algebra.
//!
//! Kinds are compile-time capability tags. Operators consume them through
//! the associated types on [`Kind`], which encode the demotion table: a
//! transform that cannot reverse a mutation drops the write capability, a
//! transform that cannot guarantee a current value drops the read
//! capability, and termination is always preserved.

mod private {
	pub trait Sealed {}
}

/// The capability tag of a stream.
pub trait Kind: private::Sealed + Send + Sync + 'static {
	/// This kind with the write capability removed (`ReadWrite` becomes
	/// `Read`; everything else is unchanged).
	type DropWrite: Kind;
	/// This kind with read and write capabilities removed (readables become
	/// `Plain`; `Finite` stays `Finite`).
	type DropRead: Kind;

	const READABLE: bool;
	const WRITABLE: bool;
	const FINITE: bool;
}

/// Kinds with an accessible current value.
pub trait Readable: Kind {}

/// Kinds with a writable current value.
pub trait Writable: Readable {}

/// No current value, never terminates.
pub struct Plain;

/// Readable current value.
pub struct Read;

/// Readable and writable current value.
pub struct ReadWrite;

/// No current value, may terminate.
pub struct Finite;

impl private::Sealed for Plain {}
impl private::Sealed for Read {}
impl private::Sealed for ReadWrite {}
impl private::Sealed for Finite {}

impl Kind for Plain {
	type DropWrite = Plain;
	type DropRead = Plain;
	const READABLE: bool = false;
	const WRITABLE: bool = false;
	const FINITE: bool = false;
}

impl Kind for Read {
	type DropWrite = Read;
	type DropRead = Plain;
	const READABLE: bool = true;
	const WRITABLE: bool = false;
	const FINITE: bool = false;
}

impl Kind for ReadWrite {
	type DropWrite = Read;
	type DropRead = Plain;
	const READABLE: bool = true;
	const WRITABLE: bool = true;
	const FINITE: bool = false;
}

impl Kind for Finite {
	type DropWrite = Finite;
	type DropRead = Finite;
	const READABLE: bool = false;
	const WRITABLE: bool = false;
	const FINITE: bool = true;
}

impl Readable for Read {}
impl Readable for ReadWrite {}
impl Writable for ReadWrite {}
