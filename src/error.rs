//! # Cursor Errors
//!
//! Lookups never fail: a missing key is reported through the end cursor or a
//! `None`, and inserting an existing key is a no-op that reports the entry
//! already in the tree. The only failures are misuses of a [`Cursor`]:
//!
//! ```text
//! cursor ──► belongs to this tree? ──no──► Err(ForeignCursor)
//!                 │ yes
//!                 ▼
//!            entry still alive? ───no──► Err(StaleCursor)
//!                 │ yes
//!                 ▼
//!            positioned at end? ──yes──► Err(EndOfTree)   (when an entry is required)
//!                 │ no
//!                 ▼
//!               Ok(entry)
//! ```
//!
//! These are programming errors rather than conditions to retry. The plain
//! cursor methods (`entry_at`, `erase`, `Cursor::move_next`, ...) panic with
//! the error's message; the `try_` variants hand the error back so callers
//! can assert on it.
//!
//! [`Cursor`]: crate::iter::Cursor

use thiserror::Error;

/// Ways a cursor can be misused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// The cursor is at the end position, which has no entry.
	///
	/// Returned when dereferencing or erasing through an end cursor, and
	/// when advancing a cursor that is already past the last entry.
	#[error("cursor is positioned at the end of the tree")]
	EndOfTree,

	/// The entry the cursor referred to has been erased.
	///
	/// Slot reuse does not revive a stale cursor: each slot carries a
	/// generation that is bumped on removal.
	#[error("cursor refers to an entry that has been erased")]
	StaleCursor,

	/// The cursor was produced by a different tree.
	#[error("cursor belongs to a different tree")]
	ForeignCursor,

	/// Stepping back from the end position of an empty tree.
	#[error("tree is empty")]
	EmptyTree,
}

/// A Result type alias using the cursor [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
