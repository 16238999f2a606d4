//! Error kinds for the patch engine.
//!
//! Every error is fatal: the engine never retries, never partially recovers,
//! and never rolls the target back. Each variant names the stage at which it
//! occurred so the top-level CLI can print a diagnostic that points at the
//! failing component.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PatchError>;

/// Fatal error produced while parsing or applying a patch.
#[derive(Error, Debug)]
pub enum PatchError {
    /// Wrong argc or an unreadable path on the command line.
    #[error("argument error: {0}")]
    ArgError(String),

    /// Malformed don't-care map file.
    #[error("don't-care map parse error: {0}")]
    MapParseError(String),

    /// Read, write, or seek past the end of the logical stream a
    /// [`crate::dontcare::MapState`] describes.
    #[error("don't-care map exhausted: {0}")]
    MapExhausted(String),

    /// Any XZ result other than OK/STREAM_END, or an unexpected delta
    /// decoder state.
    #[error("corrupt patch: {0}")]
    CorruptPatch(String),

    /// A failed seek or an intolerable short read on the source file.
    #[error("source I/O error: {0}")]
    SourceIoError(#[source] io::Error),

    /// A source block request would read bytes at or past the pending
    /// write frontier — the in-place safety invariant was about to be
    /// violated.
    #[error("frontier violation: requested source block {blkno} would read past the pending write frontier at {frontier}")]
    FrontierViolation { blkno: u64, frontier: u64 },

    /// A failed write or flush on the target file.
    #[error("target I/O error: {0}")]
    TargetIoError(#[source] io::Error),

    /// A patch-declared window or segment length could not be allocated.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

impl PatchError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        PatchError::CorruptPatch(msg.into())
    }

    pub(crate) fn map_exhausted(msg: impl Into<String>) -> Self {
        PatchError::MapExhausted(msg.into())
    }
}
