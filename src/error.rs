//! Error types for vprlog.
//!
//! All errors are strongly typed using `thiserror`. The split between
//! [`StructuralError`] and the rest mirrors the spec's fatal/transient
//! distinction: a structural error is a bug (missing file the directory
//! scan just listed, a broken invariant, a rename target that already
//! exists) and is never retried; everything else funnelled through
//! [`CompactionError::Io`] is transient and drives the recovery backoff
//! loop.

use std::path::PathBuf;

use thiserror::Error;

use crate::path::Vp;

/// Errors that indicate a broken invariant or a structural promise the
/// upstream ingestion pipeline failed to keep. Always fatal: never
/// retried, always logged with full context before the worker dies.
#[derive(Debug, Error)]
pub enum StructuralError {
    /// A segment file the directory scan (or upstream's `OnNewSegment`
    /// call) said existed could not be read.
    #[error("segment file missing for {vp} level {level}: {path}")]
    MissingSegmentFile {
        /// Virtual path of the owning DirCompactor.
        vp: Vp,
        /// Level the file was expected at.
        level: u32,
        /// Expected path.
        path: PathBuf,
    },

    /// A pending-to-committed rename targeted a path that already exists.
    #[error("rename target already exists: {path}")]
    RenameTargetExists {
        /// Path that unexpectedly already existed.
        path: PathBuf,
    },

    /// `commit_pending` was asked to rename a pending file that does not
    /// exist on disk.
    #[error("pending segment file missing: {path}")]
    PendingFileMissing {
        /// Expected path of the pending file.
        path: PathBuf,
    },

    /// One of the `rotate` assertions in §4.4 was violated.
    #[error("invariant violated during rotate for {vp} level {level}: {reason}")]
    AssertionViolated {
        /// Virtual path of the owning DirCompactor.
        vp: Vp,
        /// Level the violation occurred at.
        level: u32,
        /// Human-readable description of the violated invariant.
        reason: String,
    },

    /// The sequencer's binary state record had the wrong length or could
    /// not be parsed.
    #[error("corrupt sequencer state file {path}: {reason}")]
    CorruptSequencerState {
        /// Path of the offending file.
        path: PathBuf,
        /// Reason for rejection.
        reason: String,
    },
}

/// Top-level error type for vprlog.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// A structural bug. Never retried.
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    /// A transient I/O failure. Drives `recover()`'s backoff loop.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else that doesn't fit the above two buckets.
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl CompactionError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a structural (fatal, never-retried) error.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }

    /// Returns true if a `recover()` retry loop should be entered for this
    /// error rather than treating it as fatal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Result type alias for vprlog operations.
pub type CompactionResult<T> = Result<T, CompactionError>;
