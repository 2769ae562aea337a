//! vprlog — a hierarchical log-structured compaction engine for a
//! document-oriented log store.
//!
//! The store ingests a stream of structured patches that mutate a virtual
//! tree of documents; each commit writes a small on-disk "segment" file
//! carrying the minimal diff between the previous and new state of one
//! virtual path. This crate is the compaction engine that folds many tiny
//! segments into progressively larger, self-contained segments so that
//! reconstructing any document's state at any commit stays bounded in I/O.
//!
//! ## Core concepts
//!
//! - **Virtual path ([`Vp`])**: a slash-delimited document identifier.
//! - **[`LogSegment`]**: a descriptor of one committed (or pending) diff,
//!   covering a transaction-seq and commit-count range.
//! - **[`DirCompactor`]**: the per-`(VP, level)` state machine that folds
//!   `Divisor` inputs into one output at `level + 1`.
//! - **[`CompactorRoot`]**: the entry point that dispatches incoming
//!   level-0 segments to the right `DirCompactor`, creating it lazily.
//! - **[`PatchAlgebra`]**: the opaque document patch/diff collaborator,
//!   expressed as a generic trait so production callers can supply their
//!   own structured-document diff algebra.
//!
//! ## Usage
//!
//! ```no_run
//! use vprlog::{CompactorRoot, Config, JsonMergePatch, LogSegment, Vp};
//!
//! let config = Config::new("/tmp/vprlog-example");
//! let root: CompactorRoot<JsonMergePatch> = CompactorRoot::open(config).unwrap();
//!
//! // Upstream ingestion writes the level-0 payload file itself, then
//! // reports the commit:
//! let seg = LogSegment {
//!     vp: Vp::new("/a/b"),
//!     start_tx: 1,
//!     end_tx: 1,
//!     start_commit: 1,
//!     end_commit: 1,
//! };
//! root.on_new_segment(seg).unwrap();
//! root.shutdown();
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod compactor;
pub mod config;
pub mod error;
pub mod file_lock;
pub mod index;
pub mod log_sink;
pub mod patch;
pub mod path;
pub mod recovery_lock;
pub mod retention;
pub mod root;
pub mod segment;
pub mod sequencer;

pub use compactor::DirCompactor;
pub use config::Config;
pub use error::{CompactionError, CompactionResult, StructuralError};
pub use file_lock::FileLock;
pub use index::SegmentIndex;
pub use log_sink::{LogLevel, LogSink, StdLogSink};
pub use patch::{JsonMergePatch, PatchAlgebra};
pub use path::{PathMapper, Vp};
pub use recovery_lock::RecoveryLock;
pub use retention::{
    arc as retention_arc, AlwaysRemove, HeadWindow, HeadWindowLevel, LevelThreshold, NeverRemove,
    Retention,
};
pub use root::CompactorRoot;
pub use segment::{
    commit_pending, read_diff_file, write_diff_file, DiffFile, FilenameKind, LogSegment,
    ParsedFilename,
};
pub use sequencer::Sequencer;
