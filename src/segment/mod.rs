//! Segment descriptors, filenames, and on-disk payload files.

pub mod file;
pub mod filename;

pub use file::{commit_pending, pending_point_path, pending_range_path, read_diff_file, write_diff_file, DiffFile};
pub use filename::{
    format_committed_point, format_committed_range, format_pending_point, format_pending_range,
    parse_filename, FilenameKind, ParsedFilename,
};

use std::path::{Path, PathBuf};

use crate::path::Vp;

/// A segment descriptor (§3): a committed segment's commit range is
/// `[0, 0]` iff it's still pending. Level is implicit by filename, not
/// stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSegment {
    pub vp: Vp,
    pub start_tx: u64,
    pub end_tx: u64,
    pub start_commit: u64,
    pub end_commit: u64,
}

impl LogSegment {
    /// Whether this descriptor is a point segment (single transaction).
    #[must_use]
    pub fn is_point(&self) -> bool {
        self.start_tx == self.end_tx && self.start_commit == self.end_commit
    }

    /// Whether this descriptor is still pending (not yet committed).
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.start_commit == 0 && self.end_commit == 0
    }

    /// The filename this descriptor would have at `level`, given its
    /// current pending/committed state.
    #[must_use]
    pub fn filename(&self, level: u32) -> String {
        if self.is_pending() {
            if self.is_point() {
                format_pending_point(self.start_tx)
            } else {
                format_pending_range(self.start_tx, self.end_tx, level)
            }
        } else if level == 0 {
            format_committed_point(self.start_commit, self.start_tx, level)
        } else {
            format_committed_range(self.start_commit, self.start_tx, self.end_commit, self.end_tx, level)
        }
    }

    /// The full filesystem path for this descriptor at `level`, rooted
    /// at `dir` (the VP's directory).
    #[must_use]
    pub fn path_in(&self, dir: &Path, level: u32) -> PathBuf {
        dir.join(self.filename(level))
    }

    /// Builds a descriptor from a parsed filename and the owning VP.
    #[must_use]
    pub fn from_parsed(vp: Vp, parsed: &ParsedFilename) -> Self {
        Self {
            vp,
            start_tx: parsed.start_tx,
            end_tx: parsed.end_tx,
            start_commit: parsed.start_commit,
            end_commit: parsed.end_commit,
        }
    }
}
