//! Shared test helpers: a recording log sink, and the small bits of
//! "upstream ingestion" every scenario needs to fake — writing a
//! committed level-0 payload file directly, the way the out-of-scope
//! ingestion front end would, then reporting the commit the same way it
//! would: through the shared sequencer.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use vprlog::{
    segment::format_committed_point, CompactionResult, CompactorRoot, DiffFile, JsonMergePatch,
    LogLevel, LogSegment, LogSink, PatchAlgebra, PathMapper, Vp,
};

/// A `LogSink` that records every record instead of forwarding to `log`,
/// so recovery-backoff and retention-warning paths are assertable without
/// parsing stderr.
#[derive(Default, Clone)]
pub struct RecordingLogSink {
    records: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl RecordingLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records.lock().unwrap().clone()
    }

    pub fn contains(&self, level: LogLevel, substring: &str) -> bool {
        self.records()
            .iter()
            .any(|(l, m)| *l == level && m.contains(substring))
    }
}

impl LogSink for RecordingLogSink {
    fn log(&self, level: LogLevel, target: &str, message: &str) {
        self.records
            .lock()
            .unwrap()
            .push((level, format!("[{target}] {message}")));
    }
}

/// Writes a *committed* level-0 diff file directly to disk, simulating
/// what the (out-of-scope) ingestion front end does before calling
/// `on_new_segment`.
pub fn write_committed_level0(
    mapper: &PathMapper,
    vp: &Vp,
    tx: u64,
    commit: u64,
    diff: Value,
) -> CompactionResult<LogSegment> {
    let dir = mapper.dir_for(vp);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format_committed_point(commit, tx, 0));
    let df = DiffFile {
        seq: tx,
        diff,
        inputs: 1,
        pending: false,
    };
    vprlog::write_diff_file(&path, &df)?;
    Ok(LogSegment {
        vp: vp.clone(),
        start_tx: tx,
        end_tx: tx,
        start_commit: commit,
        end_commit: commit,
    })
}

/// Simulates one full upstream write for `vp`: allocates `TxSeq` and
/// `CommitCount` from the engine's own sequencer (exactly as real
/// ingestion would via `NextCommitIfPathSeqMatches`), writes the
/// committed level-0 file, and reports it to the engine.
///
/// Returns the `LogSegment` describing the write.
pub fn feed(root: &CompactorRoot<JsonMergePatch>, vp: &Vp, diff: Value) -> LogSegment {
    let expected = root.sequencer().get_path_seq(vp);
    let tx = root.sequencer().next_tx_seq().unwrap();
    let (commit, matched) = root
        .sequencer()
        .next_commit_if_path_seq_matches(vp, expected)
        .unwrap();
    assert!(matched, "path-seq CAS should never race in a single-threaded test");

    let seg = write_committed_level0(root.mapper(), vp, tx, commit, diff).unwrap();
    root.on_new_segment(seg.clone()).unwrap();
    seg
}

/// Polls `condition` until it returns true or `timeout` elapses, for
/// waiting on the (asynchronous, worker-thread-driven) compaction
/// pipeline to catch up.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Default timeout used by scenario assertions waiting on the
/// asynchronous compaction pipeline.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// Reconstructs the document state at `level` for `vp` by folding every
/// indexed segment's diff, in ascending commit order, through
/// `JsonMergePatch` — what a downstream reader does per the crate's
/// read contract.
pub fn replay(root: &CompactorRoot<JsonMergePatch>, vp: &Vp, level: u32) -> Value {
    let dir = root.mapper().dir_for(vp);
    let mut state = JsonMergePatch::null();
    for seg in root.index().all(vp, level) {
        let path = seg.path_in(&dir, level);
        let df = vprlog::read_diff_file::<Value>(&path).unwrap();
        state = JsonMergePatch::patch(&state, &df.diff);
    }
    state
}

/// Lists the level-`level` *committed* file names still present on disk
/// for `vp` (pending/other levels excluded), for asserting retention.
pub fn committed_files_at_level(root: &CompactorRoot<JsonMergePatch>, vp: &Vp, level: u32) -> Vec<String> {
    let dir = root.mapper().dir_for(vp);
    let mut names = Vec::new();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return names;
    };
    for entry in entries.flatten() {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(parsed) = vprlog::segment::parse_filename(&name) else {
            continue;
        };
        if !parsed.pending && parsed.level == level {
            names.push(name);
        }
    }
    names
}
