//! The `DirCompactor` state machine (§4.4): the per-`(VP, level)` worker
//! that folds `Divisor` inputs into one output at the next level, persists
//! it, indexes it, optionally deletes superseded inputs, and hands the
//! result to its `Next` sibling.
//!
//! One dedicated OS thread per `(VP, level)`, grown lazily — directly
//! adapted from the teacher's `WorkerPool` (`engine/runtime.rs`): a named
//! thread, a `crossbeam_channel::bounded` inbox, a `recv()` loop, shutdown
//! via channel closure.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{after, bounded, select, Receiver, Sender};

use crate::error::{CompactionError, CompactionResult, StructuralError};
use crate::index::SegmentIndex;
use crate::log_sink::LogLevel;
use crate::patch::PatchAlgebra;
use crate::path::{PathMapper, Vp};
use crate::recovery_lock::RecoveryLock;
use crate::segment::{
    commit_pending, parse_filename, pending_range_path, read_diff_file, write_diff_file, DiffFile,
    LogSegment,
};
use crate::sequencer::Sequencer;
use crate::Config;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Context shared by every `DirCompactor` in a process, regardless of VP or
/// level: the single sequencer, the single segment index, and the single
/// (level-prioritized) cross-level recovery lock (§5, §9).
pub(crate) struct Shared {
    pub config: Arc<Config>,
    pub mapper: PathMapper,
    pub sequencer: Arc<Sequencer>,
    pub index: Arc<SegmentIndex>,
    pub recovery_lock: Arc<RecoveryLock>,
}

/// A handle to one `(VP, level)` compaction pipeline. Cheap to clone
/// (`Arc`-backed); submitting a segment and shutting the worker down are
/// the only operations exposed outside this module.
pub struct DirCompactor<P: PatchAlgebra> {
    vp: Vp,
    level: u32,
    tx: Sender<LogSegment>,
    done: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    _marker: std::marker::PhantomData<P>,
}

impl<P: PatchAlgebra> DirCompactor<P> {
    /// Spawns a new `DirCompactor` worker for `(vp, level)` and starts its
    /// recovery immediately (§4.5: "on creation, starts its worker and
    /// begins recovery for its directory").
    pub(crate) fn spawn(shared: Arc<Shared>, vp: Vp, level: u32) -> Arc<Self> {
        let dir = shared.mapper.dir_for(&vp);
        let capacity = shared.config.channel_capacity(level);
        let (tx, rx) = bounded::<LogSegment>(capacity);
        let (done_tx, done_rx) = bounded::<()>(0);

        let thread_vp = vp.clone();
        let thread_name = format!("vprlog-compact-L{level}");
        let join = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let mut worker = Worker::<P>::new(shared, thread_vp, level, dir);
                worker.run(&rx, &done_rx);
            })
            .expect("failed to spawn DirCompactor worker thread");

        Arc::new(Self {
            vp,
            level,
            tx,
            done: Mutex::new(Some(done_tx)),
            handle: Mutex::new(Some(join)),
            _marker: std::marker::PhantomData,
        })
    }

    /// The virtual path this compactor serves.
    #[must_use]
    pub fn vp(&self) -> &Vp {
        &self.vp
    }

    /// The level this compactor ingests at (its output lands at `level + 1`).
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Enqueues `seg` on this compactor's inbox. Blocks if the channel is
    /// full — the intended backpressure signal to upstream ingestion
    /// (§4.5, §7 "Backpressure").
    ///
    /// # Errors
    /// Returns `CompactionError::Internal` if the worker has already
    /// exited (e.g. following a structural panic).
    pub fn submit(&self, seg: LogSegment) -> CompactionResult<()> {
        self.tx
            .send(seg)
            .map_err(|_| CompactionError::internal("DirCompactor worker is no longer running"))
    }

    /// Signals the worker (and, recursively, its `Next` sibling) to stop,
    /// and blocks until both have exited cleanly.
    pub fn shutdown(&self) {
        {
            let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
            done.take();
        }
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// Outcome of one `recover()` attempt's I/O.
enum RecoverError {
    Cancelled,
    Transient(CompactionError),
}

impl From<std::io::Error> for RecoverError {
    fn from(e: std::io::Error) -> Self {
        Self::Transient(e.into())
    }
}

/// The mutable runtime state of one DirCompactor (§3), owned exclusively
/// by its worker thread (single-writer, per §3's lifecycle note) except
/// during `recover`, which the worker also drives itself.
struct Worker<P: PatchAlgebra> {
    shared: Arc<Shared>,
    vp: Vp,
    level: u32,
    dir: PathBuf,

    start: P::State,
    reference: P::State,
    cur_segment: Option<LogSegment>,
    inputs: u32,
    next: Option<Arc<DirCompactor<P>>>,
}

impl<P: PatchAlgebra> Worker<P> {
    fn new(shared: Arc<Shared>, vp: Vp, level: u32, dir: PathBuf) -> Self {
        Self {
            shared,
            vp,
            level,
            dir,
            start: P::null(),
            reference: P::null(),
            cur_segment: None,
            inputs: 0,
            next: None,
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.shared.config.log.log(level, "compactor", message);
    }

    /// Structural errors hit during recovery are fatal, never retried
    /// (§4.6, §9's Open Question resolution); only `Io` is transient.
    fn classify_recover_error(&self, e: CompactionError) -> RecoverError {
        if e.is_retryable() {
            RecoverError::Transient(e)
        } else {
            self.log(
                LogLevel::Error,
                &format!("structural error during recovery for {} level {}: {e}", self.vp, self.level),
            );
            panic!("vprlog: structural error during recovery for {} level {}: {e}", self.vp, self.level);
        }
    }

    /// The worker loop (§4.4): recover until consistent, receive one
    /// segment or shutdown, process it, repeat. On shutdown, cascades to
    /// `Next` before returning so a single `shutdown()` call at the root
    /// drains the whole per-VP chain.
    fn run(&mut self, rx: &Receiver<LogSegment>, done_rx: &Receiver<()>) {
        loop {
            if self.recover(done_rx).is_cancelled() {
                break;
            }
            select! {
                recv(rx) -> msg => match msg {
                    Ok(seg) => self.handle_segment(seg),
                    Err(_) => break,
                },
                recv(done_rx) -> _ => break,
            }
        }
        if let Some(next) = &self.next {
            next.shutdown();
        }
    }

    fn handle_segment(&mut self, seg: LogSegment) {
        match self.process_segment(seg) {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                self.log(
                    LogLevel::Warn,
                    &format!(
                        "transient error processing segment for {} level {}: {e}",
                        self.vp, self.level
                    ),
                );
                // The outer loop re-enters recover() before the next recv.
            }
            Err(e) => {
                self.log(
                    LogLevel::Error,
                    &format!(
                        "structural error in DirCompactor({}, level {}): {e}",
                        self.vp, self.level
                    ),
                );
                panic!("vprlog: structural error in DirCompactor({}, level {}): {e}", self.vp, self.level);
            }
        }
    }

    /// Reads the on-disk payload for `seg` at `level`. A `NotFound` here is
    /// always a structural bug: the caller (upstream's contract, or our
    /// own directory scan during recovery) promised the file exists.
    fn read_input(&self, path: &std::path::Path, level: u32) -> CompactionResult<DiffFile<P::Diff>> {
        match read_diff_file::<P::Diff>(path) {
            Ok(df) => Ok(df),
            Err(CompactionError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StructuralError::MissingSegmentFile {
                    vp: self.vp.clone(),
                    level,
                    path: path.to_path_buf(),
                }
                .into())
            }
            Err(e) => Err(e),
        }
    }

    /// §4.4 `processSegment`.
    fn process_segment(&mut self, seg: LogSegment) -> CompactionResult<()> {
        if let Some(cur) = &self.cur_segment {
            if seg.end_commit <= cur.end_commit {
                self.log(
                    LogLevel::Debug,
                    &format!(
                        "dropping already-processed segment for {} level {} (end_commit {} <= {})",
                        self.vp, self.level, seg.end_commit, cur.end_commit
                    ),
                );
                return Ok(());
            }
        }

        let path = seg.path_in(&self.dir, self.level);
        let df = self.read_input(&path, self.level)?;

        let tmp = P::patch(&self.reference, &df.diff);
        let window_diff = P::diff(&self.start, &tmp);

        if P::is_empty(&window_diff) {
            // §9's Open Question resolution: absorbed silently, changes
            // nothing — not CurSegment, not Inputs, not Ref.
            return Ok(());
        }

        if self.inputs == 0 {
            self.cur_segment = Some(LogSegment {
                vp: self.vp.clone(),
                start_tx: seg.start_tx,
                end_tx: seg.end_tx,
                start_commit: seg.start_commit,
                end_commit: seg.end_commit,
            });
        } else if let Some(cur) = self.cur_segment.as_mut() {
            cur.end_tx = seg.end_tx;
            cur.end_commit = seg.end_commit;
        }
        self.inputs += 1;

        if self.inputs >= self.shared.config.divisor {
            self.rotate(&tmp, window_diff)?;
        }

        self.reference = tmp;
        Ok(())
    }

    /// §4.4 `rotate`.
    fn rotate(&mut self, tmp: &P::State, window_diff: P::Diff) -> CompactionResult<()> {
        let cur = self
            .cur_segment
            .clone()
            .expect("rotate called with no accumulating CurSegment");

        let tx_seq = self.shared.sequencer.next_tx_seq()?;
        let pending_path = pending_range_path(&self.dir, cur.start_tx, tx_seq, self.level + 1);
        let pending_df = DiffFile {
            seq: tx_seq,
            diff: window_diff,
            inputs: self.inputs,
            pending: true,
        };
        write_diff_file(&pending_path, &pending_df)?;

        let mut seq_guard = self.shared.sequencer.lock();
        let commit = seq_guard.next_commit_locked()?;

        if cur.start_commit == 0 {
            return Err(StructuralError::AssertionViolated {
                vp: self.vp.clone(),
                level: self.level,
                reason: "CurSegment.StartCommit is zero at rotate".to_string(),
            }
            .into());
        }
        if commit <= cur.end_commit {
            return Err(StructuralError::AssertionViolated {
                vp: self.vp.clone(),
                level: self.level,
                reason: format!("allocated commit {commit} does not exceed CurSegment.EndCommit {}", cur.end_commit),
            }
            .into());
        }
        if cur.start_commit >= commit {
            return Err(StructuralError::AssertionViolated {
                vp: self.vp.clone(),
                level: self.level,
                reason: format!("output StartCommit {} is not below its own EndCommit {commit}", cur.start_commit),
            }
            .into());
        }

        let finished = LogSegment {
            vp: self.vp.clone(),
            start_tx: cur.start_tx,
            end_tx: tx_seq,
            start_commit: cur.start_commit,
            end_commit: commit,
        };
        let committed_path = finished.path_in(&self.dir, self.level + 1);
        commit_pending(&pending_path, &committed_path)?;

        self.shared.index.add(finished.clone(), self.level + 1)?;
        drop(seq_guard);

        if self.shared.config.retention.remove(commit, self.level + 1) {
            self.remove_superseded_inputs(&finished);
        }

        self.inputs = 0;
        self.start = tmp.clone();
        self.cur_segment = None;

        let next = self.ensure_next();
        next.submit(finished)?;
        Ok(())
    }

    /// §4.4 step 9: best-effort, logged-only deletion of level-`L` files
    /// wholly covered by the merged range just committed.
    fn remove_superseded_inputs(&self, merged: &LogSegment) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.log(LogLevel::Warn, &format!("retention scan of {} failed: {e}", self.dir.display()));
                return;
            }
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else { continue };
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
            let Some(parsed) = parse_filename(&name) else { continue };
            if parsed.pending || parsed.level != self.level {
                continue;
            }
            if parsed.start_tx >= merged.start_tx && parsed.end_tx <= merged.end_tx {
                if let Err(e) = fs::remove_file(entry.path()) {
                    self.log(
                        LogLevel::Warn,
                        &format!("retention: failed to remove superseded input {}: {e}", entry.path().display()),
                    );
                }
            }
        }
    }

    fn ensure_next(&mut self) -> Arc<DirCompactor<P>> {
        if self.next.is_none() {
            self.next = Some(DirCompactor::spawn(Arc::clone(&self.shared), self.vp.clone(), self.level + 1));
        }
        Arc::clone(self.next.as_ref().expect("just inserted"))
    }

    /// §4.6 `recover`, retried with exponential backoff on transient I/O,
    /// cancellable at every sleep via `done_rx`.
    fn recover(&mut self, done_rx: &Receiver<()>) -> RecoverOutcome {
        let mut backoff = MIN_BACKOFF;
        loop {
            match self.try_recover_once() {
                Ok(()) => return RecoverOutcome::Recovered,
                Err(RecoverError::Cancelled) => return RecoverOutcome::Cancelled,
                Err(RecoverError::Transient(e)) => {
                    self.log(
                        LogLevel::Warn,
                        &format!(
                            "transient recovery error for {} level {}: {e}; retrying in {backoff:?}",
                            self.vp, self.level
                        ),
                    );
                    select! {
                        recv(done_rx) -> _ => return RecoverOutcome::Cancelled,
                        recv(after(backoff)) -> _ => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    fn try_recover_once(&mut self) -> Result<(), RecoverError> {
        self.start = P::null();
        self.reference = P::null();
        self.cur_segment = None;
        self.inputs = 0;

        let guard = self.shared.recovery_lock.acquire(self.level);

        fs::create_dir_all(&self.dir)?;

        let mut current_outputs: Vec<LogSegment> = Vec::new();
        let mut inputs_on_disk: Vec<LogSegment> = Vec::new();
        let mut next_level_exists = false;
        let mut stale_pending: Vec<PathBuf> = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(parsed) = parse_filename(&name) else {
                continue;
            };

            if parsed.level == self.level + 2 {
                next_level_exists = true;
            } else if parsed.level == self.level + 1 {
                if parsed.pending {
                    stale_pending.push(entry.path());
                } else {
                    current_outputs.push(LogSegment::from_parsed(self.vp.clone(), &parsed));
                }
            } else if parsed.level == self.level && !parsed.pending {
                inputs_on_disk.push(LogSegment::from_parsed(self.vp.clone(), &parsed));
            }
        }

        current_outputs.sort_by_key(|s| (s.start_commit, s.start_tx));
        inputs_on_disk.sort_by_key(|s| (s.start_commit, s.start_tx));

        for stale in &stale_pending {
            if let Err(e) = fs::remove_file(stale) {
                self.log(LogLevel::Warn, &format!("failed to remove stale pending file {}: {e}", stale.display()));
            }
        }

        for output in &current_outputs {
            let path = output.path_in(&self.dir, self.level + 1);
            let df = self
                .read_input(&path, self.level + 1)
                .map_err(|e| self.classify_recover_error(e))?;
            self.reference = P::patch(&self.reference, &df.diff);
            self.start = self.reference.clone();
        }
        self.cur_segment = current_outputs.iter().max_by_key(|s| s.end_commit).cloned();

        let surviving: Vec<LogSegment> = inputs_on_disk
            .into_iter()
            .filter(|input| {
                !current_outputs
                    .iter()
                    .any(|out| out.start_commit <= input.start_commit && input.end_commit <= out.end_commit)
            })
            .collect();

        if next_level_exists && self.next.is_none() {
            self.next = Some(DirCompactor::spawn(Arc::clone(&self.shared), self.vp.clone(), self.level + 1));
        }

        drop(guard);

        for input in surviving {
            self.process_segment(input)
                .map_err(|e| self.classify_recover_error(e))?;
        }
        Ok(())
    }
}

enum RecoverOutcome {
    Recovered,
    Cancelled,
}

impl RecoverOutcome {
    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
