//! Process-wide durable sequence allocator (§4.1).
//!
//! Two files under `meta/`: a fixed 16-byte little-endian record holding
//! `(CommitCount, TxSeq)`, rewritten on every increment, and a
//! structured text map `path-seqs.tony` from VP to its last commit,
//! rewritten on every conditional commit. Both are written via
//! write-to-temp-then-rename so a crash never leaves a torn record; a
//! missing binary file is cold-start all-zero state.
//!
//! Every operation is serialised behind one mutex (§9: "encapsulate as
//! an owned object with clearly-scoped lock; never as ambient
//! singleton").

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{CompactionResult, StructuralError};
use crate::path::Vp;

const SEQ_FILE: &str = "seq";
const PATH_SEQS_FILE: &str = "path-seqs.tony";
const SEQ_RECORD_LEN: usize = 16;

struct State {
    commit_count: u64,
    tx_seq: u64,
    path_seqs: HashMap<Vp, u64>,
}

/// Durable allocator of `TxSeq`/`CommitCount`, plus the per-VP
/// last-commit map used for optimistic per-path CAS commits.
pub struct Sequencer {
    meta_dir: PathBuf,
    inner: Mutex<State>,
}

impl Sequencer {
    /// Opens (or cold-starts) the sequencer rooted at `meta_dir`.
    pub fn open(meta_dir: impl Into<PathBuf>) -> CompactionResult<Self> {
        let meta_dir = meta_dir.into();
        fs::create_dir_all(&meta_dir)?;
        let (commit_count, tx_seq) = read_seq_file(&meta_dir.join(SEQ_FILE))?;
        let path_seqs = read_path_seqs_file(&meta_dir.join(PATH_SEQS_FILE))?;
        Ok(Self {
            meta_dir,
            inner: Mutex::new(State {
                commit_count,
                tx_seq,
                path_seqs,
            }),
        })
    }

    /// Allocates and persists the next transaction sequence number.
    pub fn next_tx_seq(&self) -> CompactionResult<u64> {
        let mut state = self.lock_state();
        state.tx_seq += 1;
        let tx_seq = state.tx_seq;
        write_seq_file(&self.meta_dir.join(SEQ_FILE), state.commit_count, tx_seq)?;
        Ok(tx_seq)
    }

    /// Returns the last commit count recorded for `vp`, or `None` if it
    /// has never been written.
    pub fn get_path_seq(&self, vp: &Vp) -> Option<u64> {
        self.lock_state().path_seqs.get(vp).copied()
    }

    /// Snapshot of `(CommitCount, TxSeq)`.
    pub fn read_state(&self) -> (u64, u64) {
        let state = self.lock_state();
        (state.commit_count, state.tx_seq)
    }

    /// Acquires the sequencer's lock for the duration of a caller-driven
    /// critical section (rename + index insert), exposing
    /// `next_commit_locked` while the lock is held.
    pub fn lock(&self) -> SequencerGuard<'_> {
        SequencerGuard {
            meta_dir: &self.meta_dir,
            state: self.lock_state(),
        }
    }

    /// Compare-and-swap: if `PathSeqs[vp] == expected` (or `expected` is
    /// `None` for "never written"), increments `CommitCount`, records
    /// `PathSeqs[vp] = CommitCount`, persists both files, and returns
    /// `(commit, true)`. Otherwise returns `(current, false)` without
    /// mutating anything.
    pub fn next_commit_if_path_seq_matches(
        &self,
        vp: &Vp,
        expected: Option<u64>,
    ) -> CompactionResult<(u64, bool)> {
        let mut state = self.lock_state();
        let current = state.path_seqs.get(vp).copied();
        if current != expected {
            return Ok((current.unwrap_or(0), false));
        }
        state.commit_count += 1;
        let commit = state.commit_count;
        state.path_seqs.insert(vp.clone(), commit);
        write_seq_file(&self.meta_dir.join(SEQ_FILE), commit, state.tx_seq)?;
        write_path_seqs_file(&self.meta_dir.join(PATH_SEQS_FILE), &state.path_seqs)?;
        Ok((commit, true))
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// A scope holding the sequencer's lock, returned by [`Sequencer::lock`].
pub struct SequencerGuard<'a> {
    meta_dir: &'a Path,
    state: MutexGuard<'a, State>,
}

impl SequencerGuard<'_> {
    /// Allocates and persists the next commit count while the sequencer
    /// lock is held, so the caller can rename + index the segment before
    /// releasing it.
    pub fn next_commit_locked(&mut self) -> CompactionResult<u64> {
        self.state.commit_count += 1;
        let commit = self.state.commit_count;
        write_seq_file(&self.meta_dir.join(SEQ_FILE), commit, self.state.tx_seq)?;
        Ok(commit)
    }
}

fn read_seq_file(path: &Path) -> CompactionResult<(u64, u64)> {
    match fs::read(path) {
        Ok(bytes) => {
            if bytes.len() != SEQ_RECORD_LEN {
                return Err(StructuralError::CorruptSequencerState {
                    path: path.to_path_buf(),
                    reason: format!("expected {SEQ_RECORD_LEN} bytes, found {}", bytes.len()),
                }
                .into());
            }
            let commit_count = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
            let tx_seq = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
            Ok((commit_count, tx_seq))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((0, 0)),
        Err(e) => Err(e.into()),
    }
}

fn write_seq_file(path: &Path, commit_count: u64, tx_seq: u64) -> CompactionResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = dir.join(format!(".tmp-{}-{}", std::process::id(), uuid::Uuid::new_v4()));
    let mut bytes = [0u8; SEQ_RECORD_LEN];
    bytes[0..8].copy_from_slice(&commit_count.to_le_bytes());
    bytes[8..16].copy_from_slice(&tx_seq.to_le_bytes());
    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn read_path_seqs_file(path: &Path) -> CompactionResult<HashMap<Vp, u64>> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let mut map = HashMap::new();
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some((vp_str, commit_str)) = line.split_once('\t') else {
                    return Err(StructuralError::CorruptSequencerState {
                        path: path.to_path_buf(),
                        reason: format!("malformed line: {line:?}"),
                    }
                    .into());
                };
                let commit: u64 = commit_str.trim().parse().map_err(|_| {
                    StructuralError::CorruptSequencerState {
                        path: path.to_path_buf(),
                        reason: format!("non-numeric commit in line: {line:?}"),
                    }
                })?;
                map.insert(Vp::new(vp_str), commit);
            }
            Ok(map)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_path_seqs_file(path: &Path, map: &HashMap<Vp, u64>) -> CompactionResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = dir.join(format!(".tmp-{}-{}", std::process::id(), uuid::Uuid::new_v4()));

    let mut entries: Vec<(&Vp, &u64)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    let mut contents = String::new();
    for (vp, commit) in entries {
        contents.push_str(vp.as_str());
        contents.push('\t');
        contents.push_str(&commit.to_string());
        contents.push('\n');
    }
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
