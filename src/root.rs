//! The compactor root (§4.5): fans incoming level-0 segments out to the
//! correct `DirCompactor` by virtual path, lazily creating it on first
//! sight — the single owning struct that wires the sequencer, index,
//! recovery lock, and per-path pipelines together, in the same "aggregate
//! owns and lazily wires up its children" shape as the teacher's
//! `PersistentStores`.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, PoisonError};

use crate::compactor::{DirCompactor, Shared};
use crate::error::CompactionResult;
use crate::file_lock::FileLock;
use crate::index::SegmentIndex;
use crate::patch::PatchAlgebra;
use crate::path::{PathMapper, Vp};
use crate::recovery_lock::RecoveryLock;
use crate::segment::LogSegment;
use crate::sequencer::Sequencer;
use crate::Config;

/// Entry point of the compaction engine: one `CompactorRoot` per `Root`
/// directory, generic over the document's patch/diff algebra.
pub struct CompactorRoot<P: PatchAlgebra> {
    shared: Arc<Shared>,
    level0: Mutex<HashMap<Vp, Arc<DirCompactor<P>>>>,
    _lock: FileLock,
}

impl<P: PatchAlgebra> CompactorRoot<P> {
    /// Opens (or cold-starts) the engine rooted at `config.root`.
    ///
    /// # Errors
    /// Propagates `Config::validate`'s error, any I/O failure opening the
    /// sequencer's `meta/` files, and `ErrorKind::WouldBlock` if another
    /// process already holds the `Root`'s exclusive lock.
    pub fn open(config: Config) -> CompactionResult<Self> {
        let config = config.validate()?;
        let lock = FileLock::acquire(&config.root)?;
        let mapper = PathMapper::new(&config.root);
        fs::create_dir_all(mapper.meta_dir())?;
        fs::create_dir_all(mapper.dir_for(&Vp::root()))?;

        let sequencer = Arc::new(Sequencer::open(mapper.meta_dir())?);
        let shared = Arc::new(Shared {
            config: Arc::new(config),
            mapper,
            sequencer,
            index: Arc::new(SegmentIndex::new()),
            recovery_lock: Arc::new(RecoveryLock::new()),
        });

        Ok(Self {
            shared,
            level0: Mutex::new(HashMap::new()),
            _lock: lock,
        })
    }

    /// Dispatches a newly-written, *already committed* level-0 segment to
    /// its VP's `DirCompactor`, creating the pipeline lazily if this is the
    /// first segment ever seen for that VP.
    ///
    /// Per the upstream contract (§6), `seg` must describe a file that
    /// already exists on disk at level 0; this must be called exactly once
    /// per `(VP, EndCommit)`.
    ///
    /// # Errors
    /// Returns `CompactionError::Internal` if the target `DirCompactor`'s
    /// worker has already exited (e.g. after a structural panic).
    pub fn on_new_segment(&self, seg: LogSegment) -> CompactionResult<()> {
        let compactor = self.get_or_create(seg.vp.clone());
        compactor.submit(seg)
    }

    /// The in-memory segment index, shared by every level of every VP.
    /// Readers may snapshot it under its own lock and read any referenced
    /// file (§6's downstream contract).
    #[must_use]
    pub fn index(&self) -> &Arc<SegmentIndex> {
        &self.shared.index
    }

    /// The process-wide sequencer backing every commit this root allocates.
    #[must_use]
    pub fn sequencer(&self) -> &Arc<Sequencer> {
        &self.shared.sequencer
    }

    /// The filesystem layout mapper for this root.
    #[must_use]
    pub fn mapper(&self) -> &PathMapper {
        &self.shared.mapper
    }

    /// Returns the level-0 `DirCompactor` for `vp` if one has been created.
    #[must_use]
    pub fn get(&self, vp: &Vp) -> Option<Arc<DirCompactor<P>>> {
        let map = self.level0.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(vp).cloned()
    }

    fn get_or_create(&self, vp: Vp) -> Arc<DirCompactor<P>> {
        let mut map = self.level0.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(vp)
                .or_insert_with_key(|vp| DirCompactor::spawn(Arc::clone(&self.shared), vp.clone(), 0)),
        )
    }

    /// Shuts down every per-VP pipeline (and, recursively, every level
    /// above it) and blocks until all worker threads have exited.
    pub fn shutdown(&self) {
        let map = self.level0.lock().unwrap_or_else(PoisonError::into_inner);
        for compactor in map.values() {
            compactor.shutdown();
        }
    }
}
