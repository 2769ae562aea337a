//! Engine configuration.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::CompactionResult;
use crate::log_sink::{LogSink, StdLogSink};
use crate::retention::{NeverRemove, Retention};

/// Default `N` in the `Divisor^(N-L)` channel-sizing formula (§4.4).
pub const DEFAULT_MAX_LEVELS_HINT: u32 = 3;

/// Engine configuration: filesystem root, fan-in factor, retention
/// policy, and logging sink.
#[derive(Clone)]
pub struct Config {
    /// Directory the engine owns; `meta/` and `paths/` live underneath it.
    pub root: PathBuf,
    /// Number of level-`L` inputs folded into one level-`(L+1)` output.
    /// Must be `>= 2`.
    pub divisor: u32,
    /// Decides which inputs may be deleted after a successful rotation.
    pub retention: Arc<dyn Retention>,
    /// Destination for engine log records.
    pub log: Arc<dyn LogSink>,
    /// Base channel capacity; actual capacity is
    /// `channel_capacity_base * divisor^(max_levels_hint - level)`.
    pub channel_capacity_base: usize,
    /// `N` in the channel-sizing formula above.
    pub max_levels_hint: u32,
}

impl Config {
    /// Sane defaults: `divisor = 2`, no retention, stderr-backed logging.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            divisor: 2,
            retention: Arc::new(NeverRemove),
            log: Arc::new(StdLogSink),
            channel_capacity_base: 1,
            max_levels_hint: DEFAULT_MAX_LEVELS_HINT,
        }
    }

    /// Validates invariants that the rest of the engine assumes hold.
    ///
    /// # Errors
    /// Returns `CompactionError::Internal` if `divisor < 2`.
    pub fn validate(self) -> CompactionResult<Self> {
        if self.divisor < 2 {
            return Err(crate::error::CompactionError::internal(format!(
                "divisor must be at least 2 (got {})",
                self.divisor
            )));
        }
        Ok(self)
    }

    /// Bounded-channel capacity for a DirCompactor at `level`, per the
    /// `Divisor^(N-L)` formula for `L < N`, and `1` at or above `N`.
    #[must_use]
    pub fn channel_capacity(&self, level: u32) -> usize {
        if level >= self.max_levels_hint {
            return self.channel_capacity_base.max(1);
        }
        let exponent = self.max_levels_hint - level;
        let factor = (self.divisor as u64).saturating_pow(exponent);
        (self.channel_capacity_base as u64).saturating_mul(factor).min(usize::MAX as u64) as usize
    }
}
