//! On-disk `DiffFile` payload: encode/decode, write-to-temp-then-rename,
//! and the pending-to-committed rename that marks a segment's commit
//! point.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CompactionResult, StructuralError};

const MAGIC: [u8; 4] = *b"VPRL";
const CODEC_VERSION: u8 = 1;

/// The on-disk payload of one segment (§3): the txSeq it was written at,
/// the opaque diff, the number of predecessor inputs folded into it, and
/// whether it is still pending (uncommitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffFile<D> {
    pub seq: u64,
    pub diff: D,
    pub inputs: u32,
    pub pending: bool,
}

fn encode<T: Serialize>(value: &T) -> std::io::Result<Vec<u8>> {
    let data = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, format!("serialize: {e}"))
    })?;
    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(4 + 1 + 4 + data.len() + 4);
    out.extend_from_slice(&MAGIC);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> std::io::Result<T> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("bad magic: {magic:?}"),
        ));
    }
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported codec version {}", version[0]),
        ));
    }
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    const MAX_LEN: usize = 256 * 1024 * 1024;
    if len > MAX_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("entry size {len} exceeds maximum {MAX_LEN}"),
        ));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(&data);
    if hasher.finalize() != stored_crc {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "CRC mismatch: segment payload is corrupt",
        ));
    }

    serde_json::from_slice(&data).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, format!("deserialize: {e}"))
    })
}

/// Writes `df` to `path` via a temp file in the same directory followed
/// by `fs::rename`, so a crash never leaves a torn file at `path`.
pub fn write_diff_file<D: Serialize>(path: &Path, df: &DiffFile<D>) -> CompactionResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let temp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));

    let bytes = encode(df)?;
    {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Reads and validates a `DiffFile` from `path`.
pub fn read_diff_file<D: DeserializeOwned>(path: &Path) -> CompactionResult<DiffFile<D>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    Ok(decode(&mut reader)?)
}

/// Renames `pending_path` to `committed_path`, the commit point for a
/// segment (§4.2, §4.4 step 7). Fails structurally if the pending file
/// is absent, or if a file already sits at the committed name.
pub fn commit_pending(pending_path: &Path, committed_path: &Path) -> CompactionResult<()> {
    if !pending_path.exists() {
        return Err(StructuralError::PendingFileMissing {
            path: pending_path.to_path_buf(),
        }
        .into());
    }
    if committed_path.exists() {
        return Err(StructuralError::RenameTargetExists {
            path: committed_path.to_path_buf(),
        }
        .into());
    }
    fs::rename(pending_path, committed_path)?;
    Ok(())
}

/// Path of the pending-point payload file for `tx` in `dir`.
#[must_use]
pub fn pending_point_path(dir: &Path, tx: u64) -> PathBuf {
    dir.join(super::filename::format_pending_point(tx))
}

/// Path of the pending-range payload file for `(start_tx, end_tx, level)`
/// in `dir`.
#[must_use]
pub fn pending_range_path(dir: &Path, start_tx: u64, end_tx: u64, level: u32) -> PathBuf {
    dir.join(super::filename::format_pending_range(start_tx, end_tx, level))
}
