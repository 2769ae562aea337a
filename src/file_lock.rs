//! Single-writer-per-`Root` guard via a cross-platform exclusive file lock.
//!
//! The compaction engine assumes it is the only process mutating `Root`
//! (concurrent *readers* of the index are fine; concurrent *compactors* on
//! the same directory tree are not, since the sequencer and recovery lock
//! are in-process primitives with no cross-process equivalent). A
//! `FileLock` acquired on `Root` at [`crate::CompactorRoot::open`] time
//! catches the "oops, two processes pointed at the same directory" mistake
//! immediately instead of letting it corrupt segment files.

use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

/// Exclusive file lock guarding a `Root` directory against a second
/// process opening it concurrently.
///
/// Held for the lifetime of this struct; released automatically when
/// dropped (closing the underlying file descriptor releases the OS lock).
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Attempts to acquire an exclusive lock on `root`.
    ///
    /// # Errors
    /// `ErrorKind::WouldBlock` if another process already holds the lock;
    /// any other I/O error verbatim.
    pub fn acquire(root: &Path) -> IoResult<Self> {
        std::fs::create_dir_all(root)?;
        let lock_path = root.join(".lock");

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        Self::try_lock(&file)?;

        Ok(Self {
            _file: file,
            path: lock_path,
        })
    }

    /// Path of the lock file under `Root`.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> IoResult<()> {
        use std::os::unix::io::AsRawFd;

        let fd = file.as_raw_fd();
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

        if result != 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(IoError::new(
                    ErrorKind::WouldBlock,
                    "root is locked by another process",
                ));
            }
            return Err(errno);
        }
        Ok(())
    }

    #[cfg(windows)]
    fn try_lock(file: &File) -> IoResult<()> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Foundation::HANDLE;
        use windows_sys::Win32::Storage::FileSystem::{
            LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
        };

        let handle = file.as_raw_handle() as HANDLE;
        let result = unsafe {
            let mut overlapped = std::mem::zeroed::<windows_sys::Win32::System::IO::OVERLAPPED>();
            LockFileEx(
                handle,
                LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
                0,
                1,
                0,
                &mut overlapped,
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(IoError::new(
                ErrorKind::WouldBlock,
                format!("root is locked by another process: {err}"),
            ));
        }
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    fn try_lock(_file: &File) -> IoResult<()> {
        Err(IoError::new(
            ErrorKind::Unsupported,
            "file locking not supported on this platform",
        ))
    }
}
