//! PID file (spec §6 "PID file"): the current daemon pid as decimal ASCII,
//! held with an exclusive advisory lock for the life of the process so a
//! second daemon cannot start against the same control file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use nix::fcntl::{FcntlArg, FlockArg};
use nix::unistd::Pid;

use crate::error::StoreError;

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.display().to_string(), source }
}

/// An open, exclusively-locked pid file. Dropping it releases the lock (the
/// file itself is left behind, matching Monit's behavior of never deleting
/// its own pid file on exit).
pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Creates (or opens) the pid file at `path`, takes a non-blocking
    /// exclusive `flock`, and writes the current process id. Fails with
    /// [`StoreError::AlreadyLocked`] if another process already holds the
    /// lock — that is how a second `vigild -d` against the same control
    /// file is refused.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(&path, e))?;
        }
        let file = OpenOptions::new().write(true).create(true).truncate(false).open(&path).map_err(|e| io_err(&path, e))?;

        nix::fcntl::flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock)
            .map_err(|_| StoreError::AlreadyLocked(path.display().to_string()))?;

        let mut file = file;
        file.set_len(0).map_err(|e| io_err(&path, e))?;
        writeln!(file, "{}", std::process::id()).map_err(|e| io_err(&path, e))?;
        file.sync_all().map_err(|e| io_err(&path, e))?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the pid recorded in `path` without taking the lock — used by
    /// the CLI to target a running daemon (`status`, `stop`, …) from a
    /// second process.
    pub fn read(path: &Path) -> Result<Pid, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let pid: i32 = raw.trim().parse().map_err(|_| StoreError::Truncated(path.display().to_string()))?;
        Ok(Pid::from_raw(pid))
    }

    /// Fetches the current lock state (F_GETLK) without blocking. Used to
    /// diagnose whether a stale pid file's writer is actually gone.
    pub fn is_locked(path: &Path) -> Result<bool, StoreError> {
        let file = OpenOptions::new().write(true).open(path).map_err(|e| io_err(path, e))?;
        let mut flock = libc::flock { l_type: libc::F_WRLCK as i16, l_whence: libc::SEEK_SET as i16, l_start: 0, l_len: 0, l_pid: 0 };
        nix::fcntl::fcntl(file.as_raw_fd(), FcntlArg::F_GETLK(&mut flock)).map_err(|e| io_err(path, std::io::Error::from_raw_os_error(e as i32)))?;
        Ok(flock.l_type != libc::F_UNLCK as i16)
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = nix::fcntl::flock(self.file.as_raw_fd(), FlockArg::Unlock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_writes_the_current_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vigil.pid");
        let lock = PidFile::acquire(&path).unwrap();
        let read_back = PidFile::read(lock.path()).unwrap();
        assert_eq!(read_back.as_raw(), std::process::id() as i32);
    }

    #[test]
    fn second_acquire_on_the_same_path_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vigil.pid");
        let _first = PidFile::acquire(&path).unwrap();
        let second = PidFile::acquire(&path);
        assert!(matches!(second, Err(StoreError::AlreadyLocked(_))));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vigil.pid");
        {
            let _first = PidFile::acquire(&path).unwrap();
        }
        let second = PidFile::acquire(&path);
        assert!(second.is_ok());
    }
}
