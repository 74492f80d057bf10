//! Filesystem space/inode collector (spec §1 "platform-specific resource
//! collectors"). Backs the `space`/`inode` Rule kinds via `statvfs(2)`.

use std::path::Path;

use nix::sys::statvfs::statvfs;

use crate::error::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilesystemSnapshot {
    pub blocks_total: u64,
    pub blocks_free: u64,
    pub inodes_total: u64,
    pub inodes_free: u64,
}

impl FilesystemSnapshot {
    pub fn space_percent_used(&self) -> f64 {
        if self.blocks_total == 0 {
            return 0.0;
        }
        let used = self.blocks_total.saturating_sub(self.blocks_free);
        (used as f64 / self.blocks_total as f64) * 100.0
    }

    pub fn inodes_percent_used(&self) -> f64 {
        if self.inodes_total == 0 {
            return 0.0;
        }
        let used = self.inodes_total.saturating_sub(self.inodes_free);
        (used as f64 / self.inodes_total as f64) * 100.0
    }
}

pub trait FilesystemCollector: Send + Sync {
    fn sample(&self, path: &Path) -> Result<FilesystemSnapshot, ProbeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxFilesystemCollector;

impl FilesystemCollector for LinuxFilesystemCollector {
    fn sample(&self, path: &Path) -> Result<FilesystemSnapshot, ProbeError> {
        let stats = statvfs(path).map_err(|e| ProbeError::Io { path: path.display().to_string(), source: std::io::Error::from_raw_os_error(e as i32) })?;
        Ok(FilesystemSnapshot {
            blocks_total: stats.blocks() as u64,
            blocks_free: stats.blocks_available() as u64,
            inodes_total: stats.files() as u64,
            inodes_free: stats.files_available() as u64,
        })
    }
}
