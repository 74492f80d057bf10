//! State snapshot file (spec §6 "State file").
//!
//! Written via `serde_json` (the "opaque serializer" spec §6 leaves
//! unspecified) each cycle if dirty and on graceful shutdown; consulted at
//! startup to restore per-Service monitoring state and counters. Backup
//! rotation follows the teacher's `rotate_bak_path` (`storage/snapshot.rs`)
//! rather than Monit's single `.bak`, since keeping a short history is
//! strictly safer for the same persistence concern.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use vigil_core::MonitorState;

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;
const MAX_BAK_FILES: u32 = 3;

/// Per-service fields restored from a snapshot (spec §3 "Lifecycle":
/// "reloads rebuild the graph from scratch after persisting state").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedService {
    pub state: MonitorState,
    pub pid: Option<i32>,
    pub collected_at_epoch: u64,
    pub error_bits: u32,
    pub error_hint_bits: u32,
}

/// The complete on-disk snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "v")]
    pub version: u32,
    /// Boot epoch observed when this snapshot was written, used by
    /// [`Snapshot::reboot_detected`] to decide whether the configured
    /// service start-delay applies (spec §6 "an internal 'reboot detected'
    /// check").
    pub boot_epoch: u64,
    pub services: HashMap<String, PersistedService>,
}

impl Snapshot {
    pub fn new(boot_epoch: u64) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, boot_epoch, services: HashMap::new() }
    }

    fn io_err(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io { path: path.display().to_string(), source }
    }

    /// Loads the snapshot at `path`, if present. A missing file is not an
    /// error — a fresh install has no prior state.
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::io_err(path, err)),
        }
    }

    /// Writes the snapshot, rotating the previous file into `.bak` first
    /// (spec §6 "State file").
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::io_err(path, e))?;
        }
        if path.exists() {
            let bak = rotate_bak_path(path);
            fs::rename(path, &bak).map_err(|e| Self::io_err(&bak, e))?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes).map_err(|e| Self::io_err(path, e))
    }

    /// True if `current_boot_epoch` (read from `/proc/uptime`) differs from
    /// the one this snapshot recorded, i.e. the machine rebooted since the
    /// last graceful or crash exit (spec §6).
    pub fn reboot_detected(&self, current_boot_epoch: u64) -> bool {
        // Allow a few seconds of clock-skew slop rather than an exact match.
        self.boot_epoch.abs_diff(current_boot_epoch) > 5
    }
}

/// Reads `/proc/uptime` and derives the system boot time as a Unix epoch.
/// Falls back to the current time (never reports a reboot) on platforms
/// without `/proc` (spec's own collectors are Linux-only; see
/// `vigil-probes`).
pub fn current_boot_epoch(now_epoch: u64) -> u64 {
    let Ok(contents) = fs::read_to_string("/proc/uptime") else {
        return now_epoch;
    };
    let uptime_secs: f64 = contents.split_whitespace().next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    now_epoch.saturating_sub(uptime_secs as u64)
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out. Keeps
/// up to [`MAX_BAK_FILES`] backups.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| if n == 1 { path.with_extension("bak") } else { path.with_extension(format!("bak.{n}")) };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn svc(state: MonitorState) -> PersistedService {
        PersistedService { state, pid: Some(42), collected_at_epoch: 100, error_bits: 0, error_hint_bits: 0 }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state");
        let mut snap = Snapshot::new(1_700_000_000);
        snap.services.insert("web".into(), svc(MonitorState::Yes));
        snap.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded.services.get("web"), Some(&svc(MonitorState::Yes)));
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state");
        assert!(Snapshot::load(&path).unwrap().is_none());
    }

    #[test]
    fn second_save_rotates_the_first_into_bak() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state");
        let mut snap = Snapshot::new(1);
        snap.save(&path).unwrap();
        snap.boot_epoch = 2;
        snap.save(&path).unwrap();

        assert!(path.with_extension("bak").exists());
        let bak: Snapshot = serde_json::from_slice(&fs::read(path.with_extension("bak")).unwrap()).unwrap();
        assert_eq!(bak.boot_epoch, 1);
    }

    #[test]
    fn reboot_detected_flags_a_differing_boot_epoch() {
        let snap = Snapshot::new(1_700_000_000);
        assert!(!snap.reboot_detected(1_700_000_000));
        assert!(snap.reboot_detected(1_700_100_000));
    }
}
