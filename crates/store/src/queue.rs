//! On-disk event queue directory (spec §4.6 "Delivery pipeline" step 5,
//! §6 "Event queue directory").
//!
//! One file per pending event, named `<unix_time>_<service_name_hash>` so
//! collisions within the same second are avoided. File content is a
//! versioned concatenation:
//! `[version:u32][event-struct][service-name\0][message\0][action-kind:u32]`.
//! The event-struct portion is fixed-width; the two C strings follow it, and
//! the action-kind tag (the Action that was selected for this transition,
//! spec §4.6 step 3) trails everything so a reader can discard unknown
//! kinds without needing to know the string lengths up front (spec §9 open
//! question: unknown action kinds are rejected with a logged discard, not
//! silently treated as the default).

use std::ffi::CStr;
use std::fs;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use vigil_core::{ActionKind, DeliveryFlags, Event, RuleKind, Transition};

use crate::error::StoreError;

const EVENT_QUEUE_VERSION: u32 = 1;

/// One record read back from the queue directory.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub service_name: String,
    pub rule_kind: RuleKind,
    pub binding_ordinal: u32,
    pub transition: Transition,
    pub collected_at_epoch: u64,
    pub bitmap: u64,
    pub delivery: DeliveryFlags,
    pub repeat_counter: u32,
    pub message: String,
    pub action_kind: ActionKind,
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.display().to_string(), source }
}

fn service_name_hash(name: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

fn encode_flags(flags: DeliveryFlags) -> u8 {
    (flags.alert_pending as u8) | ((flags.mmonit_pending as u8) << 1)
}

fn decode_flags(byte: u8) -> DeliveryFlags {
    DeliveryFlags { alert_pending: byte & 0b01 != 0, mmonit_pending: byte & 0b10 != 0 }
}

fn encode(service_name: &str, event: &Event, message: &str, action_kind: ActionKind) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&EVENT_QUEUE_VERSION.to_le_bytes());
    buf.extend_from_slice(&rule_kind_to_wire(event.key.rule_kind).to_le_bytes());
    buf.extend_from_slice(&event.key.binding_ordinal.to_le_bytes());
    buf.extend_from_slice(&event.transition.to_wire().to_le_bytes());
    buf.extend_from_slice(&event.collected_at_epoch.to_le_bytes());
    buf.extend_from_slice(&event.bitmap.raw().to_le_bytes());
    buf.push(encode_flags(event.delivery));
    buf.extend_from_slice(&event.repeat_counter.to_le_bytes());
    buf.extend_from_slice(service_name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(message.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&action_kind.to_wire().to_le_bytes());
    buf
}

fn decode(path: &Path, bytes: &[u8]) -> Result<QueuedEvent, StoreError> {
    const FIXED_LEN: usize = 4 + 4 + 4 + 4 + 8 + 8 + 1 + 4;
    if bytes.len() < FIXED_LEN {
        return Err(StoreError::Truncated(path.display().to_string()));
    }
    let read_u32 = |b: &[u8]| u32::from_le_bytes(b.try_into().unwrap_or_default());
    let read_u64 = |b: &[u8]| u64::from_le_bytes(b.try_into().unwrap_or_default());

    let version = read_u32(&bytes[0..4]);
    if version != EVENT_QUEUE_VERSION {
        return Err(StoreError::VersionMismatch { path: path.display().to_string(), found: version, expected: EVENT_QUEUE_VERSION });
    }
    let rule_kind = RuleKind::from_wire_or_err(read_u32(&bytes[4..8]), path)?;
    let binding_ordinal = read_u32(&bytes[8..12]);
    let transition = Transition::from_wire(read_u32(&bytes[12..16])).ok_or_else(|| StoreError::Truncated(path.display().to_string()))?;
    let collected_at_epoch = read_u64(&bytes[16..24]);
    let bitmap = read_u64(&bytes[24..32]);
    let delivery = decode_flags(bytes[32]);
    let repeat_counter = read_u32(&bytes[33..37]);

    let rest = &bytes[FIXED_LEN..];
    let name_end = rest.iter().position(|b| *b == 0).ok_or_else(|| StoreError::Truncated(path.display().to_string()))?;
    let service_name = CStr::from_bytes_with_nul(&rest[..=name_end])
        .map_err(|_| StoreError::Truncated(path.display().to_string()))?
        .to_string_lossy()
        .into_owned();

    let after_name = &rest[name_end + 1..];
    let msg_end = after_name.iter().position(|b| *b == 0).ok_or_else(|| StoreError::Truncated(path.display().to_string()))?;
    let message = CStr::from_bytes_with_nul(&after_name[..=msg_end])
        .map_err(|_| StoreError::Truncated(path.display().to_string()))?
        .to_string_lossy()
        .into_owned();

    let action_bytes = &after_name[msg_end + 1..];
    if action_bytes.len() < 4 {
        return Err(StoreError::Truncated(path.display().to_string()));
    }
    let action_kind = ActionKind::from_wire(read_u32(&action_bytes[0..4])).ok_or_else(|| StoreError::Truncated(path.display().to_string()))?;

    Ok(QueuedEvent { service_name, rule_kind, binding_ordinal, transition, collected_at_epoch, bitmap, delivery, repeat_counter, message, action_kind })
}

trait RuleKindWire: Sized {
    fn from_wire_or_err(tag: u32, path: &Path) -> Result<Self, StoreError>;
}

impl RuleKindWire for RuleKind {
    fn from_wire_or_err(tag: u32, path: &Path) -> Result<Self, StoreError> {
        rule_kind_from_wire(tag).ok_or_else(|| StoreError::Truncated(path.display().to_string()))
    }
}

fn rule_kind_from_wire(tag: u32) -> Option<RuleKind> {
    use RuleKind::*;
    const ORDER: &[RuleKind] = &[
        Port,
        Icmp,
        Permission,
        Uid,
        Gid,
        Size,
        ContentMatch,
        Checksum,
        Timestamp,
        FilesystemSpace,
        FilesystemInodes,
        Cpu,
        Memory,
        Uptime,
        LinkStatus,
        LinkSpeed,
        LinkSaturation,
        UploadBytes,
        DownloadBytes,
        UploadPackets,
        DownloadPackets,
        PidChanged,
        PpidChanged,
        ProcessResource,
        ProgramExitStatus,
        Exist,
        Instance,
        Action,
    ];
    ORDER.get(tag as usize).copied()
}

fn rule_kind_to_wire(kind: RuleKind) -> u32 {
    // RuleKind's discriminant ordering doubles as its wire tag, matching the
    // `RuleKindBits` bitset ordinal in `vigil_core::service`.
    kind as u32
}

/// A directory of pending-event files, bounded to `eventlist_slots` entries
/// (spec §3 invariants: "when full, new enqueues are dropped with a logged
/// error").
pub struct EventQueue {
    dir: PathBuf,
    slots: usize,
}

impl EventQueue {
    pub fn new(dir: impl Into<PathBuf>, slots: usize) -> Self {
        Self { dir: dir.into(), slots }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists one event for later delivery retry. Returns `Ok(None)` if
    /// the queue is at capacity and the enqueue was dropped (the caller is
    /// expected to log this per spec §3).
    pub fn persist(
        &self,
        service_name: &str,
        event: &Event,
        message: &str,
        action_kind: ActionKind,
        now_epoch: u64,
    ) -> Result<Option<PathBuf>, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        if self.list()?.len() >= self.slots {
            return Ok(None);
        }
        let name = format!("{now_epoch}_{}", service_name_hash(service_name));
        let path = self.dir.join(name);
        let bytes = encode(service_name, event, message, action_kind);
        fs::write(&path, bytes).map_err(|e| io_err(&path, e))?;
        Ok(Some(path))
    }

    pub fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        match fs::read_dir(&self.dir) {
            Ok(entries) => entries.map(|e| e.map(|e| e.path()).map_err(|err| io_err(&self.dir, err))).collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(io_err(&self.dir, err)),
        }
    }

    /// Reads and decodes one queue file. Files with a version mismatch are
    /// reported as an error so the caller can delete them with a logged
    /// reason (spec §4.6 "Version gate").
    pub fn read(&self, path: &Path) -> Result<QueuedEvent, StoreError> {
        let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
        decode(path, &bytes)
    }

    /// Rewrites a queue file in place with updated delivery flags, after a
    /// partial replay success (spec §4.6 "Queue replay").
    pub fn rewrite(&self, path: &Path, service_name: &str, event: &Event, message: &str, action_kind: ActionKind) -> Result<(), StoreError> {
        let bytes = encode(service_name, event, message, action_kind);
        fs::write(path, bytes).map_err(|e| io_err(path, e))
    }

    pub fn remove(&self, path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(path, err)),
        }
    }
}
