//! Identity token file (spec §6 "Identity file").
//!
//! A single MD5-derived 32-byte hex token, generated once on first start and
//! read back on every subsequent start. Grounded in `monit.c`'s `Run.id`
//! handling: the token has no meaning beyond being stable and unique to this
//! installation, so it is derived from the hostname plus random bytes rather
//! than anything that needs to round-trip.

use std::fs;
use std::path::Path;

use md5::{Digest, Md5};
use rand::RngCore;

use crate::error::StoreError;

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.display().to_string(), source }
}

/// Reads the identity token at `path`, generating and persisting a new one
/// if the file does not exist yet.
pub fn load_or_create(path: &Path) -> Result<String, StoreError> {
    match fs::read_to_string(path) {
        Ok(existing) => Ok(existing.trim().to_string()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let id = generate();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
            }
            fs::write(path, &id).map_err(|e| io_err(path, e))?;
            Ok(id)
        }
        Err(err) => Err(io_err(path, err)),
    }
}

/// `--resetid`: force a fresh token, overwriting whatever was there.
pub fn reset(path: &Path) -> Result<String, StoreError> {
    let id = generate();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
    }
    fs::write(path, &id).map_err(|e| io_err(path, e))?;
    Ok(id)
}

fn generate() -> String {
    let hostname = hostname_or_default();
    let mut rand_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut rand_bytes);

    let mut hasher = Md5::new();
    hasher.update(hostname.as_bytes());
    hasher.update(rand_bytes);
    hex::encode(hasher.finalize())
}

fn hostname_or_default() -> String {
    let mut buf = [0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if ret != 0 {
        return "localhost".to_string();
    }
    let nul = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..nul]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_generates_a_32_byte_hex_token() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("id");
        let id = load_or_create(&path).unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn load_or_create_is_stable_across_calls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("id");
        let first = load_or_create(&path).unwrap();
        let second = load_or_create(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn reset_produces_a_different_token() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("id");
        let first = load_or_create(&path).unwrap();
        let second = reset(&path).unwrap();
        assert_ne!(first, second);
    }
}
