// fingerprint.rs
// Identity & Integrity (C1): a content hash of the script that defines a
// workflow class, checked on every `next()` and re-sealed only by `revive`.
//
// The original implementation this was distilled from (`aiida.orm.workflow`)
// hashes the path *string*, not the file's bytes — almost certainly a bug,
// since editing the file after commit would then go undetected. This
// reimplementation hashes file contents (spec §9 Design Notes, decided).
use sha2::{Digest, Sha256};
use std::path::Path;

/// Computes the fingerprint of the file at `path`.
pub fn fingerprint_path(path: &Path) -> std::io::Result<String> {
  let bytes = std::fs::read(path)?;
  Ok(fingerprint_bytes(&bytes))
}

pub fn fingerprint_bytes(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}
