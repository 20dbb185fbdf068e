// src/install/hash.rs

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

/// Compute the hash of a single file.
fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Deterministic hash over the install inputs of a workspace.
///
/// Inputs are paths relative to `root`. Order does not matter. A missing
/// input hashes differently from an empty one, so creating a lockfile
/// counts as a change.
pub fn compute_input_hash(root: &Path, inputs: &[String]) -> Result<String> {
    let mut hasher = Hasher::new();

    let mut sorted: Vec<&String> = inputs.iter().collect();
    sorted.sort();
    sorted.dedup();

    for input in sorted {
        let path = root.join(input);
        hasher.update(input.as_bytes());
        if path.is_file() {
            hasher.update(b"\0file\0");
            hasher.update(compute_file_hash(&path)?.as_bytes());
        } else {
            hasher.update(b"\0missing\0");
        }
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(root = ?root, hash = %hash, "computed install input hash");
    Ok(hash)
}

/// In-memory record of the input hash of each workspace's last clean install.
#[derive(Debug, Default)]
pub struct InstallStamps {
    stamps: Mutex<HashMap<PathBuf, String>>,
}

impl InstallStamps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, workspace: &Path, hash: &str) -> bool {
        let stamps = self.stamps.lock().unwrap_or_else(|e| e.into_inner());
        stamps.get(workspace).is_some_and(|h| h == hash)
    }

    pub fn record(&self, workspace: &Path, hash: String) {
        let mut stamps = self.stamps.lock().unwrap_or_else(|e| e.into_inner());
        stamps.insert(workspace.to_path_buf(), hash);
    }

    pub fn forget(&self, workspace: &Path) {
        let mut stamps = self.stamps.lock().unwrap_or_else(|e| e.into_inner());
        stamps.remove(workspace);
    }
}
