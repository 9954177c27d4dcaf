// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON state files: `[key, record]` pair sequences written atomically.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// What a store found on disk at startup.
pub enum Loaded<T> {
    Records(Vec<(String, T)>),
    Missing,
}

/// Load a pair sequence from a JSON file.
///
/// A missing file is not an error. A malformed one is.
pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Loaded<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(e) => return Err(e.into()),
    };
    let records: Vec<(String, T)> = serde_json::from_str(&contents)?;
    Ok(Loaded::Records(records))
}

/// Rewrite the whole pair sequence atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never share
/// a `.tmp` file.
pub fn save<T: Serialize>(path: &Path, records: &[(String, T)]) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let json = serde_json::to_string_pretty(records)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
