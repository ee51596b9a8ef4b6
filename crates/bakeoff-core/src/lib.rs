//! Shared plumbing for the bake-off tools: session config and prompt files,
//! the on-disk output layout, and small filesystem helpers.

pub mod config;
pub mod error;
pub mod layout;

use anyhow::Result;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::Path;

pub use config::{
    load_config, load_prompts, GenerationSettings, ProductContext, PromptSet, SessionConfig,
    PRODUCT_CONTEXT_KEYS,
};
pub use error::InputError;
pub use layout::{model_dir_name, Workspace, BAKEOFF_TURNS};

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Writes through a hidden sibling temp file and renames it over `path`, so
/// readers never observe a half-written file.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

pub fn atomic_write_json_pretty(path: &Path, value: &serde_json::Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}
