use anyhow::Result;
use bakeoff_core::PromptSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// One model's raw response to one prompt turn, as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub model: String,
    pub turn: String,
    pub prompt: String,
    pub response_text: String,
    pub response_path: PathBuf,
}

/// `T<digit>_<anything>.txt`
pub fn is_turn_file_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= "T0_.txt".len()
        && bytes[0] == b'T'
        && bytes[1].is_ascii_digit()
        && bytes[2] == b'_'
        && name.ends_with(".txt")
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Scans `<outputs_root>/<model>/T<d>_*.txt`, ordered by model directory then
/// file name. Loose files directly under the root are ignored, and a missing
/// root yields no traces.
pub fn collect_traces(outputs_root: &Path, prompts: Option<&PromptSet>) -> Result<Vec<Trace>> {
    if !outputs_root.is_dir() {
        return Ok(Vec::new());
    }
    let walker = WalkDir::new(outputs_root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    let mut traces = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_turn_file_name(name) {
            continue;
        }
        let path = entry.path();
        let Some(model) = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
        else {
            continue;
        };
        let turn = name.trim_end_matches(".txt").to_string();
        let response_text = String::from_utf8_lossy(&fs::read(path)?).into_owned();
        let prompt = prompts
            .and_then(|p| p.get(&turn))
            .unwrap_or_default()
            .to_string();
        traces.push(Trace {
            model: model.to_string(),
            turn,
            prompt,
            response_text,
            response_path: path.to_path_buf(),
        });
    }
    Ok(traces)
}
