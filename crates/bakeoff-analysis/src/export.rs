use anyhow::{anyhow, Result};
use bakeoff_core::atomic_write_bytes;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

use crate::trace::Trace;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^```[a-zA-Z0-9]*\s*|\s*```$").expect("fence pattern is a valid literal")
    })
}

fn brace_chunk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*?\}").expect("brace pattern is a valid literal"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is a valid literal"))
}

fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Human-readable rendering of a raw response for spreadsheet review.
pub fn clean_response(raw: &str) -> String {
    let text = fence_re().replace_all(raw.trim(), "");
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => {
            return map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, plain_value(v)))
                .collect::<Vec<_>>()
                .join("\n");
        }
        Ok(Value::Array(items)) => {
            return items.iter().map(plain_value).collect::<Vec<_>>().join("\n");
        }
        _ => {}
    }
    let text = brace_chunk_re().replace_all(&text, "");
    whitespace_re().replace_all(&text, " ").trim().to_string()
}

pub fn export_traces(traces: &[Trace], out: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["model", "turn", "prompt", "plain_text", "response_path"])?;
    for t in traces {
        writer.write_record([
            t.model.clone(),
            t.turn.clone(),
            t.prompt.clone(),
            clean_response(&t.response_text),
            t.response_path.display().to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("flush csv buffer: {}", e.error()))?;
    atomic_write_bytes(out, &bytes)?;
    Ok(traces.len())
}
