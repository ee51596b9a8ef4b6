use anyhow::{anyhow, bail, Context, Result};
use bakeoff_core::atomic_write_bytes;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// A reviewer's overall call on one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Good,
    #[default]
    Weak,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Good => "good",
            Verdict::Weak => "weak",
            Verdict::Fail => "fail",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "good" => Ok(Verdict::Good),
            "weak" => Ok(Verdict::Weak),
            "fail" => Ok(Verdict::Fail),
            other => bail!("unknown verdict '{}': expected good, weak or fail", other),
        }
    }
}

/// One line of `human_labels.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub timestamp: String,
    pub model: String,
    pub turn: String,
    #[serde(default)]
    pub response_path: String,
    #[serde(default)]
    pub reasoning_bad: bool,
    #[serde(default)]
    pub math_bad: bool,
    #[serde(default)]
    pub citation_bad: bool,
    #[serde(default)]
    pub question_bad: bool,
    #[serde(default)]
    pub verdict: Verdict,
    #[serde(default)]
    pub comment: String,
}

pub fn label_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Human labels keyed by (model, turn), backed by a JSONL file with a CSV
/// copy next to it.
#[derive(Debug, Clone)]
pub struct LabelStore {
    path: PathBuf,
    records: Vec<LabelRecord>,
}

impl LabelStore {
    /// Loads `path` if it exists. Unreadable lines are skipped; when a key
    /// appears twice the later line wins.
    pub fn load(path: &Path) -> Result<Self> {
        let mut store = Self {
            path: path.to_path_buf(),
            records: Vec::new(),
        };
        if !path.exists() {
            return Ok(store);
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("read labels {}", path.display()))?;
        for (idx, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LabelRecord>(line) {
                Ok(record) => store.upsert(record),
                Err(e) => warn!(
                    file = %path.display(),
                    line = idx + 1,
                    error = %e,
                    "skipping malformed label line"
                ),
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn csv_path(&self) -> PathBuf {
        self.path.with_extension("csv")
    }

    pub fn records(&self) -> &[LabelRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, model: &str, turn: &str) -> Option<&LabelRecord> {
        self.records
            .iter()
            .find(|r| r.model == model && r.turn == turn)
    }

    /// Replaces the record with the same key in place, or appends.
    pub fn upsert(&mut self, record: LabelRecord) {
        match self
            .records
            .iter_mut()
            .find(|r| r.model == record.model && r.turn == record.turn)
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Rewrites the JSONL file atomically, then the CSV copy.
    pub fn save(&self) -> Result<()> {
        let mut jsonl = Vec::new();
        for record in &self.records {
            serde_json::to_writer(&mut jsonl, record)?;
            jsonl.push(b'\n');
        }
        atomic_write_bytes(&self.path, &jsonl)?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in &self.records {
            writer.serialize(record)?;
        }
        let csv_bytes = writer
            .into_inner()
            .map_err(|e| anyhow!("flush csv buffer: {}", e.error()))?;
        atomic_write_bytes(&self.csv_path(), &csv_bytes)
    }

    pub fn upsert_and_save(&mut self, record: LabelRecord) -> Result<()> {
        self.upsert(record);
        self.save()
    }
}
