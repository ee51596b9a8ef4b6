use anyhow::{anyhow, Context, Result};
use bakeoff_core::atomic_write_bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::extract::{extract_json_object, JsonExtraction};
use crate::score::ScoreCard;
use crate::trace::Trace;

pub const SCORING_NOTE: &str = "Scores are four pass/fail text heuristics (no question asked, \
visible reasoning, cited URL with a path, formula or units), 2 points each. \
They flag obviously broken answers and are not a quality rubric.";

/// One row of `synthetic_evals.{csv,jsonl}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTrace {
    pub model: String,
    pub turn: String,
    pub text: String,
    pub asked_question: bool,
    pub reasoning_ok: bool,
    pub citation_ok: bool,
    pub math_ok: bool,
    pub economic_estimate: Option<Value>,
    pub population_estimate: Option<Value>,
    pub currency: Option<Value>,
    pub raw_path: String,
    pub score_noq: u32,
    pub score_reason: u32,
    pub score_cite: u32,
    pub score_math: u32,
    pub score_total: u32,
}

fn top_level_field(json: Option<&Value>, key: &str) -> Option<Value> {
    json.and_then(|v| v.get(key))
        .filter(|v| !v.is_null())
        .cloned()
}

pub fn score_trace(trace: &Trace) -> ScoredTrace {
    let extraction = extract_json_object(&trace.response_text);
    if matches!(extraction, JsonExtraction::Malformed) {
        debug!(
            model = %trace.model,
            turn = %trace.turn,
            "first brace block in response is not a JSON object"
        );
    }
    let json = extraction.object();
    let card = ScoreCard::from_parts(&trace.response_text, json);
    ScoredTrace {
        model: trace.model.clone(),
        turn: trace.turn.clone(),
        text: trace.response_text.clone(),
        asked_question: card.asked_question,
        reasoning_ok: card.reasoning_ok,
        citation_ok: card.citation_ok,
        math_ok: card.math_ok,
        economic_estimate: top_level_field(json, "economic_estimate"),
        population_estimate: top_level_field(json, "population_estimate"),
        currency: top_level_field(json, "currency"),
        raw_path: trace.response_path.display().to_string(),
        score_noq: card.score_noq(),
        score_reason: card.score_reason(),
        score_cite: card.score_cite(),
        score_math: card.score_math(),
        score_total: card.total(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelAverage {
    pub model: String,
    pub mean_total: f64,
    pub turns: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissingReasoning {
    pub model: String,
    pub turn: String,
    pub raw_path: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalSummary {
    /// Highest mean first; ties keep model name order.
    pub averages: Vec<ModelAverage>,
    pub missing_reasoning: Vec<MissingReasoning>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn summarize(rows: &[ScoredTrace]) -> EvalSummary {
    let mut sums: BTreeMap<&str, (u32, usize)> = BTreeMap::new();
    for row in rows {
        let entry = sums.entry(row.model.as_str()).or_default();
        entry.0 += row.score_total;
        entry.1 += 1;
    }
    let mut averages: Vec<ModelAverage> = sums
        .into_iter()
        .map(|(model, (sum, n))| ModelAverage {
            model: model.to_string(),
            mean_total: round2(sum as f64 / n as f64),
            turns: n,
        })
        .collect();
    averages.sort_by(|a, b| b.mean_total.total_cmp(&a.mean_total));

    let missing_reasoning = rows
        .iter()
        .filter(|r| !r.reasoning_ok)
        .map(|r| MissingReasoning {
            model: r.model.clone(),
            turn: r.turn.clone(),
            raw_path: r.raw_path.clone(),
        })
        .collect();

    EvalSummary {
        averages,
        missing_reasoning,
    }
}

fn csv_cell(value: &Option<Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub const EVAL_CSV_HEADER: [&str; 16] = [
    "model",
    "turn",
    "text",
    "asked_question",
    "reasoning_ok",
    "citation_ok",
    "math_ok",
    "economic_estimate",
    "population_estimate",
    "currency",
    "raw_path",
    "score_noq",
    "score_reason",
    "score_cite",
    "score_math",
    "score_total",
];

pub fn write_evals_csv(path: &Path, rows: &[ScoredTrace]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EVAL_CSV_HEADER)?;
    for r in rows {
        writer.write_record([
            r.model.clone(),
            r.turn.clone(),
            r.text.clone(),
            r.asked_question.to_string(),
            r.reasoning_ok.to_string(),
            r.citation_ok.to_string(),
            r.math_ok.to_string(),
            csv_cell(&r.economic_estimate),
            csv_cell(&r.population_estimate),
            csv_cell(&r.currency),
            r.raw_path.clone(),
            r.score_noq.to_string(),
            r.score_reason.to_string(),
            r.score_cite.to_string(),
            r.score_math.to_string(),
            r.score_total.to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("flush csv buffer: {}", e.error()))?;
    atomic_write_bytes(path, &bytes)
}

pub fn write_evals_jsonl(path: &Path, rows: &[ScoredTrace]) -> Result<()> {
    let mut out = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.push(b'\n');
    }
    atomic_write_bytes(path, &out)
}

pub fn read_evals_jsonl(path: &Path) -> Result<Vec<ScoredTrace>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read evals jsonl {}", path.display()))?;
    let mut rows = Vec::new();
    for (idx, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: ScoredTrace = serde_json::from_str(line)
            .with_context(|| format!("{}:{}", path.display(), idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Result of scoring every collected trace.
#[derive(Debug, Clone)]
pub struct EvalReport {
    pub rows: Vec<ScoredTrace>,
    pub summary: EvalSummary,
    pub csv_path: PathBuf,
    pub jsonl_path: PathBuf,
}

/// Scores `traces` and writes both dataset files. Returns `None` without
/// touching the filesystem when there is nothing to score.
pub fn build_synthetic_evals(
    traces: &[Trace],
    csv_path: &Path,
    jsonl_path: &Path,
) -> Result<Option<EvalReport>> {
    if traces.is_empty() {
        return Ok(None);
    }
    let rows: Vec<ScoredTrace> = traces.iter().map(score_trace).collect();
    write_evals_csv(csv_path, &rows)?;
    write_evals_jsonl(jsonl_path, &rows)?;
    let summary = summarize(&rows);
    Ok(Some(EvalReport {
        rows,
        summary,
        csv_path: csv_path.to_path_buf(),
        jsonl_path: jsonl_path.to_path_buf(),
    }))
}
