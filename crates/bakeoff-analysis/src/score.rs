//! Heuristic scoring of a single response.
//!
//! Four independent pass/fail text checks, each worth 2 points. This is a
//! coarse filter for obviously broken answers, not a quality rubric: a
//! response can score 8 and still be wrong.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

use crate::extract::{extract_json_object, JsonExtraction};

pub const POINTS_PER_CHECK: u32 = 2;
pub const MAX_SCORE: u32 = 4 * POINTS_PER_CHECK;

const REASONING_MARKERS: [&str; 2] = ["Reasoning (text)", "### Reasoning"];
const MIN_REASONING_CHARS: usize = 8;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("url pattern is a valid literal"))
}

fn question_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9]\?(?:\s|$)").expect("question pattern is a valid literal")
    })
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"https?://[^\s)\]]+/").expect("citation pattern is a valid literal")
    })
}

fn formula_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[×x*=]|\bARPU\b|\bUSD\b|\bformula\b")
            .expect("formula pattern is a valid literal")
    })
}

/// A word character directly followed by `?` and then whitespace or end of
/// text. URLs are removed first so query strings do not count.
pub fn asks_question(text: &str) -> bool {
    let without_urls = url_re().replace_all(text, "");
    question_re().is_match(&without_urls)
}

pub fn has_visible_reasoning(text: &str) -> bool {
    REASONING_MARKERS.iter().any(|m| text.contains(m))
}

/// True when any object at any depth has a key equal to `reasoning`
/// (ignoring case) holding a string longer than 8 chars once trimmed.
pub fn json_has_reasoning(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            let direct = map.iter().any(|(k, v)| {
                k.to_lowercase() == "reasoning"
                    && v.as_str()
                        .map(|s| s.trim().chars().count() > MIN_REASONING_CHARS)
                        .unwrap_or(false)
            });
            direct || map.values().any(json_has_reasoning)
        }
        Value::Array(items) => items.iter().any(json_has_reasoning),
        _ => false,
    }
}

/// A URL with at least one path separator after the host.
pub fn has_specific_citation(text: &str) -> bool {
    citation_re().is_match(text)
}

pub fn has_formula_or_units(text: &str) -> bool {
    formula_re().is_match(text)
}

fn points(pass: bool) -> u32 {
    if pass {
        POINTS_PER_CHECK
    } else {
        0
    }
}

/// Predicate results for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub asked_question: bool,
    pub reasoning_ok: bool,
    pub citation_ok: bool,
    pub math_ok: bool,
}

impl ScoreCard {
    /// Scores `text`, using `json` as the parsed embedded object if any.
    pub fn from_parts(text: &str, json: Option<&Value>) -> Self {
        Self {
            asked_question: asks_question(text),
            reasoning_ok: has_visible_reasoning(text)
                || json.map(json_has_reasoning).unwrap_or(false),
            citation_ok: has_specific_citation(text),
            math_ok: has_formula_or_units(text),
        }
    }

    pub fn evaluate(text: &str) -> Self {
        let extraction = extract_json_object(text);
        if matches!(extraction, JsonExtraction::Malformed) {
            debug!("first brace block in response is not a JSON object");
        }
        Self::from_parts(text, extraction.object())
    }

    /// Not asking is rewarded, so this is the inverse of the other checks.
    pub fn score_noq(&self) -> u32 {
        points(!self.asked_question)
    }

    pub fn score_reason(&self) -> u32 {
        points(self.reasoning_ok)
    }

    pub fn score_cite(&self) -> u32 {
        points(self.citation_ok)
    }

    pub fn score_math(&self) -> u32 {
        points(self.math_ok)
    }

    pub fn total(&self) -> u32 {
        self.score_noq() + self.score_reason() + self.score_cite() + self.score_math()
    }
}
