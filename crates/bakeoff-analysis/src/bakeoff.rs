use anyhow::Result;
use bakeoff_core::{atomic_write_bytes, Workspace};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::report::SCORING_NOTE;
use crate::score::{ScoreCard, MAX_SCORE};

/// Per-turn sub-scores for one model in a bake-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BakeoffRow {
    pub model: String,
    pub turn: String,
    pub score_noq: u32,
    pub score_reason: u32,
    pub score_cite: u32,
    pub score_math: u32,
    pub score_total: u32,
}

impl BakeoffRow {
    fn missing(model: &str, turn: &str) -> Self {
        Self {
            model: model.to_string(),
            turn: turn.to_string(),
            score_noq: 0,
            score_reason: 0,
            score_cite: 0,
            score_math: 0,
            score_total: 0,
        }
    }

    fn from_card(model: &str, turn: &str, card: &ScoreCard) -> Self {
        Self {
            model: model.to_string(),
            turn: turn.to_string(),
            score_noq: card.score_noq(),
            score_reason: card.score_reason(),
            score_cite: card.score_cite(),
            score_math: card.score_math(),
            score_total: card.total(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub model: String,
    pub total: u32,
    pub status: RunStatus,
}

pub fn max_total(turns: &[&str]) -> u32 {
    MAX_SCORE * turns.len() as u32
}

/// Scores `outputs/<model>/<turn>.txt` for every model and turn. A missing
/// file scores zero on every check rather than dropping the row, so models
/// whose run failed stay visible in the ranking.
pub fn score_bakeoff(ws: &Workspace, models: &[String], turns: &[&str]) -> Result<Vec<BakeoffRow>> {
    let mut rows = Vec::with_capacity(models.len() * turns.len());
    for model in models {
        for turn in turns {
            let path = ws.response_path(model, turn);
            if !path.is_file() {
                rows.push(BakeoffRow::missing(model, turn));
                continue;
            }
            let text = String::from_utf8_lossy(&fs::read(&path)?).into_owned();
            rows.push(BakeoffRow::from_card(model, turn, &ScoreCard::evaluate(&text)));
        }
    }
    Ok(rows)
}

/// Totals per model, highest first. Ties keep the order models first appear
/// in `rows`. A model is `failed` when `failed` says so, regardless of how
/// many of its files exist.
pub fn rank(rows: &[BakeoffRow], failed: impl Fn(&str) -> bool) -> Vec<Standing> {
    let mut order: Vec<&str> = Vec::new();
    let mut totals: BTreeMap<&str, u32> = BTreeMap::new();
    for row in rows {
        let entry = totals.entry(row.model.as_str()).or_insert_with(|| {
            order.push(row.model.as_str());
            0
        });
        *entry += row.score_total;
    }
    let mut standings: Vec<Standing> = order
        .into_iter()
        .map(|model| Standing {
            model: model.to_string(),
            total: totals.get(model).copied().unwrap_or(0),
            status: if failed(model) {
                RunStatus::Failed
            } else {
                RunStatus::Ok
            },
        })
        .collect();
    standings.sort_by(|a, b| b.total.cmp(&a.total));
    standings
}

pub fn render_markdown(standings: &[Standing], max: u32) -> String {
    let mut lines = vec![
        format!("| Model | Score / {} | Note |", max),
        "|--------|-------------|------|".to_string(),
    ];
    for s in standings {
        lines.push(format!("| {} | {} | {} |", s.model, s.total, s.status.as_str()));
    }
    lines.push(String::new());
    lines.push(format!("_{}_", SCORING_NOTE));
    lines.join("\n") + "\n"
}

pub fn write_summary(path: &Path, standings: &[Standing], max: u32) -> Result<()> {
    atomic_write_bytes(path, render_markdown(standings, max).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakeoff_core::BAKEOFF_TURNS;
    use chrono::Utc;
    use std::path::PathBuf;

    fn scratch(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bakeoff_rank_{}_{}_{}",
            label,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    #[test]
    fn failed_model_without_files_gets_zero_rows_and_failed_status() {
        let root = scratch("failed");
        let ws = Workspace::new(&root);
        let good_dir = ws.model_dir("good:1b");
        fs::create_dir_all(&good_dir).expect("model dir");
        for turn in BAKEOFF_TURNS {
            fs::write(
                good_dir.join(format!("{}.txt", turn)),
                "Reasoning (text): ARPU=40, see https://data.example.org/table",
            )
            .expect("write");
        }
        let models = vec!["broken".to_string(), "good:1b".to_string()];
        let rows = score_bakeoff(&ws, &models, &BAKEOFF_TURNS).expect("score");
        assert_eq!(rows.len(), 6);
        assert!(rows[..3].iter().all(|r| r.score_total == 0 && r.score_noq == 0));
        assert!(rows[3..].iter().all(|r| r.score_total == 8));

        let standings = rank(&rows, |m| m == "broken");
        assert_eq!(
            standings,
            vec![
                Standing {
                    model: "good:1b".to_string(),
                    total: 24,
                    status: RunStatus::Ok
                },
                Standing {
                    model: "broken".to_string(),
                    total: 0,
                    status: RunStatus::Failed
                },
            ]
        );

        let md_path = ws.bakeoff_summary_md();
        write_summary(&md_path, &standings, max_total(&BAKEOFF_TURNS)).expect("write md");
        let md = fs::read_to_string(md_path).expect("read md");
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines[0], "| Model | Score / 24 | Note |");
        assert_eq!(lines[2], "| good:1b | 24 | ok |");
        assert_eq!(lines[3], "| broken | 0 | failed |");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn partially_written_failed_model_keeps_real_scores() {
        let root = scratch("partial");
        let ws = Workspace::new(&root);
        fs::create_dir_all(ws.model_dir("m")).expect("dir");
        fs::write(ws.response_path("m", "T5_tam"), "plain statement").expect("write");
        let rows = score_bakeoff(&ws, &["m".to_string()], &BAKEOFF_TURNS).expect("score");
        let totals: Vec<u32> = rows.iter().map(|r| r.score_total).collect();
        assert_eq!(totals, vec![2, 0, 0]);
        let standings = rank(&rows, |_| true);
        assert_eq!(standings[0].total, 2);
        assert_eq!(standings[0].status, RunStatus::Failed);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn ties_keep_configured_order() {
        let rows = vec![
            BakeoffRow::missing("b", "T5_tam"),
            BakeoffRow::missing("a", "T5_tam"),
        ];
        let names: Vec<String> = rank(&rows, |_| false).into_iter().map(|s| s.model).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
