//! Reading model outputs back off disk and scoring them.

pub mod bakeoff;
pub mod export;
pub mod extract;
pub mod report;
pub mod score;
pub mod trace;

pub use bakeoff::{
    max_total, rank, render_markdown, score_bakeoff, write_summary, BakeoffRow, RunStatus, Standing,
};
pub use export::{clean_response, export_traces};
pub use extract::{extract_json_object, JsonExtraction};
pub use report::{
    build_synthetic_evals, read_evals_jsonl, score_trace, summarize, write_evals_csv,
    write_evals_jsonl, EvalReport, EvalSummary, MissingReasoning, ModelAverage, ScoredTrace,
    SCORING_NOTE,
};
pub use score::{ScoreCard, MAX_SCORE};
pub use trace::{collect_traces, Trace};
