use anyhow::{Context, Result};
use bakeoff_analysis::{
    build_synthetic_evals, collect_traces, export_traces, RunStatus, Trace, MAX_SCORE, SCORING_NOTE,
};
use bakeoff_core::{load_config, load_prompts, PromptSet, Workspace};
use bakeoff_runner::{
    api_key_from_env, health_check, require_models, run_bakeoff, run_flow, CheckStatus, Command,
    Flag, LabelStore, OpenAiClient, ReviewSession, ReviewState, Verdict,
};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bakeoff", version = "0.3.0", about = "Model bake-off and eval harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send every prompt to every configured model.
    Run,
    /// Run the TAM/SAM/SOM turns per model, then score and rank.
    Bakeoff,
    /// Score all outputs into the synthetic evals dataset.
    Evals,
    /// Write outputs as a flat CSV for spreadsheet review.
    Export,
    /// Review outputs one at a time and record human labels.
    Label,
    /// Check the session directory before running anything.
    Health,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let ws = Workspace::current().context("resolve working directory")?;
    run_command(cli.command, &ws)
}

const DEFAULT_LOG_FILTER: &str = "info";

/// `RUST_LOG` when set and parseable, otherwise `info`.
fn log_filter(env_value: Option<&str>) -> EnvFilter {
    env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn run_command(command: Commands, ws: &Workspace) -> Result<()> {
    match command {
        Commands::Run => {
            let config = load_config(&ws.config_path())?;
            let models = require_models(&config, &ws.config_path())?;
            let prompts = load_prompts(&ws.prompts_path())?;
            let client = OpenAiClient::from_env(config.generation.clone())?;
            let result = run_flow(&client, &prompts, models, &ws.outputs_dir())?;
            for rec in &result.records {
                println!(
                    "{:16} {:10} {:>6.2}s tokens={}",
                    rec.model,
                    rec.turn,
                    rec.latency_s,
                    rec.tokens.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
            println!("wrote: {}", result.summary_path.display());
        }
        Commands::Bakeoff => {
            let config = load_config(&ws.config_path())?;
            let prompts = load_prompts(&ws.prompts_path())?;
            let client = OpenAiClient::from_env(config.generation.clone())?;
            let outcome = run_bakeoff(ws, &config, &prompts, &client)?;

            println!("Bake-off ranking:");
            for s in &outcome.standings {
                let note = if s.status == RunStatus::Failed {
                    " (failed)"
                } else {
                    ""
                };
                println!("{:16} {:>2}/{}{}", s.model, s.total, outcome.max_total, note);
            }
            println!();
            for row in &outcome.rows {
                println!(
                    "{:16} {:8} noq={} reason={} cite={} math={} total={}",
                    row.model,
                    row.turn,
                    row.score_noq,
                    row.score_reason,
                    row.score_cite,
                    row.score_math,
                    row.score_total
                );
            }
            println!("wrote: {}", outcome.summary_path.display());
            if !outcome.failed_models.is_empty() {
                println!("Failed models:");
                for (model, message) in &outcome.failed_models {
                    println!("  {}: {}", model, message);
                }
            }
        }
        Commands::Evals => {
            let prompts = optional_prompts(ws)?;
            let traces = collect_traces(&ws.outputs_dir(), prompts.as_ref())?;
            let report = build_synthetic_evals(
                &traces,
                &ws.synthetic_evals_csv(),
                &ws.synthetic_evals_jsonl(),
            )?;
            let Some(report) = report else {
                println!("No output files found. Run `bakeoff run` or `bakeoff bakeoff` first.");
                return Ok(());
            };
            println!("Mean score per model (out of {}):", MAX_SCORE);
            for avg in &report.summary.averages {
                println!("  {:16} {:.2} ({} turns)", avg.model, avg.mean_total, avg.turns);
            }
            if !report.summary.missing_reasoning.is_empty() {
                println!("Missing reasoning:");
                for m in &report.summary.missing_reasoning {
                    println!("  {} {} {}", m.model, m.turn, m.raw_path);
                }
            }
            println!("{}", SCORING_NOTE);
            println!("wrote: {}", report.csv_path.display());
            println!("wrote: {}", report.jsonl_path.display());
        }
        Commands::Export => {
            let prompts = optional_prompts(ws)?;
            let traces = collect_traces(&ws.outputs_dir(), prompts.as_ref())?;
            let out = ws.traces_export_csv();
            let n = export_traces(&traces, &out)?;
            println!("exported {} traces", n);
            println!("wrote: {}", out.display());
        }
        Commands::Label => {
            let prompts = optional_prompts(ws)?;
            let traces = collect_traces(&ws.outputs_dir(), prompts.as_ref())?;
            if traces.is_empty() {
                println!("No traces found. Generate outputs first.");
                return Ok(());
            }
            let store = LabelStore::load(&ws.human_labels_jsonl())?;
            let session = ReviewSession::new(traces, store);
            review_loop(session, io::stdin().lock())?;
        }
        Commands::Health => {
            let report = health_check(ws, api_key_from_env().is_some())?;
            for check in &report.checks {
                println!("{}", check);
            }
            println!(
                "{} ok, {} warn, {} bad",
                report.count(CheckStatus::Ok),
                report.count(CheckStatus::Warn),
                report.count(CheckStatus::Bad)
            );
            println!("next steps:");
            println!("  bakeoff bakeoff   run and rank the TAM/SAM/SOM turns");
            println!("  bakeoff evals     score everything under outputs/");
            println!("  bakeoff label     review outputs by hand");
        }
    }
    Ok(())
}

fn optional_prompts(ws: &Workspace) -> Result<Option<PromptSet>> {
    let path = ws.prompts_path();
    if !path.exists() {
        warn!(path = %path.display(), "prompt file not found; prompts will be empty");
        return Ok(None);
    }
    Ok(Some(load_prompts(&path)?))
}

#[derive(Debug, PartialEq)]
enum Input {
    Command(Command),
    Exit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    match word {
        "n" => Input::Command(Command::Next),
        "p" => Input::Command(Command::Prev),
        "s" => Input::Command(Command::Save),
        "r" => Input::Command(Command::Toggle(Flag::Reasoning)),
        "m" => Input::Command(Command::Toggle(Flag::Math)),
        "c" => Input::Command(Command::Toggle(Flag::Citation)),
        "q" => Input::Command(Command::Toggle(Flag::Question)),
        "v" => match rest.parse::<Verdict>() {
            Ok(v) => Input::Command(Command::SetVerdict(v)),
            Err(e) => Input::Unknown(e.to_string()),
        },
        "note" => Input::Command(Command::SetComment(rest.to_string())),
        "x" => Input::Exit,
        other => Input::Unknown(format!("unknown command '{}'", other)),
    }
}

fn mark(on: bool) -> &'static str {
    if on {
        "x"
    } else {
        " "
    }
}

fn render(trace: &Trace, state: &ReviewState, total: usize) {
    let d = &state.draft;
    println!("{}", "=".repeat(72));
    println!("{} / {}", trace.model, trace.turn);
    println!(
        "{}/{} — {}",
        state.index + 1,
        total,
        trace.response_path.display()
    );
    println!("--- prompt ---");
    println!("{}", trace.prompt);
    println!("--- response ---");
    println!("{}", trace.response_text);
    println!("---");
    println!(
        "[{}] r reasoning bad  [{}] m math bad  [{}] c citation bad  [{}] q asked question",
        mark(d.reasoning_bad),
        mark(d.math_bad),
        mark(d.citation_bad),
        mark(d.question_bad)
    );
    println!("verdict: {}", d.verdict);
    if !d.comment.is_empty() {
        println!("note: {}", d.comment);
    }
    println!("commands: n p s r m c q | v <good|weak|fail> | note <text> | x");
}

fn review_loop(mut session: ReviewSession, input: impl BufRead) -> Result<()> {
    let total = session.len();
    if let Some((trace, state)) = session.current() {
        render(trace, state, total);
    }
    let mut lines = input.lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        match parse_input(&line?) {
            Input::Exit => break,
            Input::Unknown(msg) => println!("{}", msg),
            Input::Command(cmd) => {
                if session.apply(cmd)? {
                    println!("saved: {}", session.store().path().display());
                } else if let Some((trace, state)) = session.current() {
                    render(trace, state, total);
                }
            }
        }
    }
    println!("{} labels in {}", session.store().len(), session.store().path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_overrides_the_default_level() {
        assert_eq!(log_filter(Some("debug")).to_string(), "debug");
        assert_eq!(log_filter(Some("warn")).to_string(), "warn");
        assert_eq!(log_filter(None).to_string(), "info");
        assert_eq!(log_filter(Some("  ")).to_string(), "info");
    }

    #[test]
    fn parses_review_commands() {
        assert_eq!(parse_input("n"), Input::Command(Command::Next));
        assert_eq!(parse_input(" q "), Input::Command(Command::Toggle(Flag::Question)));
        assert_eq!(
            parse_input("v fail"),
            Input::Command(Command::SetVerdict(Verdict::Fail))
        );
        assert_eq!(
            parse_input("note  no source given "),
            Input::Command(Command::SetComment("no source given".to_string()))
        );
        assert_eq!(parse_input("x"), Input::Exit);
        assert!(matches!(parse_input("v meh"), Input::Unknown(_)));
        assert!(matches!(parse_input("zz"), Input::Unknown(_)));
    }
}
