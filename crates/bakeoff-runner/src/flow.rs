use anyhow::{bail, Context, Result};
use bakeoff_core::{
    atomic_write_bytes, atomic_write_json_pretty, ensure_dir, model_dir_name, PromptSet,
    SessionConfig,
};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::client::ModelClient;

/// Timing for one (model, turn) call, persisted in `summary_<stamp>.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnRecord {
    pub model: String,
    pub turn: String,
    pub latency_s: f64,
    pub tokens: Option<u64>,
}

#[derive(Debug)]
pub struct FlowResult {
    pub records: Vec<TurnRecord>,
    pub summary_path: PathBuf,
}

/// The configured model list, or an error naming `config_path` when it is
/// empty. Checked before any client is built or request sent.
pub fn require_models<'a>(config: &'a SessionConfig, config_path: &Path) -> Result<&'a [String]> {
    if config.models_to_test.is_empty() {
        bail!(
            "no models found in {} under 'models_to_test'",
            config_path.display()
        );
    }
    Ok(&config.models_to_test)
}

/// Sends every prompt to every model in order, writing each reply to
/// `<outputs_root>/<model>/<turn>.txt`. The first failed call aborts the
/// whole flow; replies already written stay on disk.
pub fn run_flow(
    client: &dyn ModelClient,
    prompts: &PromptSet,
    models: &[String],
    outputs_root: &Path,
) -> Result<FlowResult> {
    ensure_dir(outputs_root)?;
    let mut records = Vec::new();
    for model in models {
        let out_dir = outputs_root.join(model_dir_name(model));
        ensure_dir(&out_dir)?;
        for (turn, prompt) in prompts.iter() {
            info!(model = %model, turn = %turn, "sending prompt");
            let completion = client
                .complete(model, prompt)
                .with_context(|| format!("[{}] {} failed", model, turn))?;
            atomic_write_bytes(
                &out_dir.join(format!("{}.txt", turn)),
                completion.content.as_bytes(),
            )?;
            records.push(TurnRecord {
                model: model.clone(),
                turn: turn.to_string(),
                latency_s: (completion.latency.as_secs_f64() * 100.0).round() / 100.0,
                tokens: completion.total_tokens,
            });
        }
        info!(model = %model, out_dir = %out_dir.display(), "model complete");
    }

    let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
    let summary_path = outputs_root.join(format!("summary_{}.json", stamp));
    atomic_write_json_pretty(&summary_path, &serde_json::to_value(&records)?)?;
    info!(summary = %summary_path.display(), "wrote run summary");
    Ok(FlowResult {
        records,
        summary_path,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::Completion;
    use anyhow::bail;
    use chrono::Utc;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::fs;
    use std::time::Duration;

    /// Replies with a canned answer per turn prompt; fails for listed models.
    pub(crate) struct ScriptedClient {
        pub replies: BTreeMap<String, String>,
        pub failing_models: Vec<String>,
        pub fail_after: usize,
        pub calls: RefCell<Vec<(String, String)>>,
    }

    impl ScriptedClient {
        pub(crate) fn new(replies: &[(&str, &str)]) -> Self {
            Self {
                replies: replies
                    .iter()
                    .map(|(p, r)| (p.to_string(), r.to_string()))
                    .collect(),
                failing_models: Vec::new(),
                fail_after: 0,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ModelClient for ScriptedClient {
        fn complete(&self, model: &str, prompt: &str) -> Result<Completion> {
            let made_for_model = self
                .calls
                .borrow()
                .iter()
                .filter(|(m, _)| m == model)
                .count();
            self.calls
                .borrow_mut()
                .push((model.to_string(), prompt.to_string()));
            if self.failing_models.iter().any(|m| m == model) && made_for_model >= self.fail_after {
                bail!("HTTP 404: model '{}' not found", model);
            }
            Ok(Completion {
                content: self.replies.get(prompt).cloned().unwrap_or_default(),
                latency: Duration::from_millis(1234),
                total_tokens: Some(42),
            })
        }
    }

    pub(crate) fn scratch(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bakeoff_runner_{}_{}_{}",
            label,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn prompts() -> PromptSet {
        let mut map = BTreeMap::new();
        map.insert("T5_tam".to_string(), "tam prompt".to_string());
        map.insert("T6_sam".to_string(), "sam prompt".to_string());
        PromptSet::new(map)
    }

    #[test]
    fn empty_model_list_is_rejected() {
        let path = Path::new("session/config_session.yaml");
        let err = require_models(&SessionConfig::default(), path).expect_err("must fail");
        assert!(err.to_string().contains("models_to_test"), "{}", err);
        assert!(err.to_string().contains("config_session.yaml"), "{}", err);

        let config = SessionConfig {
            models_to_test: vec!["m1".to_string()],
            ..SessionConfig::default()
        };
        assert_eq!(require_models(&config, path).expect("models").to_vec(), vec!["m1"]);
    }

    #[test]
    fn writes_one_file_per_turn_and_a_summary() {
        let root = scratch("flow");
        let client =
            ScriptedClient::new(&[("tam prompt", "TAM answer"), ("sam prompt", "SAM answer")]);
        let result = run_flow(
            &client,
            &prompts(),
            &["llama3:8b".to_string()],
            &root.join("outputs"),
        )
        .expect("flow");

        let dir = root.join("outputs").join("llama3_8b");
        assert_eq!(fs::read_to_string(dir.join("T5_tam.txt")).expect("t5"), "TAM answer");
        assert_eq!(fs::read_to_string(dir.join("T6_sam.txt")).expect("t6"), "SAM answer");
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].latency_s, 1.23);
        assert_eq!(result.records[0].tokens, Some(42));

        let summary: serde_json::Value =
            serde_json::from_slice(&fs::read(&result.summary_path).expect("summary"))
                .expect("summary json");
        assert_eq!(summary[1]["turn"], "T6_sam");
        assert_eq!(summary[1]["model"], "llama3:8b");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn back_to_back_runs_keep_separate_summaries() {
        let root = scratch("two_summaries");
        let outputs = root.join("outputs");
        let client = ScriptedClient::new(&[("tam prompt", "TAM answer")]);
        let first = run_flow(&client, &prompts(), &["a".to_string()], &outputs).expect("first");
        let second = run_flow(&client, &prompts(), &["b".to_string()], &outputs).expect("second");
        assert_ne!(first.summary_path, second.summary_path);
        assert!(first.summary_path.exists() && second.summary_path.exists());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn failure_aborts_remaining_turns_but_keeps_written_files() {
        let root = scratch("abort");
        let mut client = ScriptedClient::new(&[("tam prompt", "TAM answer")]);
        client.failing_models = vec!["m".to_string()];
        client.fail_after = 1;
        let err = run_flow(&client, &prompts(), &["m".to_string()], &root.join("outputs"))
            .expect_err("second turn must fail");
        assert!(format!("{:#}", err).contains("T6_sam"), "{:#}", err);
        let dir = root.join("outputs").join("m");
        assert!(dir.join("T5_tam.txt").exists());
        assert!(!dir.join("T6_sam.txt").exists());
        let _ = fs::remove_dir_all(root);
    }
}
