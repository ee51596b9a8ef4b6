use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config_session.yaml";
pub const PROMPTS_FILE: &str = "prompts_pm.json";
pub const OUTPUTS_DIR: &str = "outputs";

/// Turns scored by the cross-model bake-off, in ranking order.
pub const BAKEOFF_TURNS: [&str; 3] = ["T5_tam", "T6_sam", "T7_som"];

/// Model identifiers such as `llama3:8b` become `llama3_8b` on disk.
pub fn model_dir_name(model: &str) -> String {
    model.replace(':', "_")
}

/// Root of one evaluation session and every path derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn current() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.root.join(PROMPTS_FILE)
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.root.join(OUTPUTS_DIR)
    }

    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.outputs_dir().join(model_dir_name(model))
    }

    pub fn response_path(&self, model: &str, turn: &str) -> PathBuf {
        self.model_dir(model).join(format!("{}.txt", turn))
    }

    pub fn synthetic_evals_csv(&self) -> PathBuf {
        self.outputs_dir().join("synthetic_evals.csv")
    }

    pub fn synthetic_evals_jsonl(&self) -> PathBuf {
        self.outputs_dir().join("synthetic_evals.jsonl")
    }

    pub fn bakeoff_summary_md(&self) -> PathBuf {
        self.outputs_dir().join("bakeoff_summary.md")
    }

    pub fn human_labels_jsonl(&self) -> PathBuf {
        self.outputs_dir().join("human_labels.jsonl")
    }

    pub fn traces_export_csv(&self) -> PathBuf {
        self.outputs_dir().join("traces_export.csv")
    }
}
