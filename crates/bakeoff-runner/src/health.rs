use anyhow::Result;
use bakeoff_core::{ensure_dir, load_config, load_prompts, Workspace, BAKEOFF_TURNS};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warn,
    Bad,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Bad => "bad",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub status: CheckStatus,
    pub message: String,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_str(), self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub checks: Vec<Check>,
}

impl HealthReport {
    fn push(&mut self, status: CheckStatus, message: impl Into<String>) {
        self.checks.push(Check {
            status,
            message: message.into(),
        });
    }

    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Bad)
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

/// Inspects a session root before anything is run. Content problems are
/// reported as checks; only filesystem errors while creating `outputs/`
/// are returned as errors.
pub fn health_check(ws: &Workspace, api_key_present: bool) -> Result<HealthReport> {
    let mut report = HealthReport::default();

    let outputs = ws.outputs_dir();
    if outputs.is_dir() {
        report.push(CheckStatus::Ok, format!("dir present: {}", outputs.display()));
    } else {
        ensure_dir(&outputs)?;
        report.push(CheckStatus::Ok, format!("created missing dir: {}", outputs.display()));
    }

    let config_path = ws.config_path();
    if config_path.exists() {
        report.push(CheckStatus::Ok, format!("found: {}", config_path.display()));
        match load_config(&config_path) {
            Ok(cfg) => {
                if cfg.models_to_test.is_empty() {
                    report.push(CheckStatus::Warn, "models to test: none defined");
                } else {
                    report.push(
                        CheckStatus::Ok,
                        format!("models to test: {}", cfg.models_to_test.join(", ")),
                    );
                }
                for key in cfg.product_context.missing_keys() {
                    report.push(
                        CheckStatus::Warn,
                        format!("missing product_context key: {}", key),
                    );
                }
                if !cfg.product_context.is_empty() {
                    report.push(CheckStatus::Ok, "product context present");
                }
            }
            Err(e) => report.push(CheckStatus::Bad, format!("config parse error: {}", e)),
        }
    } else {
        report.push(CheckStatus::Bad, format!("missing: {}", config_path.display()));
    }

    let prompts_path = ws.prompts_path();
    if prompts_path.exists() {
        report.push(CheckStatus::Ok, format!("found: {}", prompts_path.display()));
        match load_prompts(&prompts_path) {
            Ok(prompts) => {
                let missing = prompts.missing_turns(&BAKEOFF_TURNS);
                if missing.is_empty() {
                    report.push(CheckStatus::Ok, "prompts contain all TAM/SAM/SOM turns");
                } else {
                    report.push(
                        CheckStatus::Warn,
                        format!("missing turns: {}", missing.join(", ")),
                    );
                }
            }
            Err(e) => report.push(CheckStatus::Bad, format!("prompt file error: {}", e)),
        }
    } else {
        report.push(CheckStatus::Bad, format!("missing: {}", prompts_path.display()));
    }

    if api_key_present {
        report.push(CheckStatus::Ok, "OPENAI_API_KEY found in environment");
    } else {
        report.push(
            CheckStatus::Warn,
            "OPENAI_API_KEY not set; prompt runs will fail, scoring still works",
        );
    }

    Ok(report)
}
