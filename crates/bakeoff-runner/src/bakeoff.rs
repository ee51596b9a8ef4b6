use anyhow::Result;
use bakeoff_analysis::{max_total, rank, score_bakeoff, write_summary, BakeoffRow, Standing};
use bakeoff_core::{PromptSet, SessionConfig, Workspace, BAKEOFF_TURNS};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::client::ModelClient;
use crate::flow::{require_models, run_flow};

#[derive(Debug)]
pub struct BakeoffOutcome {
    pub ok_models: Vec<String>,
    pub failed_models: Vec<(String, String)>,
    pub rows: Vec<BakeoffRow>,
    pub standings: Vec<Standing>,
    pub max_total: u32,
    pub summary_path: PathBuf,
}

/// Runs the TAM/SAM/SOM turns for each configured model, then scores and
/// ranks every model. One model failing does not stop the others; it is
/// marked `failed` even if some of its turns were written.
pub fn run_bakeoff(
    ws: &Workspace,
    config: &SessionConfig,
    prompts: &PromptSet,
    client: &dyn ModelClient,
) -> Result<BakeoffOutcome> {
    let models = require_models(config, &ws.config_path())?;
    let subset = prompts.subset(&BAKEOFF_TURNS);
    let missing = prompts.missing_turns(&BAKEOFF_TURNS);
    if !missing.is_empty() {
        warn!(?missing, "prompt file lacks bake-off turns; they will score zero");
    }

    info!(models = ?models, "running bake-off");
    let mut ok_models = Vec::new();
    let mut failed_models = Vec::new();
    for model in models {
        match run_flow(client, &subset, std::slice::from_ref(model), &ws.outputs_dir()) {
            Ok(_) => ok_models.push(model.clone()),
            Err(err) => {
                warn!(model = %model, error = %format!("{:#}", err), "model failed");
                failed_models.push((model.clone(), format!("{:#}", err)));
            }
        }
    }

    let rows = score_bakeoff(ws, models, &BAKEOFF_TURNS)?;
    let standings = rank(&rows, |m| failed_models.iter().any(|(f, _)| f == m));
    let max = max_total(&BAKEOFF_TURNS);
    let summary_path = ws.bakeoff_summary_md();
    write_summary(&summary_path, &standings, max)?;

    Ok(BakeoffOutcome {
        ok_models,
        failed_models,
        rows,
        standings,
        max_total: max,
        summary_path,
    })
}
