use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use conveyor_engine::config::parser;
use conveyor_engine::orchestrator::run_status;
use conveyor_store::{RunStore, SqliteStore};

/// Execute the `status` command: look up one tracked run.
pub async fn execute(pipeline_path: &Path, run_id: i64) -> Result<()> {
    let config = parser::load_pipeline_config(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;

    let state_path = config
        .state
        .path
        .as_ref()
        .context("pipeline has no state.path; runs were not persisted")?;
    let store: Arc<dyn RunStore> = Arc::new(SqliteStore::open(state_path)?);

    let Some(run) = run_status(store, run_id).await? else {
        anyhow::bail!("run {run_id} not found in {}", state_path.display());
    };

    println!("Run {} of pipeline '{}'", run.run_id, run.pipeline);
    println!("  Status:        {}", run.status);
    println!("  Started at:    {}", run.started_at.to_rfc3339());
    if let Some(finished) = run.finished_at {
        println!("  Finished at:   {}", finished.to_rfc3339());
    }
    println!("  Extracted:     {}", run.counts.extracted);
    println!("  Transformed:   {}", run.counts.transformed);
    println!("  Dead-lettered: {}", run.counts.dead_lettered);
    println!("  Loaded:        {}", run.counts.loaded);
    println!("  Load failed:   {}", run.counts.load_failed);
    println!("  Errors:        {}", run.counts.errors);
    if let Some(message) = &run.error_message {
        println!("  Error:         {message}");
    }
    println!("{}", serde_json::to_string(&run)?);
    Ok(())
}
