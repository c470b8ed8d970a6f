use std::path::Path;

use anyhow::{Context, Result};

use conveyor_engine::config::{parser, validator};
use conveyor_engine::orchestrator::{run_pipeline, RunOptions};
use conveyor_types::run::RunStatus;

/// Execute the `run` command: parse, validate, and run a pipeline.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let config = parser::load_pipeline_config(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;
    validator::validate_config(&config)?;

    tracing::info!(
        pipeline = %config.pipeline,
        sources = config.enabled_sources().len(),
        destination = %config.destination.path.display(),
        "Pipeline validated"
    );

    let options = RunOptions::from_config(&config)?;
    let run = run_pipeline(&config, &options)
        .await
        .map_err(|e| anyhow::anyhow!("pipeline run failed: {e}"))?;

    println!("Pipeline '{}' finished: {}", config.pipeline, run.status);
    println!("  Run id:        {}", run.run_id);
    println!("  Extracted:     {}", run.counts.extracted);
    println!("  Transformed:   {}", run.counts.transformed);
    println!("  Dead-lettered: {}", run.counts.dead_lettered);
    println!("  Loaded:        {}", run.counts.loaded);
    println!("  Load failed:   {}", run.counts.load_failed);
    println!("  Errors:        {}", run.counts.errors);
    if let Some(secs) = run.duration_secs() {
        println!("  Duration:      {secs:.2}s");
    }
    if let Some(message) = &run.error_message {
        println!("  Error:         {message}");
    }

    // Machine-readable trailer for schedulers wrapping this binary.
    println!("{}", serde_json::to_string(&run)?);

    if run.status == RunStatus::Failed {
        anyhow::bail!("run {} failed", run.run_id);
    }
    Ok(())
}
