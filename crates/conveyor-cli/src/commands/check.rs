use std::path::Path;

use anyhow::{Context, Result};

use conveyor_engine::config::{parser, validator};
use conveyor_engine::extract::build_extractors;
use conveyor_store::SqliteStore;

/// Execute the `check` command: validate config, probe each source and
/// the destination store.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let config = parser::load_pipeline_config(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;
    validator::validate_config(&config)?;
    println!("Config OK: {} ({} sources)", config.pipeline, config.enabled_sources().len());

    let mut failures = 0usize;
    for extractor in build_extractors(&config)? {
        match extractor.check().await {
            Ok(()) => println!("  source '{}' ({}): OK", extractor.name(), extractor.kind()),
            Err(e) => {
                failures += 1;
                println!("  source '{}' ({}): FAILED: {e}", extractor.name(), extractor.kind());
            }
        }
    }

    match SqliteStore::open(&config.destination.path) {
        Ok(_) => println!("  destination '{}': OK", config.destination.path.display()),
        Err(e) => {
            failures += 1;
            println!(
                "  destination '{}': FAILED: {e}",
                config.destination.path.display()
            );
        }
    }

    if let Some(state_path) = &config.state.path {
        match SqliteStore::open(state_path) {
            Ok(_) => println!("  state '{}': OK", state_path.display()),
            Err(e) => {
                failures += 1;
                println!("  state '{}': FAILED: {e}", state_path.display());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} check(s) failed");
    }
    println!("All checks passed.");
    Ok(())
}
