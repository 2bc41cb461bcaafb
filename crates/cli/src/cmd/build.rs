//! Implementation of the `esy build` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use esy_lib::builder;

use crate::output;

/// Build every package of the plan, dependencies first, and print a summary.
pub fn cmd_build(plan: &Path, store_path: Option<PathBuf>, sandbox_path: Option<PathBuf>) -> Result<()> {
  let sandbox = super::load_plan(plan)?;
  let config = super::resolve_config(plan, store_path, sandbox_path)?;

  output::print_status(&format!("building {}", plan.display()));

  let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
  let report = rt.block_on(builder::build(&sandbox, &config))?;

  println!();
  println!("Build complete!");
  println!("  Built:   {}", report.built.len());
  println!("  Cached:  {}", report.cached.len());
  println!("  Failed:  {}", report.failed.len());
  println!("  Skipped: {}", report.skipped.len());

  if !report.is_success() {
    for (id, err) in &report.failed {
      output::print_error(&format!("{id}: {err}"));
    }
    for (id, cause) in &report.skipped {
      output::print_error(&format!("{id}: skipped, dependency {cause} failed"));
    }
    return Err(anyhow!("{} of {} builds failed", report.failed.len(), report.total()));
  }

  output::print_success(&format!("store is up to date at {}", config.store_path.display()));
  Ok(())
}
