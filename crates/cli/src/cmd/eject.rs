//! Implementation of the `esy eject` command.

use std::path::Path;

use anyhow::{Context, Result};

use esy_lib::eject;

use crate::output;

/// Emit the Make-based script set for the plan into `output_dir`.
pub fn cmd_eject(plan: &Path, output_dir: &Path) -> Result<()> {
  let sandbox = super::load_plan(plan)?;

  let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
  rt.block_on(eject::eject(&sandbox, output_dir))?;

  output::print_success(&format!("ejected build scripts to {}", output_dir.display()));
  println!();
  println!("To build on another machine:");
  println!("  cd {} && make build", output_dir.display());
  Ok(())
}
