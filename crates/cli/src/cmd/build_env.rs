//! Implementation of the `esy build-env` command.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use esy_lib::build::BuildId;
use esy_lib::env;

/// Print the composed environment rendering for a build (root by default).
pub fn cmd_build_env(
  plan: &Path,
  build: Option<&str>,
  store_path: Option<PathBuf>,
  sandbox_path: Option<PathBuf>,
) -> Result<()> {
  let sandbox = super::load_plan(plan)?;
  let config = super::resolve_config(plan, store_path, sandbox_path)?;

  let build = match build {
    Some(id) => sandbox
      .get(&BuildId(id.to_string()))
      .ok_or_else(|| anyhow!("no build with id {id} in the sandbox plan"))?,
    None => sandbox
      .root_build()
      .ok_or_else(|| anyhow!("sandbox root build {} is not defined", sandbox.root))?,
  };

  let environment = env::compose(&config, &sandbox, build)?;
  print!("{}", environment.render());
  Ok(())
}
