mod build;
mod build_env;
mod eject;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use esy_lib::build::BuildSandbox;
use esy_lib::config::BuildConfig;

pub use build::cmd_build;
pub use build_env::cmd_build_env;
pub use eject::cmd_eject;

/// Load a sandbox plan: the serialized `BuildSandbox` produced by a manifest
/// front-end.
fn load_plan(path: &Path) -> Result<BuildSandbox> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("failed to read sandbox plan {}", path.display()))?;
  serde_json::from_str(&content).with_context(|| format!("failed to parse sandbox plan {}", path.display()))
}

/// Resolve store and sandbox roots: explicit flags win, then `~/.esy` for
/// the store and the plan's directory for the sandbox.
fn resolve_config(plan: &Path, store_path: Option<PathBuf>, sandbox_path: Option<PathBuf>) -> Result<BuildConfig> {
  let store_path = match store_path {
    Some(path) => path,
    None => dirs::home_dir().context("cannot determine the home directory")?.join(".esy"),
  };

  let sandbox_path = match sandbox_path {
    Some(path) => path,
    None => {
      let plan = plan
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", plan.display()))?;
      plan.parent().context("sandbox plan has no parent directory")?.to_path_buf()
    }
  };

  Ok(BuildConfig::new(store_path, sandbox_path))
}
