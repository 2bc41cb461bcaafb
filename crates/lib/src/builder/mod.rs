//! In-process build execution.
//!
//! The driver walks the build graph in dependency post-order and executes
//! each build to completion before moving on. A failed build marks all its
//! transitive dependents as skipped (they are never attempted); unrelated
//! subtrees keep building. The store is never rolled back: a successful
//! build's `_install/<id>` persists across a sibling's failure.
//!
//! Per build, the staged install is populated under `_insttmp/<id>` and
//! committed with a single same-filesystem rename to `_install/<id>`, so an
//! interrupted build leaves no partially-populated install and a re-run
//! retries from scratch.

mod fsutil;
mod rewrite;

use std::collections::HashSet;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::build::{Build, BuildId, BuildSandbox};
use crate::config::BuildConfig;
use crate::consts::{BUILD_META_DIR, INSTALL_TREE_DIRS, STORE_BUILD_TREE, STORE_INSTALL_TREE, STORE_STAGE_TREE};
use crate::error::BuildError;
use crate::{env, findlib, graph};

pub use rewrite::rewrite_paths;

/// How a single build concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildOutcome {
  /// Commands ran and the install was finalized.
  Built,
  /// The finalized install already existed; nothing ran.
  Cached,
}

/// Result of driving a whole sandbox.
#[derive(Debug, Default)]
pub struct BuildReport {
  /// Builds whose commands ran and whose installs were finalized.
  pub built: Vec<BuildId>,

  /// Persistent builds satisfied by an existing `_install/<id>`.
  pub cached: Vec<BuildId>,

  /// Builds that failed, in post-order, with their errors.
  pub failed: Vec<(BuildId, BuildError)>,

  /// Builds skipped because a dependency failed; maps the skipped build to
  /// the direct dependency that was dead.
  pub skipped: Vec<(BuildId, BuildId)>,
}

impl BuildReport {
  /// True when every reachable build was built or served from the store.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  /// The first error encountered in post-order, if any.
  pub fn first_error(&self) -> Option<&BuildError> {
    self.failed.first().map(|(_, err)| err)
  }

  /// Total number of builds processed.
  pub fn total(&self) -> usize {
    self.built.len() + self.cached.len() + self.failed.len() + self.skipped.len()
  }
}

/// Build every reachable build of `sandbox`, dependencies first.
///
/// Validates the sandbox (manifest diagnostics, unresolved references,
/// cycles) before anything runs, then ensures the store skeletons exist and
/// executes the post-order sequentially.
pub async fn build(sandbox: &BuildSandbox, config: &BuildConfig) -> Result<BuildReport, BuildError> {
  graph::validate(sandbox)?;

  let order = graph::post_order_dfs(sandbox)?;

  // Compose every environment up front so export conflicts surface before
  // any command runs anywhere in the graph.
  for build in &order {
    env::compose(config, sandbox, *build)?;
  }

  init_store(config).await?;
  info!(builds = order.len(), "starting build");

  let mut report = BuildReport::default();
  let mut dead: HashSet<&BuildId> = HashSet::new();

  for build in order {
    if let Some(cause) = build.dependencies.iter().find(|dep| dead.contains(dep)) {
      warn!(id = %build.id, dependency = %cause, "skipping build: dependency failed");
      report.skipped.push((build.id.clone(), (*cause).clone()));
      dead.insert(&build.id);
      continue;
    }

    match perform_build(sandbox, config, build).await {
      Ok(BuildOutcome::Built) => report.built.push(build.id.clone()),
      Ok(BuildOutcome::Cached) => report.cached.push(build.id.clone()),
      Err(err) => {
        error!(id = %build.id, error = %err, "build failed");
        dead.insert(&build.id);
        report.failed.push((build.id.clone(), err));
      }
    }
  }

  info!(
    built = report.built.len(),
    cached = report.cached.len(),
    failed = report.failed.len(),
    skipped = report.skipped.len(),
    "build finished"
  );

  Ok(report)
}

/// Create the `_build`, `_insttmp` and `_install` skeletons under both the
/// shared store and the sandbox-local store.
async fn init_store(config: &BuildConfig) -> Result<(), BuildError> {
  for base in [config.store_path.clone(), config.sandbox_store_path()] {
    for tree in [STORE_BUILD_TREE, STORE_STAGE_TREE, STORE_INSTALL_TREE] {
      let path = base.join(tree);
      tokio::fs::create_dir_all(&path)
        .await
        .map_err(|err| BuildError::io(&path, err))?;
    }
  }
  Ok(())
}

/// Execute one build to completion.
async fn perform_build(
  sandbox: &BuildSandbox,
  config: &BuildConfig,
  build: &Build,
) -> Result<BuildOutcome, BuildError> {
  let final_install = config.final_install_path(build);

  // An existing finalized install is the cache marker for persistent
  // builds; dev builds are always rebuilt.
  if build.should_be_persisted && is_dir(&final_install).await {
    debug!(id = %build.id, "install already in store");
    return Ok(BuildOutcome::Cached);
  }

  info!(id = %build.id, name = %build.spec_label(), "building");

  let build_tree = config.build_path(build);
  let install_tree = config.install_path(build);

  fsutil::remove_if_exists(&final_install).await?;
  fsutil::remove_if_exists(&install_tree).await?;
  fsutil::remove_if_exists(&build_tree).await?;

  let meta_dir = build_tree.join(BUILD_META_DIR);
  tokio::fs::create_dir_all(&meta_dir)
    .await
    .map_err(|err| BuildError::io(&meta_dir, err))?;
  for dir in INSTALL_TREE_DIRS {
    let path = install_tree.join(dir);
    tokio::fs::create_dir_all(&path)
      .await
      .map_err(|err| BuildError::io(&path, err))?;
  }

  if build.mutates_source_path {
    debug!(id = %build.id, "staging sources into the build tree");
    fsutil::mirror_dir(&config.source_path(build), &build_tree)?;
  }

  let environment = env::compose(config, sandbox, build)?;
  let env_file = meta_dir.join("env");
  tokio::fs::write(&env_file, environment.render())
    .await
    .map_err(|err| BuildError::io(&env_file, err))?;

  let findlib_file = meta_dir.join("findlib.conf");
  tokio::fs::write(&findlib_file, findlib::findlib_conf(config, sandbox, build)?)
    .await
    .map_err(|err| BuildError::io(&findlib_file, err))?;

  run_commands(config, build, &environment, &env_file).await?;

  let rewritten = rewrite_paths(&install_tree, &install_tree, &final_install)?;
  debug!(id = %build.id, files = rewritten, "staging prefix rewritten");

  // Commit point. No suspension between the rename and returning.
  tokio::fs::rename(&install_tree, &final_install)
    .await
    .map_err(|err| BuildError::io(&install_tree, err))?;

  Ok(BuildOutcome::Built)
}

/// Run the build commands sequentially in a shell rooted at the build's
/// working directory, sourcing the rendered environment first. The composed
/// environment is merged over the process environment; composed values win.
async fn run_commands(
  config: &BuildConfig,
  build: &Build,
  environment: &env::Environment,
  env_file: &Path,
) -> Result<(), BuildError> {
  let cwd = config.root_path(build);
  let vars = environment.vars();

  for (index, command) in build.command.iter().enumerate() {
    debug!(id = %build.id, index, command = %command, "running command");

    let script = format!("source \"{}\" && {}", env_file.display(), command);
    let output = Command::new("/bin/bash")
      .arg("-c")
      .arg(&script)
      .current_dir(&cwd)
      .envs(vars.iter().map(|(name, value)| (name.as_str(), value.as_str())))
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|err| BuildError::io(&cwd, err))?;

    if !output.status.success() {
      return Err(BuildError::CommandFailed {
        id: build.id.clone(),
        index,
        code: output.status.code(),
        stderr: stderr_tail(&output.stderr),
      });
    }
  }

  Ok(())
}

async fn is_dir(path: &Path) -> bool {
  tokio::fs::metadata(path).await.map(|meta| meta.is_dir()).unwrap_or(false)
}

/// Last part of a command's stderr, bounded so reports stay readable.
fn stderr_tail(bytes: &[u8]) -> String {
  const MAX: usize = 2048;
  let text = String::from_utf8_lossy(bytes);
  if text.len() <= MAX {
    return text.into_owned();
  }
  let mut start = text.len() - MAX;
  while !text.is_char_boundary(start) {
    start += 1;
  }
  format!("…{}", &text[start..])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stderr_tail_keeps_short_output() {
    assert_eq!(stderr_tail(b"configure: error"), "configure: error");
  }

  #[test]
  fn stderr_tail_bounds_long_output() {
    let long = "x".repeat(10_000);
    let tail = stderr_tail(long.as_bytes());
    assert!(tail.len() <= 2056);
    assert!(tail.starts_with('…'));
  }

  #[test]
  fn report_success_requires_no_failures_or_skips() {
    let mut report = BuildReport::default();
    report.built.push(BuildId::from("a"));
    report.cached.push(BuildId::from("b"));
    assert!(report.is_success());
    assert_eq!(report.total(), 2);

    report.skipped.push((BuildId::from("c"), BuildId::from("a")));
    assert!(!report.is_success());
    assert_eq!(report.total(), 3);
  }
}
