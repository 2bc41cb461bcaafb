//! The ejecting builder.
//!
//! Re-expresses the in-process build protocol as a portable script set: a
//! Make-based driver plus per-package environment files and a handful of
//! bundled helpers. The emitted tree is self-contained; `make build` on the
//! target machine reproduces the in-process builder's store layout with
//! `ESY_EJECT__STORE`/`ESY_EJECT__SANDBOX` resolved there instead of here.

mod shell;

use std::path::Path;

use tracing::{debug, info};

use crate::build::{Build, BuildSandbox};
use crate::config::BuildConfig;
use crate::consts::{
  EJECT_ROOT_VAR, EJECT_SANDBOX_VAR, EJECT_STORE_VAR, SANDBOX_STORE_PATH, STORE_BUILD_TREE, STORE_INSTALL_TREE,
  STORE_STAGE_TREE,
};
use crate::error::BuildError;
use crate::makefile::{self, DefineBody, MakeDefine, MakeItem, MakeRule};
use crate::{env, findlib, graph};

pub use shell::normalize_name;

/// Emit the build script set for `sandbox` into `output_path`.
pub async fn eject(sandbox: &BuildSandbox, output_path: &Path) -> Result<(), BuildError> {
  graph::validate(sandbox)?;
  let config = BuildConfig::for_eject();

  info!(output = %output_path.display(), "ejecting build scripts");

  write_helpers(output_path).await?;

  // Emission order is not load-bearing; BFS keeps it stable.
  for build in graph::bfs(sandbox)? {
    write_build_files(&config, sandbox, build, output_path).await?;
  }

  let makefile_text = makefile::render(&makefile_items(&config, sandbox)?);
  write_file(&output_path.join("Makefile"), &makefile_text, false).await?;

  Ok(())
}

/// Bundled helpers under `bin/`.
async fn write_helpers(output_path: &Path) -> Result<(), BuildError> {
  let bin = output_path.join("bin");
  tokio::fs::create_dir_all(&bin)
    .await
    .map_err(|err| BuildError::io(&bin, err))?;

  write_file(&bin.join("realpath.c"), shell::REALPATH_C, false).await?;
  write_file(&bin.join("runtime.sh"), shell::RUNTIME_SH, true).await?;
  write_file(&bin.join("render-env"), shell::RENDER_ENV_SH, true).await?;
  write_file(&bin.join("replace-string"), shell::REPLACE_STRING_SH, true).await?;
  Ok(())
}

/// Per-build files, placed under the path derived from the build's source
/// tree so the ejected layout mirrors the sandbox.
async fn write_build_files(
  config: &BuildConfig,
  sandbox: &BuildSandbox,
  build: &Build,
  output_path: &Path,
) -> Result<(), BuildError> {
  let dir = output_path.join(&build.source_path);
  tokio::fs::create_dir_all(&dir)
    .await
    .map_err(|err| BuildError::io(&dir, err))?;

  debug!(id = %build.id, dir = %dir.display(), "emitting build files");

  let environment = env::compose(config, sandbox, build)?;
  write_file(&dir.join("eject-env"), &environment.render(), false).await?;
  write_file(
    &dir.join("findlib.conf.in"),
    &findlib::findlib_conf(config, sandbox, build)?,
    false,
  )
  .await?;
  write_file(&dir.join("sandbox.sb.in"), &sandbox_profile(config, build), false).await?;
  Ok(())
}

/// macOS sandbox-exec profile: deny all writes except the build's own trees
/// and scratch space. Placeholder paths are resolved by `render-env` on the
/// target machine.
fn sandbox_profile(config: &BuildConfig, build: &Build) -> String {
  let root = config.root_path(build);
  let build_tree = config.build_path(build);
  let install = config.install_path(build);

  format!(
    "(version 1)\n\
     (allow default)\n\
     \n\
     (deny file-write*\n\
     \x20 (subpath \"/\"))\n\
     \n\
     (allow file-write*\n\
     \x20 (literal \"/dev/null\")\n\
     \x20 (subpath \"$TMPDIR\")\n\
     \x20 (subpath \"$TMPDIR_GLOBAL\")\n\
     \x20 (subpath \"{root}\")\n\
     \x20 (subpath \"{build_tree}\")\n\
     \x20 (subpath \"{install}\"))\n\
     \n\
     (deny file-write*\n\
     \x20 (subpath \"{root}/node_modules\"))\n",
    root = root.display(),
    build_tree = build_tree.display(),
    install = install.display(),
  )
}

/// Assemble the Makefile item list.
fn makefile_items(config: &BuildConfig, sandbox: &BuildSandbox) -> Result<Vec<MakeItem>, BuildError> {
  let root = sandbox
    .root_build()
    .ok_or_else(|| crate::graph::GraphError::MissingRoot(sandbox.root.clone()))?;
  let root_name = normalize_name(&root.name);

  let mut items = vec![
    MakeItem::Raw("# Generated by esy. Do not edit.".to_string()),
    MakeItem::Raw(String::new()),
    MakeItem::Raw("SHELL := env -i /bin/bash --norc --noprofile".to_string()),
    MakeItem::Raw(String::new()),
    MakeItem::Raw(format!(
      "{EJECT_ROOT_VAR} := $(realpath $(dir $(lastword $(MAKEFILE_LIST))))"
    )),
    MakeItem::Raw(format!("{EJECT_STORE_VAR} ?= $(HOME)/.esy")),
    MakeItem::Raw(format!("{EJECT_SANDBOX_VAR} ?= $(CURDIR)")),
    MakeItem::Raw(String::new()),
    MakeItem::Rule(MakeRule::new("build").phony().dep(format!("{root_name}.build"))),
    MakeItem::Rule(MakeRule::new("build-shell").phony().dep(format!("{root_name}.shell"))),
    MakeItem::Rule(MakeRule::new("clean").phony().dep(format!("{root_name}.clean"))),
    MakeItem::Rule(store_rule()),
    MakeItem::Rule(
      MakeRule::new("esy-root").phony().command(format!(
        "@test -x $({EJECT_ROOT_VAR})/bin/realpath || \
         cc -o $({EJECT_ROOT_VAR})/bin/realpath $({EJECT_ROOT_VAR})/bin/realpath.c"
      )),
    ),
  ];

  for build in graph::bfs(sandbox)? {
    items.push(MakeItem::Define(shell_env_define(config, build)));
    items.extend(build_rules(sandbox, build)?);
  }

  Ok(items)
}

/// `esy-store`: the skeletons of both stores.
fn store_rule() -> MakeRule {
  let mut dirs = Vec::new();
  for tree in [STORE_BUILD_TREE, STORE_STAGE_TREE, STORE_INSTALL_TREE] {
    dirs.push(format!("$({EJECT_STORE_VAR})/{tree}"));
  }
  for tree in [STORE_BUILD_TREE, STORE_STAGE_TREE, STORE_INSTALL_TREE] {
    dirs.push(format!("$({EJECT_SANDBOX_VAR})/{SANDBOX_STORE_PATH}/{tree}"));
  }
  MakeRule::new("esy-store").phony().command(format!("@mkdir -p {}", dirs.join(" ")))
}

/// The `shell_env_for__<name>` define: builtin globals, then the per-build
/// eject-env, then the `esy_build__*` family describing the build to the
/// shell runtime.
fn shell_env_define(config: &BuildConfig, build: &Build) -> MakeDefine {
  let eject_dir = eject_dir_ref(build);
  let command = if build.command.is_empty() {
    "true".to_string()
  } else {
    shell_escape(&build.command.join(" && "))
  };
  let build_type = if build.mutates_source_path { "in-source" } else { "out-of-source" };

  MakeDefine {
    name: format!("shell_env_for__{}", normalize_name(&build.name)),
    body: vec![
      DefineBody::Env(vec![
        ("CI".to_string(), std::env::var("CI").ok()),
        ("TMPDIR".to_string(), Some("$(TMPDIR)".to_string())),
        (EJECT_STORE_VAR.to_string(), Some(format!("$({EJECT_STORE_VAR})"))),
        (EJECT_SANDBOX_VAR.to_string(), Some(format!("$({EJECT_SANDBOX_VAR})"))),
        (EJECT_ROOT_VAR.to_string(), Some(format!("$({EJECT_ROOT_VAR})"))),
      ]),
      DefineBody::Raw(format!("source \"{eject_dir}/eject-env\"; \\")),
      DefineBody::Env(vec![
        ("esy_build__eject".to_string(), Some(eject_dir)),
        ("esy_build__type".to_string(), Some(build_type.to_string())),
        ("esy_build__key".to_string(), Some(build.id.0.clone())),
        ("esy_build__command".to_string(), Some(command)),
        (
          "esy_build__source_root".to_string(),
          Some(make_ref(&config.source_path(build))),
        ),
        (
          "esy_build__install".to_string(),
          Some(make_ref(&config.final_install_path(build))),
        ),
      ]),
    ],
  }
}

/// The three per-build targets.
///
/// The define reference and the runtime invocation share one recipe line:
/// the define's trailing backslashes join everything into a single shell, so
/// the exports are visible to the runtime.
fn build_rules(sandbox: &BuildSandbox, build: &Build) -> Result<Vec<MakeItem>, BuildError> {
  let name = normalize_name(&build.name);
  let runtime = format!("$({EJECT_ROOT_VAR})/bin/runtime.sh");
  let recipe = |verb: &str| format!("@$(shell_env_for__{name}) {runtime} {verb}");

  let mut dep_targets = vec!["esy-store".to_string(), "esy-root".to_string()];
  for dep_id in &build.dependencies {
    let dep = sandbox.get(dep_id).ok_or_else(|| {
      BuildError::Graph(crate::graph::GraphError::UnresolvedReference {
        from: build.id.clone(),
        missing: dep_id.clone(),
      })
    })?;
    dep_targets.push(format!("{}.build", normalize_name(&dep.name)));
  }

  Ok(vec![
    MakeItem::Rule(
      MakeRule::new(format!("{name}.build"))
        .phony()
        .deps(dep_targets.clone())
        .command(recipe("esy-build")),
    ),
    MakeItem::Rule(
      MakeRule::new(format!("{name}.shell"))
        .phony()
        .deps(dep_targets)
        .command(recipe("esy-shell")),
    ),
    MakeItem::Rule(MakeRule::new(format!("{name}.clean")).phony().command(recipe("esy-clean"))),
  ])
}

/// Make-variable reference to the build's ejected directory.
fn eject_dir_ref(build: &Build) -> String {
  let rel = build.source_path.display().to_string();
  if rel.is_empty() {
    format!("$({EJECT_ROOT_VAR})")
  } else {
    format!("$({EJECT_ROOT_VAR})/{rel}")
  }
}

/// Convert placeholder-form paths (`$ESY_EJECT__STORE/…`) into Make variable
/// references so overrides apply at Make-time.
fn make_ref(path: &Path) -> String {
  path
    .display()
    .to_string()
    .replace(&format!("${EJECT_STORE_VAR}"), &format!("$({EJECT_STORE_VAR})"))
    .replace(&format!("${EJECT_SANDBOX_VAR}"), &format!("$({EJECT_SANDBOX_VAR})"))
    .replace(&format!("${EJECT_ROOT_VAR}"), &format!("$({EJECT_ROOT_VAR})"))
}

/// Escape `$` for embedding shell text into Makefile values: `$cur__install`
/// must reach the shell, not Make's expansion.
fn shell_escape(text: &str) -> String {
  text.replace('$', "$$")
}

async fn write_file(path: &Path, content: &str, executable: bool) -> Result<(), BuildError> {
  tokio::fs::write(path, content)
    .await
    .map_err(|err| BuildError::io(path, err))?;
  if executable {
    set_executable(path)?;
  }
  Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), BuildError> {
  use std::os::unix::fs::PermissionsExt;
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|err| BuildError::io(path, err))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), BuildError> {
  Ok(())
}
