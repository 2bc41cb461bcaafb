//! Build environment composition.
//!
//! Every build runs inside an environment composed from four ordered group
//! families: the builder's own globals, the sandbox-wide env, one group per
//! transitive dependency (deepest first) and finally the build's own local
//! environment. Groups keep their provenance so exclusive and builtin
//! violations can name both contributors.
//!
//! PATH-like variables (`PATH`, `MANPATH`, `OCAMLPATH`,
//! `CAML_LD_LIBRARY_PATH`) accumulate by shell convention: exporters write
//! values of the form `<entry>:$PATH` and the composer guarantees only the
//! order, so sourcing the rendering prepends deeper dependencies first.

use std::collections::HashMap;

use thiserror::Error;

use crate::build::{Build, BuildId, BuildSandbox, ExportScope};
use crate::config::BuildConfig;
use crate::consts::{EJECT_ROOT_VAR, EJECT_SANDBOX_VAR, EJECT_STORE_VAR, INSTALL_TREE_DIRS};
use crate::error::BuildError;
use crate::graph;

/// Errors raised while composing an environment. No command runs once
/// composition has failed.
#[derive(Debug, Error)]
pub enum EnvError {
  /// Two same-scope exports of one name where either is exclusive.
  #[error("export conflict for {name}: exported by both {first} and {second}")]
  ExportConflict { name: String, first: String, second: String },

  /// A package export collides with a variable the builder owns.
  #[error("{contributor} may not export {name}: the variable is owned by the builder")]
  BuiltinOverride { name: String, contributor: String },
}

/// One composed environment variable, with the flags that drove its
/// admission.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvBinding {
  pub name: String,
  /// `None` bindings are carried for provenance but render as nothing.
  pub value: Option<String>,
  pub scope: ExportScope,
  pub exclusive: bool,
  pub builtin: bool,
}

/// An ordered group of bindings from a single contributor.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvGroup {
  /// Human-readable contributor label, used in conflict reports.
  pub name: String,
  /// The build that contributed the group, when one did.
  pub origin: Option<BuildId>,
  pub bindings: Vec<EnvBinding>,
}

/// A fully composed build environment: ordered groups of ordered bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
  pub groups: Vec<EnvGroup>,
}

impl Environment {
  /// Render to POSIX-shell-sourceable text: one `export NAME="VALUE";` line
  /// per non-null binding, in composition order.
  ///
  /// Values are wrapped in double quotes without further escaping so that
  /// `$cur__*` and PATH-style references expand when sourced. This matches
  /// the envs already in stores; values containing `"` are unsupported.
  pub fn render(&self) -> String {
    let mut out = String::new();
    for group in &self.groups {
      for binding in &group.bindings {
        if let Some(value) = &binding.value {
          out.push_str(&format!("export {}=\"{}\";\n", binding.name, value));
        }
      }
    }
    out
  }

  /// Flatten to ordered `(name, value)` pairs for a subprocess environment.
  /// Later groups win on name collision, matching shell source order.
  pub fn vars(&self) -> Vec<(String, String)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<(String, String)> = Vec::new();
    for group in &self.groups {
      for binding in &group.bindings {
        if let Some(value) = &binding.value {
          match index.get(&binding.name) {
            Some(&at) => out[at].1 = value.clone(),
            None => {
              index.insert(binding.name.clone(), out.len());
              out.push((binding.name.clone(), value.clone()));
            }
          }
        }
      }
    }
    out
  }
}

/// Compose the environment for `build` within `sandbox`.
///
/// Group order: builtin globals, sandbox env, one group per transitive
/// dependency in DFS post-order (deduplicated by id, global exports only),
/// then the build's own group (`cur__*` builtins followed by its local
/// exports).
pub fn compose(config: &BuildConfig, sandbox: &BuildSandbox, build: &Build) -> Result<Environment, BuildError> {
  let mut composer = Composer::default();

  composer.add_group(builtin_globals(config))?;
  composer.add_group(sandbox_group(sandbox))?;

  for dep in graph::dependencies_post_order(sandbox, build)? {
    composer.add_group(dependency_group(config, dep)?)?;
  }

  composer.add_group(self_group(config, build)?)?;

  Ok(composer.finish())
}

/// Incremental group admission with conflict tracking.
#[derive(Default)]
struct Composer {
  groups: Vec<EnvGroup>,
  claims: HashMap<String, Claim>,
}

struct Claim {
  contributor: String,
  scope: ExportScope,
  exclusive: bool,
  builtin: bool,
}

impl Composer {
  fn add_group(&mut self, group: EnvGroup) -> Result<(), EnvError> {
    for binding in &group.bindings {
      if let Some(prev) = self.claims.get(&binding.name) {
        if prev.builtin && !binding.builtin {
          return Err(EnvError::BuiltinOverride {
            name: binding.name.clone(),
            contributor: group.name.clone(),
          });
        }
        if !prev.builtin && binding.builtin {
          return Err(EnvError::BuiltinOverride {
            name: binding.name.clone(),
            contributor: prev.contributor.clone(),
          });
        }
        if prev.scope == binding.scope && (prev.exclusive || binding.exclusive) {
          return Err(EnvError::ExportConflict {
            name: binding.name.clone(),
            first: prev.contributor.clone(),
            second: group.name.clone(),
          });
        }
      }
      self.claims.insert(
        binding.name.clone(),
        Claim {
          contributor: group.name.clone(),
          scope: binding.scope,
          exclusive: binding.exclusive,
          builtin: binding.builtin,
        },
      );
    }
    self.groups.push(group);
    Ok(())
  }

  fn finish(self) -> Environment {
    Environment { groups: self.groups }
  }
}

fn builtin(name: &str, value: Option<String>, scope: ExportScope) -> EnvBinding {
  EnvBinding {
    name: name.to_string(),
    value,
    scope,
    exclusive: true,
    builtin: true,
  }
}

/// Group 1: variables the builder itself owns.
fn builtin_globals(config: &BuildConfig) -> EnvGroup {
  // TMPDIR passes through from the host in-process; ejected scripts resolve
  // it on the target machine instead.
  let tmpdir = if config.is_eject() {
    "$TMPDIR".to_string()
  } else {
    std::env::var("TMPDIR").unwrap_or_else(|_| "/tmp".to_string())
  };

  EnvGroup {
    name: "built-in environment".to_string(),
    origin: None,
    bindings: vec![
      builtin("CI", std::env::var("CI").ok(), ExportScope::Global),
      builtin("TMPDIR", Some(tmpdir), ExportScope::Global),
      builtin(
        EJECT_STORE_VAR,
        Some(config.store_path.display().to_string()),
        ExportScope::Global,
      ),
      builtin(
        EJECT_SANDBOX_VAR,
        Some(config.sandbox_path.display().to_string()),
        ExportScope::Global,
      ),
      builtin(
        EJECT_ROOT_VAR,
        Some(config.eject_root().display().to_string()),
        ExportScope::Global,
      ),
    ],
  }
}

/// Group 2: the caller-supplied sandbox env, verbatim.
fn sandbox_group(sandbox: &BuildSandbox) -> EnvGroup {
  EnvGroup {
    name: "sandbox environment".to_string(),
    origin: None,
    bindings: sandbox
      .env
      .iter()
      .map(|var| EnvBinding {
        name: var.name.clone(),
        value: var.value.clone(),
        scope: ExportScope::Global,
        exclusive: false,
        builtin: false,
      })
      .collect(),
  }
}

/// Group per dependency: its global exports, with `$cur__*` placeholders
/// expanded against the dependency's own paths.
fn dependency_group(config: &BuildConfig, dep: &Build) -> Result<EnvGroup, EnvError> {
  let label = dep.spec_label();
  let vars = dependency_vars(config, dep);

  let mut bindings = Vec::new();
  for (name, spec) in &dep.exported_env {
    if spec.builtin {
      return Err(EnvError::BuiltinOverride {
        name: name.clone(),
        contributor: label.clone(),
      });
    }
    if spec.scope != ExportScope::Global {
      continue;
    }
    bindings.push(EnvBinding {
      name: name.clone(),
      value: spec.value.as_deref().map(|value| expand_cur(value, &vars)),
      scope: ExportScope::Global,
      exclusive: spec.exclusive,
      builtin: false,
    });
  }

  Ok(EnvGroup {
    name: label,
    origin: Some(dep.id.clone()),
    bindings,
  })
}

/// The build's own group: builder-owned `cur__*` variables first (so local
/// exports can reference them when sourced), then its local exports with
/// `$cur__*` expanded against the build itself.
fn self_group(config: &BuildConfig, build: &Build) -> Result<EnvGroup, EnvError> {
  let label = build.spec_label();
  let vars = self_vars(config, build);

  let mut bindings: Vec<EnvBinding> = vars
    .iter()
    .map(|(name, value)| builtin(name, Some(value.clone()), ExportScope::Local))
    .collect();

  for (name, spec) in &build.exported_env {
    if spec.builtin {
      return Err(EnvError::BuiltinOverride {
        name: name.clone(),
        contributor: label.clone(),
      });
    }
    if spec.scope != ExportScope::Local {
      continue;
    }
    bindings.push(EnvBinding {
      name: name.clone(),
      value: spec.value.as_deref().map(|value| expand_cur(value, &vars)),
      scope: ExportScope::Local,
      exclusive: spec.exclusive,
      builtin: false,
    });
  }

  Ok(EnvGroup {
    name: label,
    origin: Some(build.id.clone()),
    bindings,
  })
}

/// `cur__*` values seen by consumers of `dep`: the install is the finalized
/// one.
fn dependency_vars(config: &BuildConfig, dep: &Build) -> Vec<(String, String)> {
  vec![
    ("cur__name".to_string(), dep.name.clone()),
    ("cur__version".to_string(), dep.version.clone()),
    ("cur__root".to_string(), config.root_path(dep).display().to_string()),
    (
      "cur__original_root".to_string(),
      config.source_path(dep).display().to_string(),
    ),
    ("cur__target_dir".to_string(), config.build_path(dep).display().to_string()),
    (
      "cur__install".to_string(),
      config.final_install_path(dep).display().to_string(),
    ),
  ]
}

/// `cur__*` values seen by the build itself: the install is the staging
/// tree, and the install subtrees get individual variables.
fn self_vars(config: &BuildConfig, build: &Build) -> Vec<(String, String)> {
  let install = config.install_path(build);
  let mut vars = vec![
    ("cur__name".to_string(), build.name.clone()),
    ("cur__version".to_string(), build.version.clone()),
    ("cur__root".to_string(), config.root_path(build).display().to_string()),
    (
      "cur__original_root".to_string(),
      config.source_path(build).display().to_string(),
    ),
    (
      "cur__target_dir".to_string(),
      config.build_path(build).display().to_string(),
    ),
    ("cur__install".to_string(), install.display().to_string()),
  ];
  for dir in INSTALL_TREE_DIRS {
    vars.push((format!("cur__{dir}"), install.join(dir).display().to_string()));
  }
  vars
}

/// Replace `$cur__*` tokens in `value` with the matching entries of `vars`.
/// Longer names first so no variable rewrites a prefix of another.
fn expand_cur(value: &str, vars: &[(String, String)]) -> String {
  let mut ordered: Vec<&(String, String)> = vars.iter().collect();
  ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

  let mut out = value.to_string();
  for (name, replacement) in ordered {
    out = out.replace(&format!("${name}"), replacement);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::BuildSandbox;

  fn sandbox(json: serde_json::Value) -> BuildSandbox {
    serde_json::from_value(json).unwrap()
  }

  fn config() -> BuildConfig {
    BuildConfig::new("/store", "/sandbox")
  }

  /// Root depends on a and b, both depending on leaf; leaf exports a global.
  fn diamond() -> BuildSandbox {
    sandbox(serde_json::json!({
      "root": "r",
      "builds": {
        "r": {"id": "r", "name": "root", "dependencies": ["a", "b"]},
        "a": {"id": "a", "name": "mid-a", "dependencies": ["l"]},
        "b": {"id": "b", "name": "mid-b", "dependencies": ["l"]},
        "l": {
          "id": "l",
          "name": "leaf",
          "version": "1.0.0",
          "exportedEnv": {
            "LEAF_LIB": {"value": "$cur__install/lib", "scope": "global"},
            "LEAF_PRIVATE": {"value": "1", "scope": "local"}
          }
        }
      }
    }))
  }

  fn group_names(env: &Environment) -> Vec<&str> {
    env.groups.iter().map(|g| g.name.as_str()).collect()
  }

  fn lookup<'a>(env: &'a Environment, name: &str) -> Vec<&'a EnvBinding> {
    env
      .groups
      .iter()
      .flat_map(|g| g.bindings.iter())
      .filter(|b| b.name == name)
      .collect()
  }

  #[test]
  fn groups_are_ordered_and_deduplicated() {
    let s = diamond();
    let env = compose(&config(), &s, s.root_build().unwrap()).unwrap();

    assert_eq!(
      group_names(&env),
      vec![
        "built-in environment",
        "sandbox environment",
        "leaf@1.0.0",
        "mid-a",
        "mid-b",
        "root"
      ]
    );
  }

  #[test]
  fn dependency_globals_are_expanded_against_the_exporter() {
    let s = diamond();
    let env = compose(&config(), &s, s.root_build().unwrap()).unwrap();

    let bindings = lookup(&env, "LEAF_LIB");
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].value.as_deref(), Some("/store/_install/l/lib"));
  }

  #[test]
  fn dependency_locals_are_not_visible_to_consumers() {
    let s = diamond();
    let env = compose(&config(), &s, s.root_build().unwrap()).unwrap();

    assert!(lookup(&env, "LEAF_PRIVATE").is_empty());
  }

  #[test]
  fn self_install_points_at_the_staging_tree() {
    let s = diamond();
    let env = compose(&config(), &s, s.root_build().unwrap()).unwrap();

    let install = lookup(&env, "cur__install");
    assert_eq!(install[0].value.as_deref(), Some("/store/_insttmp/r"));
    let bin = lookup(&env, "cur__bin");
    assert_eq!(bin[0].value.as_deref(), Some("/store/_insttmp/r/bin"));
  }

  #[test]
  fn self_locals_are_expanded_against_self() {
    let s = sandbox(serde_json::json!({
      "root": "r",
      "builds": {
        "r": {
          "id": "r",
          "name": "root",
          "exportedEnv": {"FLAGS": {"value": "-I $cur__target_dir"}}
        }
      }
    }));
    let env = compose(&config(), &s, s.root_build().unwrap()).unwrap();

    let flags = lookup(&env, "FLAGS");
    assert_eq!(flags[0].value.as_deref(), Some("-I /store/_build/r"));
  }

  #[test]
  fn builtin_globals_come_first() {
    let s = diamond();
    let env = compose(&config(), &s, s.root_build().unwrap()).unwrap();

    let names: Vec<&str> = env.groups[0].bindings.iter().map(|b| b.name.as_str()).collect();
    assert!(names.contains(&"TMPDIR"));
    assert!(names.contains(&"ESY_EJECT__STORE"));
    assert!(names.contains(&"ESY_EJECT__SANDBOX"));
    assert!(names.contains(&"ESY_EJECT__ROOT"));
  }

  #[test]
  fn exclusive_clash_names_both_contributors() {
    let s = sandbox(serde_json::json!({
      "root": "r",
      "builds": {
        "r": {"id": "r", "name": "root", "dependencies": ["a", "b"]},
        "a": {
          "id": "a", "name": "first", "version": "1.0.0",
          "exportedEnv": {"TOOLCHAIN": {"value": "a", "scope": "global", "exclusive": true}}
        },
        "b": {
          "id": "b", "name": "second", "version": "2.0.0",
          "exportedEnv": {"TOOLCHAIN": {"value": "b", "scope": "global", "exclusive": true}}
        }
      }
    }));

    let err = compose(&config(), &s, s.root_build().unwrap()).unwrap_err();
    match err {
      BuildError::Env(EnvError::ExportConflict { name, first, second }) => {
        assert_eq!(name, "TOOLCHAIN");
        assert_eq!(first, "first@1.0.0");
        assert_eq!(second, "second@2.0.0");
      }
      other => panic!("expected export conflict, got {other:?}"),
    }
  }

  #[test]
  fn non_exclusive_same_name_globals_are_allowed() {
    let s = sandbox(serde_json::json!({
      "root": "r",
      "builds": {
        "r": {"id": "r", "name": "root", "dependencies": ["a", "b"]},
        "a": {
          "id": "a", "name": "first",
          "exportedEnv": {"PATH": {"value": "$cur__install/bin:$PATH", "scope": "global"}}
        },
        "b": {
          "id": "b", "name": "second",
          "exportedEnv": {"PATH": {"value": "$cur__install/bin:$PATH", "scope": "global"}}
        }
      }
    }));

    let env = compose(&config(), &s, s.root_build().unwrap()).unwrap();
    assert_eq!(lookup(&env, "PATH").len(), 2);
  }

  #[test]
  fn package_export_of_a_builtin_name_is_rejected() {
    let s = sandbox(serde_json::json!({
      "root": "r",
      "builds": {
        "r": {"id": "r", "name": "root", "dependencies": ["a"]},
        "a": {
          "id": "a", "name": "rogue",
          "exportedEnv": {"TMPDIR": {"value": "/elsewhere", "scope": "global"}}
        }
      }
    }));

    let err = compose(&config(), &s, s.root_build().unwrap()).unwrap_err();
    match err {
      BuildError::Env(EnvError::BuiltinOverride { name, contributor }) => {
        assert_eq!(name, "TMPDIR");
        assert_eq!(contributor, "rogue");
      }
      other => panic!("expected builtin override, got {other:?}"),
    }
  }

  #[test]
  fn package_may_not_declare_builtin_exports() {
    let s = sandbox(serde_json::json!({
      "root": "r",
      "builds": {
        "r": {
          "id": "r", "name": "root",
          "exportedEnv": {"MY_VAR": {"value": "1", "builtin": true}}
        }
      }
    }));

    let err = compose(&config(), &s, s.root_build().unwrap()).unwrap_err();
    assert!(matches!(err, BuildError::Env(EnvError::BuiltinOverride { .. })));
  }

  #[test]
  fn render_emits_one_export_per_non_null_binding() {
    let s = sandbox(serde_json::json!({
      "root": "r",
      "env": [
        {"name": "ESY__SANDBOX_KIND", "value": "project"},
        {"name": "ESY__UNSET", "value": null}
      ],
      "builds": {"r": {"id": "r", "name": "root"}}
    }));
    let rendered = compose(&config(), &s, s.root_build().unwrap()).unwrap().render();

    assert!(rendered.contains("export ESY__SANDBOX_KIND=\"project\";\n"));
    assert!(!rendered.contains("ESY__UNSET"));
    assert!(rendered.ends_with(";\n"));
    for line in rendered.lines() {
      assert!(line.starts_with("export "));
      assert!(line.ends_with("\";"));
    }
  }

  #[test]
  fn composition_is_deterministic() {
    let s = diamond();
    let first = compose(&config(), &s, s.root_build().unwrap()).unwrap().render();
    let second = compose(&config(), &s, s.root_build().unwrap()).unwrap().render();
    assert_eq!(first, second);
  }

  #[test]
  fn vars_let_later_groups_win() {
    let s = sandbox(serde_json::json!({
      "root": "r",
      "env": [{"name": "SHADOWED", "value": "sandbox"}],
      "builds": {
        "r": {
          "id": "r", "name": "root",
          "exportedEnv": {"SHADOWED": {"value": "self"}}
        }
      }
    }));
    let env = compose(&config(), &s, s.root_build().unwrap()).unwrap();

    let vars = env.vars();
    let shadowed: Vec<_> = vars.iter().filter(|(name, _)| name == "SHADOWED").collect();
    assert_eq!(shadowed.len(), 1);
    assert_eq!(shadowed[0].1, "self");
  }

  #[test]
  fn expand_cur_prefers_longer_names() {
    let vars = vec![
      ("cur__target".to_string(), "short".to_string()),
      ("cur__target_dir".to_string(), "long".to_string()),
    ];
    assert_eq!(expand_cur("$cur__target_dir/$cur__target", &vars), "long/short");
  }
}
