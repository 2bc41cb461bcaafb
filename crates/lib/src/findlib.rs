//! findlib configuration for OCaml builds.
//!
//! Each build gets a `findlib.conf` whose `path` enumerates the `lib`
//! subtree of every transitive dependency's finalized install, deepest
//! dependency first, with the build's own staged `lib` appended last so
//! self-queries during the build succeed. The same text serves both
//! back-ends: the eject configuration yields placeholder-form paths that
//! the emitted `render-env` helper resolves at Make-time.

use crate::build::{Build, BuildSandbox};
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::graph;

/// Render the findlib configuration for `build`.
pub fn findlib_conf(config: &BuildConfig, sandbox: &BuildSandbox, build: &Build) -> Result<String, BuildError> {
  let mut entries: Vec<String> = graph::dependencies_post_order(sandbox, build)?
    .iter()
    .map(|dep| config.final_install_path(dep).join("lib").display().to_string())
    .collect();
  entries.push(config.install_path(build).join("lib").display().to_string());

  let destdir = config.install_path(build).join("lib");

  let mut out = String::new();
  out.push_str(&format!("path = \"{}\"\n", entries.join(":")));
  out.push_str(&format!("destdir = \"{}\"\n", destdir.display()));
  out.push_str("ldconf = \"ignore\"\n");
  for tool in ["ocamlc", "ocamldep", "ocamldoc", "ocamllex", "ocamlopt"] {
    out.push_str(&format!("{tool} = \"{tool}.opt\"\n"));
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::BuildSandbox;

  fn diamond() -> BuildSandbox {
    serde_json::from_value(serde_json::json!({
      "root": "r",
      "builds": {
        "r": {"id": "r", "name": "root", "dependencies": ["a", "b"]},
        "a": {"id": "a", "name": "a", "dependencies": ["l"]},
        "b": {"id": "b", "name": "b", "dependencies": ["l"]},
        "l": {"id": "l", "name": "l"}
      }
    }))
    .unwrap()
  }

  #[test]
  fn path_lists_dependencies_deepest_first_and_self_last() {
    let s = diamond();
    let conf = findlib_conf(&BuildConfig::new("/store", "/sandbox"), &s, s.root_build().unwrap()).unwrap();

    let path_line = conf.lines().next().unwrap();
    assert_eq!(
      path_line,
      "path = \"/store/_install/l/lib:/store/_install/a/lib:/store/_install/b/lib:/store/_insttmp/r/lib\""
    );
  }

  #[test]
  fn destdir_is_the_staged_lib() {
    let s = diamond();
    let conf = findlib_conf(&BuildConfig::new("/store", "/sandbox"), &s, s.root_build().unwrap()).unwrap();

    assert!(conf.contains("destdir = \"/store/_insttmp/r/lib\"\n"));
    assert!(conf.contains("ldconf = \"ignore\"\n"));
  }

  #[test]
  fn toolchain_is_pinned_to_opt_variants() {
    let s = diamond();
    let conf = findlib_conf(&BuildConfig::new("/store", "/sandbox"), &s, s.root_build().unwrap()).unwrap();

    for tool in ["ocamlc", "ocamldep", "ocamldoc", "ocamllex", "ocamlopt"] {
      assert!(conf.contains(&format!("{tool} = \"{tool}.opt\"\n")));
    }
  }

  #[test]
  fn eject_config_produces_placeholder_paths() {
    let s = diamond();
    let conf = findlib_conf(&BuildConfig::for_eject(), &s, s.root_build().unwrap()).unwrap();

    assert!(conf.contains("$ESY_EJECT__STORE/_install/l/lib"));
    assert!(conf.contains("$ESY_EJECT__STORE/_insttmp/r/lib"));
  }
}
