//! Core types for the build graph.
//!
//! A [`Build`] is one node of the dependency DAG: the recipe for producing a
//! single package's installed artifacts. Builds are created by an external
//! front-end (the manifest parser) and are immutable once constructed; the
//! graph is represented as an id-keyed map plus per-build dependency id
//! lists, so shared sub-builds appear exactly once.
//!
//! All types serialize as camelCase JSON; that serialization is the
//! interchange format between front-ends and this crate.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A stable content hash identifying a build.
///
/// The id doubles as the directory name under the store trees, so the store's
/// uniqueness guarantee rests on two builds with equal ids having
/// byte-identical build inputs. Front-ends normally derive ids with
/// [`Build::computed_id`](crate::build::Build::computed_id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildId(pub String);

impl std::fmt::Display for BuildId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for BuildId {
  fn from(value: &str) -> Self {
    BuildId(value.to_string())
  }
}

/// Visibility of an exported environment variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
  /// Visible only inside the exporting build.
  #[default]
  Local,
  /// Also visible to every consumer of the exporting build.
  Global,
}

/// A single environment export declared by a build.
///
/// Values may reference the exporting build's own paths through `$cur__*`
/// placeholders; the composer expands those against the exporter before the
/// variable becomes visible to consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSpec {
  /// The exported value. `None` entries are carried but render as nothing.
  pub value: Option<String>,

  /// Visibility of the export. Defaults to local.
  #[serde(default)]
  pub scope: ExportScope,

  /// Only this build may export the name in its scope; a later same-scope
  /// export of the same name is an error.
  #[serde(default)]
  pub exclusive: bool,

  /// Marks variables the builder itself owns. User packages may not set
  /// this, nor export a name that collides with a builtin.
  #[serde(default)]
  pub builtin: bool,
}

/// A node in the build DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
  /// Stable content hash; directory name in the store.
  pub id: BuildId,

  /// Human-readable package name (e.g. `@opam/lwt`).
  pub name: String,

  /// Human-readable package version.
  #[serde(default)]
  pub version: String,

  /// Ordered build commands, each a full shell command string. Empty means
  /// "no build step": the build still produces an (empty) install.
  #[serde(default)]
  pub command: Vec<String>,

  /// Environment exports contributed by this build.
  #[serde(default)]
  pub exported_env: BTreeMap<String, ExportSpec>,

  /// Location of the source tree, relative to the sandbox root.
  #[serde(default)]
  pub source_path: PathBuf,

  /// The build writes into its own source tree; sources must be staged into
  /// the build tree before any command runs.
  #[serde(default)]
  pub mutates_source_path: bool,

  /// Artifacts go into the shared store (released, immutable packages) when
  /// true; into the sandbox-local store (dev sources) when false.
  #[serde(default = "default_persisted")]
  pub should_be_persisted: bool,

  /// Direct dependencies, in declaration order.
  #[serde(default)]
  pub dependencies: Vec<BuildId>,

  /// Diagnostics attached by the manifest parser. A build with any error is
  /// invalid and fails the whole operation before any command runs.
  #[serde(default)]
  pub errors: Vec<String>,
}

fn default_persisted() -> bool {
  true
}

impl Build {
  /// `name@version` label used in diagnostics and export-conflict reports.
  pub fn spec_label(&self) -> String {
    if self.version.is_empty() {
      self.name.clone()
    } else {
      format!("{}@{}", self.name, self.version)
    }
  }
}

/// One entry of the sandbox-wide global environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
  pub name: String,
  /// `None` entries are carried but render as nothing.
  pub value: Option<String>,
}

/// The root build together with the global environment applied to every
/// build in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSandbox {
  /// Sandbox-wide environment, seeded into every build's composed env.
  #[serde(default)]
  pub env: Vec<EnvVar>,

  /// Id of the root build.
  pub root: BuildId,

  /// Every build reachable from the root, keyed by id.
  pub builds: BTreeMap<BuildId, Build>,
}

impl BuildSandbox {
  /// Look up a build by id.
  pub fn get(&self, id: &BuildId) -> Option<&Build> {
    self.builds.get(id)
  }

  /// The root build, if present in the map.
  pub fn root_build(&self) -> Option<&Build> {
    self.builds.get(&self.root)
  }
}
