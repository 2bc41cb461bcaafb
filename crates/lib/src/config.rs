//! Path scheme for the content-addressed store and the sandbox.
//!
//! For each build four logical trees exist: **source** (the package's source
//! tree), **root** (cwd for build commands), **build** (intermediate
//! artifacts), **install** (staging) and **finalInstall** (the published
//! location). Install and finalInstall are distinct so installation can be
//! committed with a single atomic rename; absence of `_install/<id>` is the
//! canonical "not built" signal for persistent builds.

use std::path::{Path, PathBuf};

use crate::build::Build;
use crate::consts::{
  EJECT_ROOT_VAR, EJECT_SANDBOX_VAR, EJECT_STORE_VAR, SANDBOX_STORE_PATH, STORE_BUILD_TREE, STORE_INSTALL_TREE,
  STORE_STAGE_TREE,
};

/// Per-operation configuration mapping `(build, kind)` to absolute paths.
///
/// The ejecting builder uses the same scheme with placeholder roots
/// ([`BuildConfig::for_eject`]); the produced path strings are resolved at
/// Make-time instead of pointing into the local filesystem.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Root of the shared store for persistent builds.
  pub store_path: PathBuf,

  /// Root of the sandbox; also hosts the local store for dev builds.
  pub sandbox_path: PathBuf,

  /// Value used for `ESY_EJECT__ROOT`; defaults to the sandbox path for
  /// in-process operation.
  eject_root: Option<PathBuf>,
}

impl BuildConfig {
  /// Configuration for in-process building against real filesystem roots.
  pub fn new(store_path: impl Into<PathBuf>, sandbox_path: impl Into<PathBuf>) -> Self {
    Self {
      store_path: store_path.into(),
      sandbox_path: sandbox_path.into(),
      eject_root: None,
    }
  }

  /// Configuration for the ejecting builder: store and sandbox roots are the
  /// literal placeholder strings resolved by the emitted scripts.
  pub fn for_eject() -> Self {
    Self {
      store_path: PathBuf::from(format!("${EJECT_STORE_VAR}")),
      sandbox_path: PathBuf::from(format!("${EJECT_SANDBOX_VAR}")),
      eject_root: Some(PathBuf::from(format!("${EJECT_ROOT_VAR}"))),
    }
  }

  /// Root of the sandbox-local store used for non-persistent builds.
  pub fn sandbox_store_path(&self) -> PathBuf {
    self.sandbox_path.join(SANDBOX_STORE_PATH)
  }

  /// The value exported as `ESY_EJECT__ROOT`.
  pub fn eject_root(&self) -> &Path {
    self.eject_root.as_deref().unwrap_or(&self.sandbox_path)
  }

  /// Whether this configuration emits placeholder paths for ejection.
  pub fn is_eject(&self) -> bool {
    self.eject_root.is_some()
  }

  /// Store base for a build: the shared store for persistent builds, the
  /// sandbox-local store otherwise.
  pub fn base_path(&self, build: &Build) -> PathBuf {
    if build.should_be_persisted {
      self.store_path.clone()
    } else {
      self.sandbox_store_path()
    }
  }

  /// The build's source tree.
  pub fn source_path(&self, build: &Build) -> PathBuf {
    self.sandbox_path.join(&build.source_path)
  }

  /// Working directory for build commands: the build tree for in-source
  /// builds (sources are staged there first), the source tree otherwise.
  pub fn root_path(&self, build: &Build) -> PathBuf {
    if build.mutates_source_path {
      self.build_path(build)
    } else {
      self.source_path(build)
    }
  }

  /// Intermediate build artifacts: `<base>/_build/<id>`.
  pub fn build_path(&self, build: &Build) -> PathBuf {
    self.base_path(build).join(STORE_BUILD_TREE).join(&build.id.0)
  }

  /// Install staging: `<base>/_insttmp/<id>`. Commands install here.
  pub fn install_path(&self, build: &Build) -> PathBuf {
    self.base_path(build).join(STORE_STAGE_TREE).join(&build.id.0)
  }

  /// Finalized install: `<base>/_install/<id>`. Created only by the atomic
  /// rename that commits a build.
  pub fn final_install_path(&self, build: &Build) -> PathBuf {
    self.base_path(build).join(STORE_INSTALL_TREE).join(&build.id.0)
  }
}
