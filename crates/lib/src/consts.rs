//! Constants shared by the store layout, the environment composer and the
//! ejected script set.

/// Number of hex characters kept from a full SHA-256 when deriving a build id.
pub const HASH_PREFIX_LEN: usize = 20;

/// Store subtree holding intermediate build artifacts.
pub const STORE_BUILD_TREE: &str = "_build";

/// Store subtree where installs are staged before finalization.
pub const STORE_STAGE_TREE: &str = "_insttmp";

/// Store subtree holding finalized installs. Presence of `_install/<id>` is
/// the commit marker for a persistent build.
pub const STORE_INSTALL_TREE: &str = "_install";

/// Sandbox-relative location of the local store used for non-persistent
/// builds (dev sources).
pub const SANDBOX_STORE_PATH: &str = "_esy/store";

/// Directory skeleton created under a staged install root before any build
/// command runs.
pub const INSTALL_TREE_DIRS: &[&str] = &["lib", "bin", "sbin", "man", "doc", "share", "stublibs", "etc"];

/// Per-build scratch directory created under the build tree; holds the
/// rendered environment and the findlib configuration.
pub const BUILD_META_DIR: &str = "_esy";

/// Environment variable naming the store root in ejected scripts. The same
/// name doubles as the path placeholder (`$ESY_EJECT__STORE`) inside emitted
/// text, resolved at Make-time.
pub const EJECT_STORE_VAR: &str = "ESY_EJECT__STORE";

/// Environment variable naming the sandbox root in ejected scripts.
pub const EJECT_SANDBOX_VAR: &str = "ESY_EJECT__SANDBOX";

/// Environment variable naming the directory the scripts were ejected to.
pub const EJECT_ROOT_VAR: &str = "ESY_EJECT__ROOT";
