//! Content-hash derivation for build ids.
//!
//! The id of a build is a truncated SHA-256 over the canonical JSON of its
//! build inputs. Everything that can change the produced artifacts
//! participates: name, version, commands, exported env, source location, the
//! in-source flag and the ids of all direct dependencies. The `errors` field
//! and the persistence flag do not; they change where artifacts live or
//! whether the build may run, not what it produces.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::consts::HASH_PREFIX_LEN;

use super::types::{Build, BuildId, ExportSpec};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashInputs<'a> {
  name: &'a str,
  version: &'a str,
  command: &'a [String],
  exported_env: &'a BTreeMap<String, ExportSpec>,
  source_path: &'a PathBuf,
  mutates_source_path: bool,
  dependencies: &'a [BuildId],
}

impl Build {
  /// Derive the content-addressed id for this build's inputs.
  ///
  /// Deterministic: `BTreeMap` keys and `serde_json` give a canonical
  /// serialization, so identical inputs always produce the same id.
  pub fn computed_id(&self) -> BuildId {
    let inputs = HashInputs {
      name: &self.name,
      version: &self.version,
      command: &self.command,
      exported_env: &self.exported_env,
      source_path: &self.source_path,
      mutates_source_path: self.mutates_source_path,
      dependencies: &self.dependencies,
    };
    let serialized = serde_json::to_string(&inputs).expect("build inputs serialize to JSON");
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    BuildId(format!("{}-{}", sanitized_name(&self.name), &full[..HASH_PREFIX_LEN]))
  }
}

/// Filesystem-safe form of the package name used as the id prefix.
fn sanitized_name(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
    .collect()
}
