//! Staging-path rewrite.
//!
//! Tools routinely embed absolute paths into installed artifacts, so after
//! the build commands finish the staged install still references
//! `_insttmp/<id>`. Before finalization every regular file containing the
//! staging prefix has all occurrences replaced with the final install
//! prefix. Each affected file is rewritten whole through a sibling temp file
//! (mode preserved, then renamed over the original): the two prefixes
//! differ in length, so an in-place overwrite at the found offset would
//! corrupt the file.

use std::fs;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::BuildError;

/// Replace every occurrence of `from` with `to` in all regular files under
/// `root`. Directories, symlinks and files without the needle are left
/// untouched. Returns the number of files rewritten.
pub fn rewrite_paths(root: &Path, from: &Path, to: &Path) -> Result<usize, BuildError> {
  let needle = from.as_os_str().as_encoded_bytes();
  let replacement = to.as_os_str().as_encoded_bytes();
  let mut rewritten = 0;

  for entry in WalkDir::new(root).follow_links(false) {
    let entry = entry.map_err(|err| {
      let path = err.path().unwrap_or(root).to_path_buf();
      BuildError::Rewrite { path, source: err.into() }
    })?;
    if !entry.file_type().is_file() {
      continue;
    }

    let path = entry.path();
    let data = fs::read(path).map_err(|err| BuildError::Rewrite {
      path: path.to_path_buf(),
      source: err,
    })?;
    let Some(updated) = replace_all(&data, needle, replacement) else {
      continue;
    };

    write_in_place(path, &updated)?;
    rewritten += 1;
    debug!(path = %path.display(), "rewrote staging prefix");
  }

  Ok(rewritten)
}

/// Replace all occurrences of `from` in `data`; `None` when absent.
fn replace_all(data: &[u8], from: &[u8], to: &[u8]) -> Option<Vec<u8>> {
  if from.is_empty() {
    return None;
  }

  let mut out = Vec::with_capacity(data.len());
  let mut at = 0;
  let mut found = false;
  while at < data.len() {
    if data[at..].starts_with(from) {
      out.extend_from_slice(to);
      at += from.len();
      found = true;
    } else {
      out.push(data[at]);
      at += 1;
    }
  }
  found.then_some(out)
}

/// Write `data` to a sibling temp file carrying the original mode, then
/// rename it over `path`.
fn write_in_place(path: &Path, data: &[u8]) -> Result<(), BuildError> {
  let rewrite_err = |err: std::io::Error| BuildError::Rewrite {
    path: path.to_path_buf(),
    source: err,
  };

  let mut name = path.file_name().unwrap_or_default().to_os_string();
  name.push(".esy-rewrite");
  let temp = path.with_file_name(name);

  let permissions = fs::metadata(path).map_err(rewrite_err)?.permissions();
  fs::write(&temp, data).map_err(rewrite_err)?;
  fs::set_permissions(&temp, permissions).map_err(rewrite_err)?;
  fs::rename(&temp, path).map_err(rewrite_err)?;
  Ok(())
}
