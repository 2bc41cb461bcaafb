//! Filesystem helpers for the in-process builder.

use std::fs;
use std::path::Path;

use filetime::FileTime;
use walkdir::WalkDir;

use crate::error::BuildError;

/// Recursively remove `path` if it exists.
pub async fn remove_if_exists(path: &Path) -> Result<(), BuildError> {
  match tokio::fs::remove_dir_all(path).await {
    Ok(()) => Ok(()),
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(err) => Err(BuildError::io(path, err)),
  }
}

/// Archive-mode mirror of `src`'s contents into `dst`.
///
/// Regular files keep their permissions and modification times, symlinks are
/// recreated (not followed), directory permissions are copied. `dst` is
/// created if missing; existing entries are overwritten, so the operation
/// behaves like `rsync -a src/ dst/`.
pub fn mirror_dir(src: &Path, dst: &Path) -> Result<(), BuildError> {
  fs::create_dir_all(dst).map_err(|err| BuildError::io(dst, err))?;

  for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
    let entry = entry.map_err(|err| {
      let path = err.path().unwrap_or(src).to_path_buf();
      BuildError::io(path, err.into())
    })?;
    let rel = entry.path().strip_prefix(src).expect("walked path is under src");
    let target = dst.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target).map_err(|err| BuildError::io(&target, err))?;
      let metadata = entry.metadata().map_err(|err| BuildError::io(entry.path(), err.into()))?;
      fs::set_permissions(&target, metadata.permissions()).map_err(|err| BuildError::io(&target, err))?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path()).map_err(|err| BuildError::io(entry.path(), err))?;
      if target.symlink_metadata().is_ok() {
        fs::remove_file(&target).map_err(|err| BuildError::io(&target, err))?;
      }
      make_symlink(&link, &target)?;
    } else {
      fs::copy(entry.path(), &target).map_err(|err| BuildError::io(entry.path(), err))?;
      let metadata = entry.metadata().map_err(|err| BuildError::io(entry.path(), err.into()))?;
      let mtime = FileTime::from_last_modification_time(&metadata);
      filetime::set_file_mtime(&target, mtime).map_err(|err| BuildError::io(&target, err))?;
    }
  }

  Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path) -> Result<(), BuildError> {
  std::os::unix::fs::symlink(link, target).map_err(|err| BuildError::io(target, err))
}

#[cfg(not(unix))]
fn make_symlink(_link: &Path, target: &Path) -> Result<(), BuildError> {
  Err(BuildError::io(
    target,
    std::io::Error::new(std::io::ErrorKind::Unsupported, "symlinks in sources are unsupported here"),
  ))
}
