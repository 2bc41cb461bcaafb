//! Make-identifier normalization and the bundled helper sources.

/// Normalize a package name into a Make-safe identifier.
///
/// Transformation, in order: lower-case, strip `@`, double every underscore
/// (so original underscores stay distinguishable from the separators
/// introduced below), spell out `/` and `.`, map `-` to a single underscore.
/// Injective over names drawn from `[a-z0-9@/._-]`.
pub fn normalize_name(name: &str) -> String {
  name
    .to_lowercase()
    .replace('@', "")
    .replace('_', "__")
    .replace('/', "__slash__")
    .replace('.', "__dot__")
    .replace('-', "_")
}

/// Wrapper around the system `realpath`, compiled on the target machine by
/// the `esy-root` Make target.
pub const REALPATH_C: &str = r#"#include <limits.h>
#include <stdio.h>
#include <stdlib.h>

int main(int argc, char** argv) {
  if (argc != 2) {
    fprintf(stderr, "usage: realpath <path>\n");
    return 1;
  }
  char resolved[PATH_MAX];
  if (realpath(argv[1], resolved) == NULL) {
    perror("realpath");
    return 1;
  }
  printf("%s\n", resolved);
  return 0;
}
"#;

/// Substitutes the eject placeholders into a `.in` template. `TMPDIR_GLOBAL`
/// is substituted before `TMPDIR` so the longer name is not clobbered by its
/// prefix.
pub const RENDER_ENV_SH: &str = r#"#!/bin/bash
#
# render-env <input.in> <output>
#
# Substitutes $ESY_EJECT__STORE, $ESY_EJECT__SANDBOX, $ESY_EJECT__ROOT,
# $TMPDIR_GLOBAL and $TMPDIR into the input template.

set -e
set -u
set -o pipefail

sed \
  -e "s|\$ESY_EJECT__STORE|${ESY_EJECT__STORE}|g" \
  -e "s|\$ESY_EJECT__SANDBOX|${ESY_EJECT__SANDBOX}|g" \
  -e "s|\$ESY_EJECT__ROOT|${ESY_EJECT__ROOT}|g" \
  -e "s|\$TMPDIR_GLOBAL|${TMPDIR_GLOBAL}|g" \
  -e "s|\$TMPDIR|${TMPDIR}|g" \
  < "$1" > "$2"
"#;

/// Rewrites every occurrence of one byte string with another in a file,
/// preserving the file mode. The Make-time counterpart of the in-process
/// staging-path rewrite.
pub const REPLACE_STRING_SH: &str = r#"#!/bin/bash
#
# replace-string <file> <from> <to>

set -e
set -u

file="$1"
tmp="$file.esy-rewrite"

FROM="$2" TO="$3" perl -pe 's/\Q$ENV{FROM}\E/$ENV{TO}/g' "$file" > "$tmp"

if stat --version >/dev/null 2>&1; then
  mode="$(stat -c '%a' "$file")"
else
  mode="$(stat -f '%Lp' "$file")"
fi
chmod "$mode" "$tmp"
mv "$tmp" "$file"
"#;

/// The shell runtime realizing the build protocol on the target machine.
/// Bundled verbatim at eject time.
pub const RUNTIME_SH: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/runtime.sh"));

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalization_examples() {
    assert_eq!(normalize_name("@opam/lwt.unix"), "opam__slash__lwt__dot__unix");
    assert_eq!(normalize_name("my-package"), "my_package");
    assert_eq!(normalize_name("snake_case"), "snake__case");
    assert_eq!(normalize_name("MixedCase"), "mixedcase");
  }

  #[test]
  fn underscore_runs_double() {
    assert_eq!(normalize_name("a_b"), "a__b");
    assert_eq!(normalize_name("a__b"), "a____b");
  }

  #[test]
  fn normalization_is_injective_over_lookalikes() {
    // Names that collapse to similar shapes must stay distinguishable.
    let names = ["a-b", "a_b", "a/b", "a.b", "a__b", "a_/b", "a-_b"];
    let mut normalized: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
    normalized.sort();
    normalized.dedup();
    assert_eq!(normalized.len(), names.len());
  }

  #[test]
  fn helper_scripts_have_shebangs() {
    assert!(RENDER_ENV_SH.starts_with("#!/bin/bash"));
    assert!(REPLACE_STRING_SH.starts_with("#!/bin/bash"));
    assert!(RUNTIME_SH.starts_with("#!/bin/bash"));
  }

  #[test]
  fn realpath_helper_is_conforming_c() {
    assert!(REALPATH_C.contains("int main(int argc, char** argv)"));
    assert!(REALPATH_C.contains("return 0;"));
  }
}
