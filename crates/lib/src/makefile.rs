//! Minimal Makefile writer.
//!
//! The ejecting builder assembles an ordered list of items and renders them
//! to Makefile text. Three item kinds exist: verbatim lines, rules and
//! `define` blocks. Phony targets are collected into a single trailing
//! `.PHONY` declaration.

/// One item of a Makefile, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum MakeItem {
  /// Verbatim text, emitted on its own line.
  Raw(String),
  Rule(MakeRule),
  Define(MakeDefine),
}

/// A rule: `target: deps` followed by tab-indented recipe lines.
#[derive(Debug, Clone, PartialEq)]
pub struct MakeRule {
  pub target: String,
  pub dependencies: Vec<String>,
  /// Appends the target to the trailing `.PHONY` list.
  pub phony: bool,
  pub commands: Vec<String>,
}

impl MakeRule {
  pub fn new(target: impl Into<String>) -> Self {
    Self {
      target: target.into(),
      dependencies: Vec::new(),
      phony: false,
      commands: Vec::new(),
    }
  }

  pub fn phony(mut self) -> Self {
    self.phony = true;
    self
  }

  pub fn dep(mut self, dep: impl Into<String>) -> Self {
    self.dependencies.push(dep.into());
    self
  }

  pub fn deps<I: IntoIterator<Item = S>, S: Into<String>>(mut self, deps: I) -> Self {
    self.dependencies.extend(deps.into_iter().map(Into::into));
    self
  }

  pub fn command(mut self, command: impl Into<String>) -> Self {
    self.commands.push(command.into());
    self
  }
}

/// A `define NAME … endef` block.
#[derive(Debug, Clone, PartialEq)]
pub struct MakeDefine {
  pub name: String,
  pub body: Vec<DefineBody>,
}

/// One segment of a define body.
#[derive(Debug, Clone, PartialEq)]
pub enum DefineBody {
  /// A verbatim body line.
  Raw(String),
  /// Environment exports: one `export KEY="value"; \` line per non-null
  /// pair. A null value omits its key, so host-conditional variables like
  /// `CI` survive absence cleanly. The trailing backslash joins the define
  /// into a single shell invocation when referenced from a recipe.
  Env(Vec<(String, Option<String>)>),
}

/// Render items to Makefile text.
pub fn render(items: &[MakeItem]) -> String {
  let mut out = String::new();
  let mut phony: Vec<&str> = Vec::new();

  for item in items {
    match item {
      MakeItem::Raw(text) => {
        out.push_str(text);
        out.push('\n');
      }
      MakeItem::Rule(rule) => {
        if rule.phony {
          phony.push(&rule.target);
        }
        out.push_str(&rule.target);
        out.push(':');
        for dep in &rule.dependencies {
          out.push(' ');
          out.push_str(dep);
        }
        out.push('\n');
        for command in &rule.commands {
          out.push('\t');
          out.push_str(command);
          out.push('\n');
        }
        out.push('\n');
      }
      MakeItem::Define(define) => {
        out.push_str(&format!("define {}\n", define.name));
        for segment in &define.body {
          match segment {
            DefineBody::Raw(line) => {
              out.push_str(line);
              out.push('\n');
            }
            DefineBody::Env(pairs) => {
              for (key, value) in pairs {
                if let Some(value) = value {
                  out.push_str(&format!("export {key}=\"{value}\"; \\\n"));
                }
              }
            }
          }
        }
        out.push_str("endef\n\n");
      }
    }
  }

  if !phony.is_empty() {
    out.push_str(&format!(".PHONY: {}\n", phony.join(" ")));
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn raw_items_are_verbatim() {
    let out = render(&[MakeItem::Raw("SHELL := /bin/bash".to_string())]);
    assert_eq!(out, "SHELL := /bin/bash\n");
  }

  #[test]
  fn rule_renders_target_deps_and_commands() {
    let rule = MakeRule::new("pkg.build")
      .deps(["esy-store", "dep.build"])
      .command("@echo building");
    let out = render(&[MakeItem::Rule(rule)]);

    assert_eq!(out, "pkg.build: esy-store dep.build\n\t@echo building\n\n");
  }

  #[test]
  fn phony_targets_accumulate_at_the_end() {
    let out = render(&[
      MakeItem::Rule(MakeRule::new("build").phony().dep("root.build")),
      MakeItem::Rule(MakeRule::new("clean").phony().dep("root.clean")),
      MakeItem::Rule(MakeRule::new("file.o").command("@cc -c file.c")),
    ]);

    assert!(out.ends_with(".PHONY: build clean\n"));
    assert_eq!(out.matches(".PHONY").count(), 1);
  }

  #[test]
  fn define_mixes_raw_and_env_segments() {
    let define = MakeDefine {
      name: "shell_env_for__pkg".to_string(),
      body: vec![
        DefineBody::Env(vec![
          ("CI".to_string(), Some("true".to_string())),
          ("TMPDIR".to_string(), Some("$(TMPDIR)".to_string())),
        ]),
        DefineBody::Raw("source \"$(ESY_EJECT__ROOT)/pkg/eject-env\"; \\".to_string()),
      ],
    };
    let out = render(&[MakeItem::Define(define)]);

    assert_eq!(
      out,
      "define shell_env_for__pkg\n\
       export CI=\"true\"; \\\n\
       export TMPDIR=\"$(TMPDIR)\"; \\\n\
       source \"$(ESY_EJECT__ROOT)/pkg/eject-env\"; \\\n\
       endef\n\n"
    );
  }

  #[test]
  fn null_env_values_omit_their_key() {
    let define = MakeDefine {
      name: "env".to_string(),
      body: vec![DefineBody::Env(vec![
        ("CI".to_string(), None),
        ("KEEP".to_string(), Some("1".to_string())),
      ])],
    };
    let out = render(&[MakeItem::Define(define)]);

    assert!(!out.contains("CI"));
    assert!(out.contains("export KEEP=\"1\"; \\\n"));
  }
}
