//! esy: command-line front-end for the package sandbox builder.
//!
//! Subcommands:
//! - `esy build <plan>` - build every package of a sandbox plan into the store
//! - `esy eject <plan>` - emit a portable Make-based build script set
//! - `esy build-env <plan>` - print the composed environment for a build

mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "esy")]
#[command(author, version, about = "Build orchestrator for package sandboxes")]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a sandbox plan into the content-addressed store
  Build {
    /// Path to the sandbox plan (JSON produced by a manifest front-end)
    #[arg(default_value = "sandbox.json")]
    plan: PathBuf,

    /// Store for persistent build artifacts (defaults to ~/.esy)
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Sandbox root (defaults to the plan's directory)
    #[arg(long)]
    sandbox_path: Option<PathBuf>,
  },

  /// Emit a self-contained build script set runnable with `make build`
  Eject {
    /// Path to the sandbox plan (JSON produced by a manifest front-end)
    #[arg(default_value = "sandbox.json")]
    plan: PathBuf,

    /// Directory the script set is written to
    #[arg(short, long)]
    output: PathBuf,
  },

  /// Print the composed build environment for a package
  BuildEnv {
    /// Path to the sandbox plan (JSON produced by a manifest front-end)
    #[arg(default_value = "sandbox.json")]
    plan: PathBuf,

    /// Id of the build to compose for (defaults to the root)
    #[arg(long)]
    build: Option<String>,

    /// Store for persistent build artifacts (defaults to ~/.esy)
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Sandbox root (defaults to the plan's directory)
    #[arg(long)]
    sandbox_path: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
  FmtSubscriber::builder()
    .with_max_level(level)
    .with_target(false)
    .without_time()
    .init();

  match cli.command {
    Commands::Build {
      plan,
      store_path,
      sandbox_path,
    } => cmd::cmd_build(&plan, store_path, sandbox_path),
    Commands::Eject { plan, output } => cmd::cmd_eject(&plan, &output),
    Commands::BuildEnv {
      plan,
      build,
      store_path,
      sandbox_path,
    } => cmd::cmd_build_env(&plan, build.as_deref(), store_path, sandbox_path),
  }
}
