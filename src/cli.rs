// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `nodeserve`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nodeserve",
    version,
    about = "Build, bootstrap and serve a local workload, rebuilding on source changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Source root of the workload.
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    pub path: PathBuf,

    /// Config file. Default: `nodeserve.toml` under `--path`.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Workload data directory, overriding `workload.home`.
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NODESERVE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Watch the source tree and keep the workload running.
    Serve(ServeArgs),

    /// Build the workload binary once and print its path.
    Build(CacheArgs),

    /// Build if needed and bootstrap fresh workload state.
    Init(CacheArgs),

    /// Build, bootstrap and start once on local ports, then stop.
    Verify(VerifyArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Reinitialize the workload state on every rebuild.
    #[arg(long, short = 'f')]
    pub force_reset: bool,

    /// Reinitialize the workload state on the first rebuild only.
    #[arg(long, short = 'r')]
    pub reset_once: bool,

    #[command(flatten)]
    pub cache: CacheArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct CacheArgs {
    /// Forget every stored checksum before starting.
    #[arg(long)]
    pub clear_cache: bool,
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// Seconds to wait for the workload to start listening.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub timeout: u64,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_flags_parse() {
        let args = CliArgs::try_parse_from([
            "nodeserve",
            "serve",
            "--reset-once",
            "--clear-cache",
            "--path",
            "/src/mars",
        ])
        .unwrap();

        assert_eq!(args.path, PathBuf::from("/src/mars"));
        match args.command {
            Command::Serve(serve) => {
                assert!(serve.reset_once);
                assert!(!serve.force_reset);
                assert!(serve.cache.clear_cache);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verify_timeout_defaults_to_a_minute() {
        let args = CliArgs::try_parse_from(["nodeserve", "verify"]).unwrap();
        assert!(matches!(args.command, Command::Verify(VerifyArgs { timeout: 60 })));
        assert_eq!(args.path, PathBuf::from("."));
        assert!(args.config.is_none());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(CliArgs::try_parse_from(["nodeserve"]).is_err());
    }
}
