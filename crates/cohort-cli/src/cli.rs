//! CLI argument definitions for the cohort pipeline.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use cohort_cli::pipeline::Stage;

#[derive(Parser)]
#[command(
    name = "cohort-pipeline",
    version,
    about = "Gather and merge brain-aging cohort data",
    long_about = "Normalize cognitive, PET and MRI sources into per-visit tables, \
                  then merge them into subject-level master tables.\n\n\
                  Every table is persisted as a timestamped CSV/Parquet pair \
                  tracked by manifest.json in the output directory."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Normalize raw sources and persist their tables.
    Gather(GatherArgs),

    /// Build cogtests, subjtbl and NPtbl from persisted tables.
    Merge(ConfigArgs),

    /// Gather every configured source, then merge.
    Run(ConfigArgs),

    /// List the current persisted copy of each table.
    Tables(TablesArgs),
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Pipeline configuration file.
    #[arg(long = "config", short = 'c', value_name = "FILE")]
    pub config: PathBuf,

    /// Output directory (overrides `output_dir` in the configuration).
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Hide progress bars.
    #[arg(long = "no-progress")]
    pub no_progress: bool,
}

#[derive(Args)]
pub struct GatherArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Run only these stages (repeatable; default: every configured stage).
    #[arg(long = "stage", value_enum, value_name = "STAGE")]
    pub stages: Vec<Stage>,
}

#[derive(Args)]
pub struct TablesArgs {
    /// Output directory to inspect.
    #[arg(long = "dir", value_name = "DIR")]
    pub dir: PathBuf,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_stages() {
        let cli = Cli::try_parse_from([
            "cohort-pipeline",
            "gather",
            "--config",
            "pipeline.toml",
            "--stage",
            "pib",
            "--stage",
            "mri",
        ])
        .unwrap();
        let Command::Gather(args) = cli.command else {
            panic!("expected gather");
        };
        assert_eq!(args.stages, vec![Stage::Pib, Stage::Mri]);
        assert_eq!(args.common.config, PathBuf::from("pipeline.toml"));
    }
}
