//! CLI command definitions using clap

use crate::config::ColorChoice;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Simhunt: playbook engine for iOS simulator testing
#[derive(Parser, Debug)]
#[command(name = "simhunt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a playbook options file with a dry run
    Validate(ValidateArgs),

    /// Render a saved result file
    Render(RenderArgs),

    /// Print the metrics stored in a performance baseline
    Baseline(BaselineArgs),
}

/// Playbook selector
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybookKind {
    /// Random UI exploration hunting for crashes
    CrashHunt,
    /// Launch timing and regression check
    PerformanceCheck,
    /// Rebuild and verify until assertions pass
    FeatureShip,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Playbook the options belong to
    #[arg(value_enum)]
    pub playbook: PlaybookKind,

    /// Options file (.yaml, .yml, or .json)
    pub options: PathBuf,
}

/// Result rendering format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderFormat {
    /// Markdown report
    #[default]
    Markdown,
    /// Pretty JSON
    Json,
    /// Single line
    Compact,
    /// HTML dashboard
    Html,
}

/// Arguments for the render command
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Result JSON written by a run
    pub result: PathBuf,

    /// Playbook that produced the result
    #[arg(short, long, value_enum)]
    pub playbook: PlaybookKind,

    /// Output format
    #[arg(short, long, value_enum, default_value = "markdown")]
    pub format: RenderFormat,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the baseline command
#[derive(Parser, Debug)]
pub struct BaselineArgs {
    /// Baseline JSON file
    pub file: PathBuf,

    /// Print the parsed baseline as JSON
    #[arg(long)]
    pub json: bool,
}

/// Color argument for clap
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum ColorArg {
    /// Detect terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_validate() {
            let cli =
                Cli::try_parse_from(["simhunt", "validate", "crash-hunt", "hunt.yaml"]).unwrap();
            match cli.command {
                Commands::Validate(args) => {
                    assert_eq!(args.playbook, PlaybookKind::CrashHunt);
                    assert_eq!(args.options, PathBuf::from("hunt.yaml"));
                }
                other => panic!("unexpected command: {other:?}"),
            }
        }

        #[test]
        fn test_render_defaults_to_markdown() {
            let cli = Cli::try_parse_from([
                "simhunt",
                "render",
                "result.json",
                "--playbook",
                "feature-ship",
            ])
            .unwrap();
            match cli.command {
                Commands::Render(args) => {
                    assert_eq!(args.format, RenderFormat::Markdown);
                    assert_eq!(args.playbook, PlaybookKind::FeatureShip);
                    assert!(args.output.is_none());
                }
                other => panic!("unexpected command: {other:?}"),
            }
        }

        #[test]
        fn test_global_flags_after_subcommand() {
            let cli =
                Cli::try_parse_from(["simhunt", "baseline", "b.json", "-vv", "--color", "never"])
                    .unwrap();
            assert_eq!(cli.verbose, 2);
            assert!(matches!(cli.color, ColorArg::Never));
        }

        #[test]
        fn test_unknown_playbook_rejected() {
            assert!(Cli::try_parse_from(["simhunt", "validate", "bogus", "x.yaml"]).is_err());
        }
    }
}
