//! Simhunt CLI: playbook tooling for iOS simulator testing
//!
//! ## Usage
//!
//! ```bash
//! simhunt validate crash-hunt hunt.yaml                 # Dry-run an options file
//! simhunt render run/crash_hunt_report.json -p crash-hunt  # Markdown to stdout
//! simhunt render report.json -p feature-ship -f html -o report.html
//! simhunt baseline baseline.json                        # Show stored metrics
//! ```

use clap::Parser;
use simhunt_cli::{
    handlers::{execute_baseline, execute_render, execute_validate},
    logging, Cli, CliConfig, CliResult, ColorChoice, Commands, StatusPrinter, Verbosity,
};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    config.apply_color();
    logging::init(config.verbosity, config.color.should_color());

    let printer = StatusPrinter::new(config.color.should_color(), config.verbosity.is_quiet());
    match run(cli, &printer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            printer.failure(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, printer: &StatusPrinter) -> CliResult<()> {
    match cli.command {
        Commands::Validate(args) => {
            let line = execute_validate(&args).await?;
            printer.success(&format!("{} is valid", args.options.display()));
            println!("{line}");
            Ok(())
        }
        Commands::Render(args) => {
            if let Some(text) = execute_render(&args)? {
                print!("{text}");
            } else if let Some(output) = &args.output {
                printer.success(&format!("report written to {}", output.display()));
            }
            Ok(())
        }
        Commands::Baseline(args) => {
            print!("{}", execute_baseline(&args)?);
            Ok(())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.into();
    CliConfig::new().with_verbosity(verbosity).with_color(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_from_flags() {
        let cli = Cli::parse_from(["simhunt", "-vv", "--color", "never", "baseline", "b.json"]);
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Debug);
        assert_eq!(config.color, ColorChoice::Never);
    }

    #[test]
    fn test_quiet_wins_over_verbose() {
        let cli = Cli::parse_from(["simhunt", "-q", "-v", "baseline", "b.json"]);
        assert_eq!(build_config(&cli).verbosity, Verbosity::Quiet);
    }
}
