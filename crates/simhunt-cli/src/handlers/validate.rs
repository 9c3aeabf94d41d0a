//! Validate command handler

use super::load_file;
use crate::commands::{PlaybookKind, ValidateArgs};
use crate::error::CliResult;
use serde::de::DeserializeOwned;
use simhunt::{
    format_crash_hunt_result_compact, format_feature_ship_result_compact,
    format_performance_result_compact, run_crash_hunt, run_feature_ship_loop,
    run_performance_check, CrashHuntOptions, FeatureShipOptions, MockSimulator,
    PerformanceCheckOptions, Toolchain,
};
use std::path::Path;
use std::sync::Arc;

/// Load playbook options from a YAML or JSON file
pub fn load_options<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    load_file(path)
}

/// Dry-run the options through the playbook entry point.
///
/// Returns the compact result line. Invalid options surface as the
/// library's validation error.
pub async fn execute_validate(args: &ValidateArgs) -> CliResult<String> {
    // Dry runs return before any collaborator is called
    let toolchain = Toolchain::from_adapter(Arc::new(MockSimulator::new()));
    tracing::info!(playbook = ?args.playbook, path = %args.options.display(), "validating options");

    let line = match args.playbook {
        PlaybookKind::CrashHunt => {
            let mut options: CrashHuntOptions = load_options(&args.options)?;
            options.run.dry_run = true;
            let outcome = run_crash_hunt(&toolchain, options).await?;
            format_crash_hunt_result_compact(&outcome.result)
        }
        PlaybookKind::PerformanceCheck => {
            let mut options: PerformanceCheckOptions = load_options(&args.options)?;
            options.run.dry_run = true;
            let outcome = run_performance_check(&toolchain, options).await?;
            format_performance_result_compact(&outcome.result)
        }
        PlaybookKind::FeatureShip => {
            let mut options: FeatureShipOptions = load_options(&args.options)?;
            options.run.dry_run = true;
            let outcome = run_feature_ship_loop(&toolchain, options).await?;
            format_feature_ship_result_compact(&outcome.result)
        }
    };
    Ok(line)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use std::path::PathBuf;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn args(playbook: PlaybookKind, options: PathBuf) -> ValidateArgs {
        ValidateArgs { playbook, options }
    }

    #[tokio::test]
    async fn test_valid_crash_hunt_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "hunt.yaml",
            "bundle_id: com.example.app\nduration_secs: 60\nseed: 7\nmax_depth: 4\n",
        );
        let line = execute_validate(&args(PlaybookKind::CrashHunt, path)).await.unwrap();
        assert!(line.starts_with("[DRY-RUN] crash_hunt reason=dry_run"));
        assert!(line.contains("seed=7"));
    }

    #[tokio::test]
    async fn test_valid_performance_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "perf.json",
            r#"{"bundle_id": "com.example.app", "runs": 3, "threshold_percent": 15}"#,
        );
        let line = execute_validate(&args(PlaybookKind::PerformanceCheck, path))
            .await
            .unwrap();
        assert!(line.starts_with("[DRY-RUN] performance_check"));
    }

    #[tokio::test]
    async fn test_feature_ship_without_assertions_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "ship.yaml", "bundle_id: com.example.app\n");
        let err = execute_validate(&args(PlaybookKind::FeatureShip, path))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Simhunt(_)));
        assert!(err.to_string().starts_with("Invalid options"));
    }

    #[tokio::test]
    async fn test_out_of_range_duration_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "hunt.yaml",
            "bundle_id: com.example.app\nduration_secs: 100000\n",
        );
        assert!(execute_validate(&args(PlaybookKind::CrashHunt, path)).await.is_err());
    }
}
