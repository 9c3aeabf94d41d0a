//! App source validation and the build/install/launch steps playbooks share.

use super::controller::{Phase, RunContext};
use crate::driver::{BuildRequest, DeviceControl};
use crate::result::{SimhuntError, SimhuntResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the app under test comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSource {
    /// Prebuilt `.app` to install
    pub app_path: Option<PathBuf>,
    /// `.xcodeproj` or `.xcworkspace` to build
    pub project_path: Option<PathBuf>,
    /// Scheme to build
    pub scheme: Option<String>,
    /// Build configuration, `Debug` when unset
    pub configuration: Option<String>,
    /// Installed app to use as-is
    pub bundle_id: Option<String>,
}

impl AppSource {
    /// Use an already installed app
    #[must_use]
    pub fn installed(bundle_id: impl Into<String>) -> Self {
        Self {
            bundle_id: Some(bundle_id.into()),
            ..Self::default()
        }
    }

    /// Build from a project
    #[must_use]
    pub fn project(project_path: impl Into<PathBuf>, scheme: impl Into<String>) -> Self {
        Self {
            project_path: Some(project_path.into()),
            scheme: Some(scheme.into()),
            ..Self::default()
        }
    }

    /// Whether a project build is configured
    #[must_use]
    pub const fn is_buildable(&self) -> bool {
        self.project_path.is_some() && self.scheme.is_some()
    }

    /// Check project/scheme pairing; `require_any` also demands some source
    pub fn validate(&self, require_any: bool) -> SimhuntResult<()> {
        match (&self.project_path, &self.scheme) {
            (None, Some(scheme)) => {
                return Err(SimhuntError::validation(format!(
                    "scheme '{scheme}' given without project_path"
                )));
            }
            (Some(path), None) => {
                return Err(SimhuntError::validation(format!(
                    "project_path {} given without scheme",
                    path.display()
                )));
            }
            (Some(path), Some(_)) => {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if ext != "xcodeproj" && ext != "xcworkspace" {
                    return Err(SimhuntError::validation(format!(
                        "project_path must be an .xcodeproj or .xcworkspace, got {}",
                        path.display()
                    )));
                }
            }
            (None, None) => {}
        }
        if let Some(bundle) = &self.bundle_id {
            if bundle.trim().is_empty() {
                return Err(SimhuntError::validation("bundle_id must not be empty"));
            }
        }
        if require_any
            && self.app_path.is_none()
            && !self.is_buildable()
            && self.bundle_id.is_none()
        {
            return Err(SimhuntError::validation(
                "one of app_path, project_path + scheme, or bundle_id is required",
            ));
        }
        Ok(())
    }
}

/// Build the project for the run's simulator; returns the `.app` path
pub async fn build_app(ctx: &RunContext, source: &AppSource) -> SimhuntResult<PathBuf> {
    let (Some(project_path), Some(scheme)) = (&source.project_path, &source.scheme) else {
        return Err(SimhuntError::build("no project configured"));
    };
    ctx.phase(Phase::Building, format!("building scheme {scheme}"));
    let request = BuildRequest {
        project_path: project_path.clone(),
        scheme: scheme.clone(),
        configuration: source
            .configuration
            .clone()
            .unwrap_or_else(|| "Debug".to_string()),
        destination: ctx.simulator.destination(),
    };
    let output = ctx.toolchain.builder.build(&request).await?;
    if !output.success {
        return Err(SimhuntError::build(output.failure_message()));
    }
    if !output.warnings.is_empty() {
        tracing::debug!(warnings = output.warnings.len(), "build finished with warnings");
    }
    output
        .app_path
        .ok_or_else(|| SimhuntError::build("build succeeded but produced no .app"))
}

/// Install an app and work out its bundle id
pub async fn install_app(
    ctx: &RunContext,
    app_path: &Path,
    bundle_id: Option<&str>,
) -> SimhuntResult<String> {
    ctx.phase(Phase::Installing, format!("installing {}", app_path.display()));
    ctx.toolchain
        .device
        .install_app(ctx.udid(), app_path)
        .await?;
    match bundle_id {
        Some(id) => Ok(id.to_string()),
        None => ctx.toolchain.builder.bundle_id_for(app_path).await,
    }
}

/// Build and/or install per `source`; returns the bundle id to launch
pub async fn provision(ctx: &RunContext, source: &AppSource) -> SimhuntResult<String> {
    let app_path = if source.is_buildable() {
        Some(build_app(ctx, source).await?)
    } else {
        source.app_path.clone()
    };
    match (app_path, &source.bundle_id) {
        (Some(path), bundle) => install_app(ctx, &path, bundle.as_deref()).await,
        (None, Some(bundle)) => Ok(bundle.clone()),
        (None, None) => Err(SimhuntError::validation("no app to run")),
    }
}

/// Terminate and relaunch, retrying up to `attempts` times.
///
/// Returns the last launch error when every attempt fails.
pub async fn relaunch_with_retry(
    device: &dyn DeviceControl,
    udid: &str,
    bundle_id: &str,
    attempts: u32,
    backoff: Duration,
) -> SimhuntResult<()> {
    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        if let Err(e) = device.terminate_app(udid, bundle_id).await {
            tracing::debug!(error = %e, "terminate before relaunch failed");
        }
        match device.launch_app(udid, bundle_id).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(attempt, attempts, error = %e, "relaunch failed");
                last_error = Some(e);
            }
        }
        if attempt < attempts && !backoff.is_zero() {
            tokio::time::sleep(backoff).await;
        }
    }
    Err(last_error.unwrap_or_else(|| SimhuntError::device("relaunch failed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSimulator;

    mod validation_tests {
        use super::*;

        #[test]
        fn test_scheme_without_project_is_mismatch() {
            let source = AppSource {
                scheme: Some("App".to_string()),
                bundle_id: Some("com.x".to_string()),
                ..AppSource::default()
            };
            let err = source.validate(true).unwrap_err();
            assert!(err.to_string().contains("without project_path"));
        }

        #[test]
        fn test_project_without_scheme() {
            let source = AppSource {
                project_path: Some(PathBuf::from("App.xcodeproj")),
                ..AppSource::default()
            };
            assert!(source.validate(false).is_err());
        }

        #[test]
        fn test_project_extension_checked() {
            assert!(AppSource::project("App.xcworkspace", "App").validate(true).is_ok());
            assert!(AppSource::project("App.xcodeproj", "App").validate(true).is_ok());
            let err = AppSource::project("Package.swift", "App").validate(true).unwrap_err();
            assert!(err.is_validation());
        }

        #[test]
        fn test_some_source_required() {
            assert!(AppSource::default().validate(true).is_err());
            assert!(AppSource::default().validate(false).is_ok());
            assert!(AppSource::installed("com.x").validate(true).is_ok());
            let prebuilt = AppSource {
                app_path: Some(PathBuf::from("/tmp/App.app")),
                ..AppSource::default()
            };
            assert!(prebuilt.validate(true).is_ok());
        }

        #[test]
        fn test_blank_bundle_rejected() {
            assert!(AppSource::installed("  ").validate(true).is_err());
        }
    }

    mod relaunch_tests {
        use super::*;

        #[tokio::test]
        async fn test_first_attempt_succeeds() {
            let sim = MockSimulator::new();
            relaunch_with_retry(&sim, "MOCK-UDID-1", "b", 3, Duration::ZERO)
                .await
                .unwrap();
            assert_eq!(sim.launches(), 1);
            assert_eq!(sim.call_count("terminate:"), 1);
        }

        #[tokio::test]
        async fn test_bounded_attempts() {
            let sim = MockSimulator::new().with_launch_failure_after(0);
            let err = relaunch_with_retry(&sim, "MOCK-UDID-1", "b", 3, Duration::ZERO)
                .await
                .unwrap_err();
            assert!(matches!(err, SimhuntError::Launch { .. }));
            assert_eq!(sim.launches(), 3);
        }
    }
}
