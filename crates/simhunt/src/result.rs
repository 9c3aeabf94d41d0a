//! Result and error types for Simhunt.

use thiserror::Error;

/// Result type for Simhunt operations
pub type SimhuntResult<T> = Result<T, SimhuntError>;

/// Errors that can occur in Simhunt
#[derive(Debug, Error)]
pub enum SimhuntError {
    /// Playbook options failed validation
    #[error("Invalid options: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// No simulator matched the request and none could be booted
    #[error("No simulator found: {message}")]
    DeviceNotFound {
        /// Error message
        message: String,
    },

    /// Device-control call failed
    #[error("Device control failed: {message}")]
    Device {
        /// Error message
        message: String,
    },

    /// Build failed
    #[error("Build failed: {message}")]
    Build {
        /// Error message
        message: String,
    },

    /// App installation failed
    #[error("Install of {app_path} failed: {message}")]
    Install {
        /// App bundle that failed to install
        app_path: String,
        /// Error message
        message: String,
    },

    /// App launch failed
    #[error("Launch of {bundle_id} failed: {message}")]
    Launch {
        /// Bundle identifier
        bundle_id: String,
        /// Error message
        message: String,
    },

    /// UI tree inspection failed
    #[error("UI inspection failed: {message}")]
    Inspection {
        /// Error message
        message: String,
    },

    /// Screenshot capture failed
    #[error("Screenshot failed: {message}")]
    Capture {
        /// Error message
        message: String,
    },

    /// Log stream or crash log query failed
    #[error("Log stream error: {message}")]
    LogStream {
        /// Error message
        message: String,
    },

    /// Baseline file could not be read or written
    #[error("Baseline error at {path}: {message}")]
    Baseline {
        /// Baseline file path
        path: String,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimhuntError {
    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a device-control error
    #[must_use]
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    /// Create a build error
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }

    /// Whether this error was raised before any device interaction
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message() {
        let err = SimhuntError::validation("duration must be between 1 and 86400 seconds");
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Invalid options: duration must be between 1 and 86400 seconds"
        );
    }

    #[test]
    fn test_launch_message_names_bundle() {
        let err = SimhuntError::Launch {
            bundle_id: "com.example.app".to_string(),
            message: "process exited".to_string(),
        };
        assert!(!err.is_validation());
        assert!(err.to_string().contains("com.example.app"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SimhuntError = io.into();
        assert!(matches!(err, SimhuntError::Io(_)));
    }
}
