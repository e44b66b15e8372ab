//! Error taxonomy for the plugin runtime.
//!
//! Every failure the build, load, registration and dispatch paths can
//! produce has its own variant. [`PluginError`] converts into
//! [`hookwire_core::AppError`] at the application boundary.

use std::path::PathBuf;

use hookwire_core::error::{AppError, ErrorKind};
use thiserror::Error;

/// Result type for plugin runtime operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Failure reported by a behavior's own `execute`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BehaviorError {
    /// Human-readable failure description.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BehaviorError {
    /// Creates a behavior failure with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a behavior failure wrapping an underlying error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<String> for BehaviorError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for BehaviorError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors raised by the plugin runtime.
#[derive(Debug, Error)]
pub enum PluginError {
    // --- Build pipeline ---
    /// The unit's source directory does not exist.
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// The unit's source tree could not be read.
    #[error("Source tree unreadable at {}: {source}", path.display())]
    SourceUnreadable {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The toolchain exited non-zero or produced no artifact.
    #[error("Build of '{unit}' failed:\n{diagnostics}")]
    BuildFailed {
        /// Build unit name.
        unit: String,
        /// Captured compiler output.
        diagnostics: String,
    },

    // --- Loader ---
    /// The artifact could not be opened, or its entry symbol is missing or mistyped.
    #[error("Failed to load plugin '{identity}': {reason}")]
    LoadFailed {
        /// Plugin identity.
        identity: String,
        /// Why the load failed.
        reason: String,
    },

    /// Dynamic loading is not available on this host or build.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    // --- Dispatch table ---
    /// A behavior with the same name already exists at the hook point.
    #[error("Behavior '{name}' is already registered at hook point '{hook}'")]
    NamedConflict {
        /// Hook point key.
        hook: String,
        /// Conflicting behavior name.
        name: String,
    },

    /// No behaviors are registered at the hook point.
    #[error("Hook point '{0}' does not exist")]
    UnknownHookPoint(String),

    /// The hook point exists but the behavior is not registered there.
    #[error("Behavior '{name}' is not registered at hook point '{hook}'")]
    UnknownBehavior {
        /// Hook point key.
        hook: String,
        /// Missing behavior name.
        name: String,
    },

    /// A hook point key could not be parsed.
    #[error("Invalid hook point key '{0}': expected '{{entity}}.{{before|after}}.{{action}}'")]
    InvalidHookKey(String),

    /// A behavior failed; the remaining chain was not run.
    #[error("Behavior '{name}' failed: {source}")]
    BehaviorFailed {
        /// Failing behavior name.
        name: String,
        /// The behavior's own failure.
        #[source]
        source: BehaviorError,
    },

    // --- Static registry ---
    /// Two compiled-in units declared the same identity. Fatal at setup.
    #[error("Plugin identity '{0}' registered twice")]
    DuplicateIdentity(String),

    /// Registration attempted after the registry was sealed.
    #[error("Registry is sealed; cannot register '{0}' outside the setup phase")]
    RegistrationClosed(String),

    /// No registry entry or loaded artifact exists for the identity.
    #[error("Plugin '{0}' is not registered")]
    UnknownIdentity(String),

    /// The registry entry declares no hook point.
    #[error("Plugin '{0}' declares no hook point")]
    MissingHookPoint(String),

    /// The registry entry is disabled and cannot be loaded.
    #[error("Plugin '{0}' is disabled")]
    Disabled(String),

    // --- Watcher ---
    /// The filesystem watcher failed.
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Returns the application-level category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound(_) | Self::UnknownHookPoint(_) | Self::UnknownBehavior { .. } => {
                ErrorKind::NotFound
            }
            Self::UnknownIdentity(_) => ErrorKind::NotFound,
            Self::NamedConflict { .. } | Self::DuplicateIdentity(_) => ErrorKind::Conflict,
            Self::InvalidHookKey(_) | Self::MissingHookPoint(_) => ErrorKind::Validation,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::SourceUnreadable { .. } | Self::Io(_) => ErrorKind::Io,
            Self::RegistrationClosed(_) => ErrorKind::Configuration,
            Self::BuildFailed { .. }
            | Self::LoadFailed { .. }
            | Self::BehaviorFailed { .. }
            | Self::Disabled(_)
            | Self::Watcher(_) => ErrorKind::Plugin,
        }
    }

    /// Creates a load failure.
    pub fn load_failed(identity: &str, reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            identity: identity.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        AppError::with_source(kind, message, err)
    }
}

impl From<notify::Error> for PluginError {
    fn from(err: notify::Error) -> Self {
        Self::Watcher(err.to_string())
    }
}
