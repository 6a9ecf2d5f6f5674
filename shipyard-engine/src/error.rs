//! Error taxonomy shared by every engine component.

use std::path::PathBuf;

/// Convenience alias used across the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The app has no entry in the remote identity config.
    #[error("No identity config for app '{0}'")]
    ConfigNotFound(String),

    /// Credentials for a store authority are absent. Callers treat this as a soft skip.
    #[error("Credentials missing: {}", .0.display())]
    CredentialMissing(PathBuf),

    /// Credential material exists but could not be parsed or used for signing.
    #[error("Invalid credential: {0}")]
    Credential(String),

    /// A remote endpoint could not be reached or answered with a non-success status.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Branch '{input}' is ambiguous: {}", .candidates.join(", "))]
    BranchAmbiguous {
        input: String,
        candidates: Vec<String>,
    },

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    /// Listing or checking out branches failed.
    #[error("Could not switch to branch '{branch}': {reason}")]
    BranchSwitch { branch: String, reason: String },

    /// Another build holds the gate; carries a description of it.
    #[error("A build is already in progress: {0}")]
    BuildBusy(String),

    #[error("No apps found in the build script")]
    NoApps,

    #[error("Version lookup failed: {0}")]
    VersionLookup(String),

    #[error("Command exited with code {code:?}")]
    ExecutionFailed { code: Option<i32>, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::RemoteUnavailable(e.to_string())
    }
}
