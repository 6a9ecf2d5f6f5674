//! Bot configuration.
//!
//! Read from `shipyard.toml`; defaults to `~/.config/shipyard/shipyard.toml`.
//! Relative paths resolve against `project_dir`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use shipyard_engine::OrchestratorConfig;
use shipyard_engine::identity::PackageRewrite;

pub const DEFAULT_SCRIPT_PATH: &str = "build.sh";
pub const DEFAULT_IOS_MARKER: &str = "ios";
pub const DEFAULT_ANDROID_TRACK: &str = "internal";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the app repository; builds and git commands run here.
    pub project_dir: PathBuf,
    pub script_path: PathBuf,
    pub ios_command_marker: String,
    /// JSON document listing every app's package/bundle identifiers.
    pub identity_config_url: String,
    /// Defaults to `<project_dir>/credentials`.
    pub credentials_dir: Option<PathBuf>,
    pub service_account_file: PathBuf,
    pub api_key_dir: PathBuf,
    pub android_track: String,
    pub known_apps: Vec<String>,
    pub version_lookup_timeout_secs: Option<u64>,
    pub package_rewrite: PackageRewrite,
    pub model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            script_path: PathBuf::from(DEFAULT_SCRIPT_PATH),
            ios_command_marker: DEFAULT_IOS_MARKER.to_string(),
            identity_config_url: String::new(),
            credentials_dir: None,
            service_account_file: PathBuf::from("service-account.json"),
            api_key_dir: PathBuf::from("app-store-connect"),
            android_track: DEFAULT_ANDROID_TRACK.to_string(),
            known_apps: Vec::new(),
            version_lookup_timeout_secs: None,
            package_rewrite: PackageRewrite::default(),
            model: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shipyard")
        .join("shipyard.toml")
}

impl Config {
    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Bad config file {}", path.display()))
    }

    fn in_project(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn script_path(&self) -> PathBuf {
        self.in_project(&self.script_path)
    }

    pub fn credentials_dir(&self) -> PathBuf {
        match &self.credentials_dir {
            Some(dir) => self.in_project(dir),
            None => self.project_dir.join("credentials"),
        }
    }

    pub fn service_account_path(&self) -> PathBuf {
        self.credentials_dir().join(&self.service_account_file)
    }

    pub fn api_key_path(&self) -> PathBuf {
        self.credentials_dir().join(&self.api_key_dir)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            project_dir: self.project_dir.clone(),
            script_path: self.script_path(),
            ios_command_marker: self.ios_command_marker.clone(),
            version_lookup_timeout: self.version_lookup_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.ios_command_marker, "ios");
        assert_eq!(config.android_track, "internal");
        assert_eq!(
            config.service_account_path(),
            PathBuf::from("./credentials/service-account.json")
        );
    }

    #[test]
    fn parses_file_and_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipyard.toml");
        std::fs::write(
            &path,
            r#"
project_dir = "/srv/apps"
script_path = "scripts/build.sh"
credentials_dir = "/etc/shipyard"
identity_config_url = "https://config.example.com/apps.json"
known_apps = ["shop", "wallet"]
version_lookup_timeout_secs = 30

[package_rewrite]
buckets = ["white-label"]
from = "com.example"
to = "com.partner"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.known_apps, vec!["shop", "wallet"]);
        assert_eq!(config.script_path(), PathBuf::from("/srv/apps/scripts/build.sh"));
        assert_eq!(config.api_key_path(), PathBuf::from("/etc/shipyard/app-store-connect"));
        assert_eq!(config.package_rewrite.to, "com.partner");

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.project_dir, PathBuf::from("/srv/apps"));
        assert_eq!(orchestrator.version_lookup_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipyard.toml");
        std::fs::write(&path, "known_apps = \"not a list\"").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
