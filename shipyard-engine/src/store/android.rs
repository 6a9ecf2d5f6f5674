//! Android publisher API client.
//!
//! Reads the newest release on a fixed track through a throwaway edit:
//! create edit, read track, delete edit. The edit is never committed.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use super::{Platform, StoreVersionInfo, VersionStoreClient, jwt};
use crate::error::{EngineError, Result};
use crate::identity::AppIdentity;

const PUBLISHER_API: &str = "https://androidpublisher.googleapis.com/androidpublisher/v3/applications";
const PUBLISHER_SCOPE: &str = "https://www.googleapis.com/auth/androidpublisher";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

static PAREN_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+(?:\.\d+)*)\)").expect("valid regex"));

/// Fields of a service-account key file that the token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccount {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EngineError::CredentialMissing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| EngineError::Credential(format!("{}: {e}", path.display())))
    }

    /// Signed assertion for the jwt-bearer grant, valid for one hour.
    fn assertion(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "iss": self.client_email,
            "scope": PUBLISHER_SCOPE,
            "aud": self.token_uri,
            "iat": now,
            "exp": now + 3600,
        });
        jwt::sign_rs256(&self.private_key, &claims)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Track {
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Release {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version_codes: Vec<String>,
}

pub struct AndroidStoreClient {
    credentials_path: PathBuf,
    track: String,
    http: reqwest::Client,
}

impl AndroidStoreClient {
    pub fn new(credentials_path: impl Into<PathBuf>, track: impl Into<String>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            track: track.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Latest release on the configured track for `package_name`.
    pub async fn latest_android_version(&self, package_name: &str) -> Option<StoreVersionInfo> {
        match self.fetch_latest(package_name).await {
            Ok(Some(info)) => Some(info),
            Ok(None) => {
                tracing::warn!(package = %package_name, track = %self.track, "No releases on track");
                None
            }
            Err(EngineError::CredentialMissing(path)) => {
                tracing::warn!(path = %path.display(), "Android credentials missing, skipping");
                None
            }
            Err(e) => {
                tracing::warn!(package = %package_name, error = %e, "Android version lookup failed");
                None
            }
        }
    }

    async fn fetch_latest(&self, package_name: &str) -> Result<Option<StoreVersionInfo>> {
        let account = ServiceAccount::load(&self.credentials_path)?;
        let token = self.access_token(&account).await?;

        let edit_id = self.create_edit(package_name, &token).await?;
        let track = self.read_track(package_name, &edit_id, &token).await;
        if let Err(e) = self.delete_edit(package_name, &edit_id, &token).await {
            tracing::warn!(package = %package_name, edit = %edit_id, error = %e, "Failed to delete edit");
        }

        Ok(latest_from_track(&track?))
    }

    async fn access_token(&self, account: &ServiceAccount) -> Result<String> {
        let assertion = account.assertion()?;
        let resp = self
            .http
            .post(&account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::RemoteUnavailable(format!(
                "token exchange failed {status}: {body}"
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::RemoteUnavailable("no access_token in response".into()))
    }

    async fn create_edit(&self, package_name: &str, token: &str) -> Result<String> {
        let resp = self
            .http
            .post(format!("{PUBLISHER_API}/{package_name}/edits"))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::RemoteUnavailable(format!(
                "create edit failed {status}: {body}"
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::RemoteUnavailable("no edit id in response".into()))
    }

    async fn read_track(&self, package_name: &str, edit_id: &str, token: &str) -> Result<Track> {
        let resp = self
            .http
            .get(format!(
                "{PUBLISHER_API}/{package_name}/edits/{edit_id}/tracks/{}",
                self.track
            ))
            .bearer_auth(token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::RemoteUnavailable(format!(
                "read track failed {status}: {body}"
            )));
        }

        Ok(resp.json::<Track>().await?)
    }

    async fn delete_edit(&self, package_name: &str, edit_id: &str, token: &str) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{PUBLISHER_API}/{package_name}/edits/{edit_id}"))
            .bearer_auth(token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(EngineError::RemoteUnavailable(format!(
                "delete edit returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VersionStoreClient for AndroidStoreClient {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn latest_version(&self, identity: &AppIdentity) -> Option<StoreVersionInfo> {
        self.latest_android_version(&identity.android_package_name).await
    }
}

/// Newest release on the track: the largest listed code and the `(x.y.z)` in its name.
fn latest_from_track(track: &Track) -> Option<StoreVersionInfo> {
    let release = track.releases.first()?;
    let version_code = release
        .version_codes
        .iter()
        .filter_map(|c| c.trim().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    let version_name = release
        .name
        .as_deref()
        .and_then(|name| PAREN_VERSION.captures(name))
        .map(|c| c[1].to_string());

    Some(StoreVersionInfo {
        version_name,
        version_code,
        source: Platform::Android,
    })
}
