//! App Store Connect client.
//!
//! Resolves the app id from its bundle id, then reads the most recently
//! uploaded build together with its pre-release (marketing) version.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Platform, StoreVersionInfo, VersionStoreClient, jwt};
use crate::error::{EngineError, Result};
use crate::identity::AppIdentity;

const API_BASE: &str = "https://api.appstoreconnect.apple.com/v1";
const AUDIENCE: &str = "appstoreconnect-v1";
/// App Store Connect rejects tokens living longer than 20 minutes.
const TOKEN_LIFETIME_SECS: i64 = 20 * 60;
const CONFIG_FILE: &str = "config.json";

/// Contents of the API-key directory's `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    #[serde(alias = "keyId")]
    pub key_id: String,
    #[serde(alias = "issuerId")]
    pub issuer_id: String,
}

impl ApiKeyConfig {
    /// Load the key config and the matching `AuthKey_<key_id>.p8` from `dir`.
    pub fn load(dir: &Path) -> Result<(Self, String)> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(EngineError::CredentialMissing(config_path));
        }
        let raw = std::fs::read_to_string(&config_path)?;
        let config: ApiKeyConfig = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Credential(format!("{}: {e}", config_path.display())))?;

        let key_path = dir.join(format!("AuthKey_{}.p8", config.key_id));
        if !key_path.exists() {
            return Err(EngineError::CredentialMissing(key_path));
        }
        let pem = std::fs::read_to_string(&key_path)?;
        Ok((config, pem))
    }

    fn bearer_token(&self, private_key_pem: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "iss": self.issuer_id,
            "iat": now,
            "exp": now + TOKEN_LIFETIME_SECS,
            "aud": AUDIENCE,
        });
        jwt::sign_es256(private_key_pem, &self.key_id, &claims)
    }
}

pub struct IosStoreClient {
    key_dir: PathBuf,
    http: reqwest::Client,
}

impl IosStoreClient {
    pub fn new(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Latest uploaded build for `bundle_id`.
    pub async fn latest_ios_version(&self, bundle_id: &str) -> Option<StoreVersionInfo> {
        match self.fetch_latest(bundle_id).await {
            Ok(Some(info)) => Some(info),
            Ok(None) => {
                tracing::warn!(bundle_id = %bundle_id, "No app or builds found");
                None
            }
            Err(EngineError::CredentialMissing(path)) => {
                tracing::warn!(path = %path.display(), "iOS credentials missing, skipping");
                None
            }
            Err(e) => {
                tracing::warn!(bundle_id = %bundle_id, error = %e, "iOS version lookup failed");
                None
            }
        }
    }

    async fn fetch_latest(&self, bundle_id: &str) -> Result<Option<StoreVersionInfo>> {
        let (config, pem) = ApiKeyConfig::load(&self.key_dir)?;
        let token = config.bearer_token(&pem)?;

        let apps = self
            .get_json(&format!("{API_BASE}/apps"), &[("filter[bundleId]", bundle_id)], &token)
            .await?;
        let Some(app_id) = apps["data"][0]["id"].as_str() else {
            return Ok(None);
        };

        let builds = self
            .get_json(
                &format!("{API_BASE}/builds"),
                &[
                    ("filter[app]", app_id),
                    ("sort", "-uploadedDate"),
                    ("limit", "1"),
                    ("include", "preReleaseVersion"),
                ],
                &token,
            )
            .await?;

        Ok(latest_from_builds(&builds))
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)], token: &str) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::RemoteUnavailable(format!("{url} returned {status}: {body}")));
        }
        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait]
impl VersionStoreClient for IosStoreClient {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn latest_version(&self, identity: &AppIdentity) -> Option<StoreVersionInfo> {
        self.latest_ios_version(&identity.ios_bundle_id).await
    }
}

/// Build number and pre-release version of the first build in a `/builds` response.
fn latest_from_builds(doc: &Value) -> Option<StoreVersionInfo> {
    let build = doc["data"].as_array()?.first()?;
    let raw_number = build["attributes"]["version"].as_str().unwrap_or("");
    let version_code = parse_build_number(raw_number);

    let pre_release_id = build["relationships"]["preReleaseVersion"]["data"]["id"].as_str();
    let version_name = doc["included"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|item| item["type"] == "preReleaseVersions")
        .find(|item| pre_release_id.is_none() || item["id"].as_str() == pre_release_id)
        .and_then(|item| item["attributes"]["version"].as_str())
        .map(str::to_string);

    Some(StoreVersionInfo {
        version_name,
        version_code,
        source: Platform::Ios,
    })
}

/// Build numbers are usually integers; dotted ones contribute their last component.
fn parse_build_number(raw: &str) -> u64 {
    let raw = raw.trim();
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.rsplit('.').next().and_then(|last| last.parse().ok()))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_with_pre_release_version() {
        let doc = json!({
            "data": [{
                "id": "build-1",
                "attributes": { "version": "87" },
                "relationships": { "preReleaseVersion": { "data": { "type": "preReleaseVersions", "id": "prv-9" } } }
            }],
            "included": [
                { "type": "apps", "id": "app-1" },
                { "type": "preReleaseVersions", "id": "prv-9", "attributes": { "version": "3.2.0" } }
            ]
        });
        let info = latest_from_builds(&doc).unwrap();
        assert_eq!(info.version_code, 87);
        assert_eq!(info.version_name.as_deref(), Some("3.2.0"));
        assert_eq!(info.source, Platform::Ios);
    }

    #[test]
    fn no_builds_is_none() {
        assert!(latest_from_builds(&json!({ "data": [] })).is_none());
        assert!(latest_from_builds(&json!({})).is_none());
    }

    #[test]
    fn build_without_included_version_has_no_name() {
        let doc = json!({ "data": [{ "attributes": { "version": "12" } }] });
        let info = latest_from_builds(&doc).unwrap();
        assert_eq!(info.version_code, 12);
        assert!(info.version_name.is_none());
    }

    #[test]
    fn dotted_build_numbers_use_last_component() {
        assert_eq!(parse_build_number("1.4.33"), 33);
        assert_eq!(parse_build_number("abc"), 0);
    }

    #[test]
    fn missing_key_file_is_credential_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"key_id": "ABC123", "issuer_id": "iss"}"#,
        )
        .unwrap();
        let err = ApiKeyConfig::load(dir.path()).unwrap_err();
        assert!(
            matches!(err, EngineError::CredentialMissing(p) if p.ends_with("AuthKey_ABC123.p8"))
        );
    }

    #[tokio::test]
    async fn lookup_without_credentials_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let client = IosStoreClient::new(dir.path());
        assert!(client.latest_ios_version("com.acme.Shop").await.is_none());
    }
}
