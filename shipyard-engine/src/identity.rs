//! App identity lookup against the remote app config.
//!
//! The config endpoint serves a JSON object keyed by internal app name:
//!
//! ```json
//! { "shop": { "android_package": "com.acme.shop", "ios_bundle_id": "com.acme.Shop", "bucket": "cn" } }
//! ```
//!
//! Identities are fetched fresh on every call; nothing is cached.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Platform identifiers for one app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub app_name: String,
    /// Package name as used by the Android store client (after any rewrite).
    pub android_package_name: String,
    pub ios_bundle_id: String,
    pub bucket_tag: String,
}

/// Namespace substitution applied to Android package names of flagged buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRewrite {
    /// Bucket tags the rewrite applies to.
    #[serde(default)]
    pub buckets: Vec<String>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

impl PackageRewrite {
    /// Rewrite `package` if `bucket` is flagged. Only the first occurrence of
    /// `from` is replaced.
    pub fn apply(&self, bucket: &str, package: &str) -> String {
        if self.from.is_empty() || !self.buckets.iter().any(|b| b == bucket) {
            return package.to_string();
        }
        package.replacen(&self.from, &self.to, 1)
    }
}

/// Raw entry as served by the config endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigEntry {
    #[serde(default, alias = "package_name", alias = "packageName")]
    android_package: String,
    #[serde(default, alias = "bundle_id", alias = "bundleId")]
    ios_bundle_id: String,
    #[serde(default, alias = "bucket_tag")]
    bucket: String,
}

/// Anything that can map an app name to its platform identifiers.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, app_name: &str) -> Result<AppIdentity>;
}

/// Resolver backed by the remote JSON config endpoint.
pub struct RemoteConfigResolver {
    url: String,
    rewrite: PackageRewrite,
    http: reqwest::Client,
}

impl RemoteConfigResolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            rewrite: PackageRewrite::default(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_rewrite(mut self, rewrite: PackageRewrite) -> Self {
        self.rewrite = rewrite;
        self
    }

    async fn fetch_config(&self) -> Result<serde_json::Value> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| EngineError::RemoteUnavailable(format!("config fetch failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::RemoteUnavailable(format!(
                "config endpoint returned {status}"
            )));
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| EngineError::RemoteUnavailable(format!("bad config document: {e}")))
    }
}

#[async_trait]
impl IdentityResolver for RemoteConfigResolver {
    async fn resolve(&self, app_name: &str) -> Result<AppIdentity> {
        let config = self.fetch_config().await?;
        identity_from_config(&config, app_name, &self.rewrite)
    }
}

/// Look up `app_name` in a fetched config document.
pub fn identity_from_config(
    config: &serde_json::Value,
    app_name: &str,
    rewrite: &PackageRewrite,
) -> Result<AppIdentity> {
    let raw = config
        .get(app_name)
        .ok_or_else(|| EngineError::ConfigNotFound(app_name.to_string()))?;
    let entry: ConfigEntry = serde_json::from_value(raw.clone())
        .map_err(|_| EngineError::ConfigNotFound(app_name.to_string()))?;

    Ok(AppIdentity {
        app_name: app_name.to_string(),
        android_package_name: rewrite.apply(&entry.bucket, &entry.android_package),
        ios_bundle_id: entry.ios_bundle_id,
        bucket_tag: entry.bucket,
    })
}
