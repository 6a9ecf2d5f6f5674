//! Version resolution: fan out store lookups across apps and compute the next build.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::error::EngineError;
use crate::identity::IdentityResolver;
use crate::semver;
use crate::store::{Platform, StoreVersionInfo, VersionStoreClient};

/// Used when no app yielded any store data.
pub const BOOTSTRAP_VERSION_NAME: &str = "1.0.1";
pub const BOOTSTRAP_BUILD_NUMBER: u64 = 2;
/// Used when store data exists but none of it carried a version name.
pub const FALLBACK_VERSION_NAME: &str = "1.0.1";

/// The version/build to stamp on the next build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedVersion {
    pub version_name: String,
    pub build_number: u64,
}

impl ResolvedVersion {
    pub fn bootstrap() -> Self {
        Self {
            version_name: BOOTSTRAP_VERSION_NAME.to_string(),
            build_number: BOOTSTRAP_BUILD_NUMBER,
        }
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version_name, self.build_number)
    }
}

/// Next version from whatever records the stores returned.
///
/// The greatest code and the greatest name are picked independently, so they
/// may come from different records. The build number is always `max code + 1`,
/// and only the last component of the name is bumped.
pub fn next_version(records: &[StoreVersionInfo]) -> ResolvedVersion {
    if records.is_empty() {
        return ResolvedVersion::bootstrap();
    }

    let max_code = records.iter().map(|r| r.version_code).max().unwrap_or(0);
    let max_name = semver::max_version(records.iter().filter_map(|r| r.version_name.as_deref()));

    ResolvedVersion {
        version_name: max_name
            .map(semver::increment_last)
            .unwrap_or_else(|| FALLBACK_VERSION_NAME.to_string()),
        build_number: max_code + 1,
    }
}

/// Which platforms a version report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFilter {
    Only(Platform),
    All,
}

impl PlatformFilter {
    pub fn platforms(self) -> Vec<Platform> {
        match self {
            PlatformFilter::Only(p) => vec![p],
            PlatformFilter::All => vec![Platform::Android, Platform::Ios],
        }
    }
}

impl FromStr for PlatformFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" | "both" => Ok(PlatformFilter::All),
            other => other.parse().map(PlatformFilter::Only),
        }
    }
}

/// One app's row in a version report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppVersions {
    pub app: String,
    pub platforms: Vec<(Platform, Option<StoreVersionInfo>)>,
    /// Set when the app's identity could not be resolved at all.
    pub error: Option<String>,
}

impl AppVersions {
    fn failed(app: &str, error: impl Into<String>) -> Self {
        Self {
            app: app.to_string(),
            platforms: Vec::new(),
            error: Some(error.into()),
        }
    }
}

impl fmt::Display for AppVersions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(err) = &self.error {
            return write!(f, "{}: ❌ {err}", self.app);
        }
        let cells: Vec<String> = self
            .platforms
            .iter()
            .map(|(platform, info)| match info {
                Some(StoreVersionInfo {
                    version_name,
                    version_code,
                    ..
                }) => format!(
                    "{platform} {} ({version_code})",
                    version_name.as_deref().unwrap_or("?")
                ),
                None => format!("{platform} n/a"),
            })
            .collect();
        write!(f, "{}: {}", self.app, cells.join(" | "))
    }
}

/// Per-app store versions, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionsReport {
    pub entries: Vec<AppVersions>,
}

impl fmt::Display for VersionsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Fans identity + store lookups out across apps.
#[derive(Clone)]
pub struct VersionResolver {
    identity: Arc<dyn IdentityResolver>,
    android: Arc<dyn VersionStoreClient>,
    ios: Arc<dyn VersionStoreClient>,
}

impl VersionResolver {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        android: Arc<dyn VersionStoreClient>,
        ios: Arc<dyn VersionStoreClient>,
    ) -> Self {
        Self {
            identity,
            android,
            ios,
        }
    }

    fn store(&self, platform: Platform) -> Arc<dyn VersionStoreClient> {
        match platform {
            Platform::Android => Arc::clone(&self.android),
            Platform::Ios => Arc::clone(&self.ios),
        }
    }

    /// Latest store record per app on `platform`. Each app is looked up in its
    /// own task; a failing or panicking lookup is logged and contributes nothing.
    pub async fn collect_latest(
        &self,
        apps: &[String],
        platform: Platform,
    ) -> Vec<StoreVersionInfo> {
        let mut tasks = JoinSet::new();
        for app in apps.iter().cloned() {
            let identity = Arc::clone(&self.identity);
            let store = self.store(platform);
            tasks.spawn(async move {
                let id = identity.resolve(&app).await?;
                let info = store.latest_version(&id).await;
                Ok::<_, EngineError>((app, info))
            });
        }

        let mut records = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((app, Some(info)))) => {
                    tracing::debug!(app = %app, %platform, code = info.version_code, "Store version found");
                    records.push(info);
                }
                Ok(Ok((app, None))) => {
                    tracing::info!(app = %app, %platform, "No store version, skipping");
                }
                Ok(Err(e)) => {
                    tracing::warn!(%platform, error = %e, "App version lookup failed, skipping");
                }
                Err(e) => {
                    tracing::warn!(%platform, error = %e, "App version lookup task died, skipping");
                }
            }
        }
        records
    }

    pub async fn resolve_next_version(
        &self,
        apps: &[String],
        platform: Platform,
    ) -> ResolvedVersion {
        let records = self.collect_latest(apps, platform).await;
        let next = next_version(&records);
        tracing::info!(
            %platform,
            apps = apps.len(),
            found = records.len(),
            version = %next.version_name,
            build = next.build_number,
            "Resolved next version"
        );
        next
    }

    /// Current store versions for each app, without incrementing.
    pub async fn build_versions_report(
        &self,
        apps: &[String],
        filter: PlatformFilter,
    ) -> VersionsReport {
        let mut tasks = JoinSet::new();
        for (index, app) in apps.iter().cloned().enumerate() {
            let this = self.clone();
            tasks.spawn(async move { (index, this.app_versions(&app, filter).await) });
        }

        let mut entries: Vec<AppVersions> = apps
            .iter()
            .map(|app| AppVersions::failed(app, "lookup did not complete"))
            .collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, row)) => entries[index] = row,
                Err(e) => tracing::warn!(error = %e, "Version report task died"),
            }
        }
        VersionsReport { entries }
    }

    async fn app_versions(&self, app: &str, filter: PlatformFilter) -> AppVersions {
        let identity = match self.identity.resolve(app).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(app = %app, error = %e, "Identity lookup failed");
                return AppVersions::failed(app, e.to_string());
            }
        };

        let wanted = filter.platforms();
        let wants = |p: Platform| wanted.contains(&p);
        let (android, ios) = tokio::join!(
            async {
                if wants(Platform::Android) {
                    Some(self.android.latest_version(&identity).await)
                } else {
                    None
                }
            },
            async {
                if wants(Platform::Ios) {
                    Some(self.ios.latest_version(&identity).await)
                } else {
                    None
                }
            },
        );

        let mut platforms = Vec::new();
        if let Some(info) = android {
            platforms.push((Platform::Android, info));
        }
        if let Some(info) = ios {
            platforms.push((Platform::Ios, info));
        }
        AppVersions {
            app: app.to_string(),
            platforms,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: Option<&str>, code: u64, source: Platform) -> StoreVersionInfo {
        StoreVersionInfo {
            version_name: name.map(str::to_string),
            version_code: code,
            source,
        }
    }

    #[test]
    fn single_record_bumps_name_and_code() {
        let next = next_version(&[record(Some("1.2.3"), 10, Platform::Android)]);
        assert_eq!(
            next,
            ResolvedVersion {
                version_name: "1.2.4".into(),
                build_number: 11
            }
        );
    }

    #[test]
    fn no_records_is_bootstrap() {
        assert_eq!(
            next_version(&[]),
            ResolvedVersion {
                version_name: "1.0.1".into(),
                build_number: 2
            }
        );
    }

    #[test]
    fn name_and_code_maxima_are_independent() {
        let next = next_version(&[
            record(Some("2.0.0"), 5, Platform::Ios),
            record(Some("1.9.9"), 40, Platform::Android),
        ]);
        assert_eq!(next.version_name, "2.0.1");
        assert_eq!(next.build_number, 41);
    }

    #[test]
    fn result_does_not_depend_on_order() {
        let mut records = vec![
            record(Some("1.10.0"), 3, Platform::Android),
            record(Some("1.9.0"), 7, Platform::Android),
            record(None, 12, Platform::Android),
        ];
        let forward = next_version(&records);
        records.reverse();
        assert_eq!(forward, next_version(&records));
        assert_eq!(forward.version_name, "1.10.1");
        assert_eq!(forward.build_number, 13);
    }

    #[test]
    fn codes_without_names_use_fallback_name() {
        let next = next_version(&[record(None, 9, Platform::Ios)]);
        assert_eq!(next.version_name, FALLBACK_VERSION_NAME);
        assert_eq!(next.build_number, 10);
    }

    #[test]
    fn platform_filter_parses() {
        assert_eq!("all".parse::<PlatformFilter>().unwrap(), PlatformFilter::All);
        assert_eq!(
            "ios".parse::<PlatformFilter>().unwrap(),
            PlatformFilter::Only(Platform::Ios)
        );
        assert!("symbian".parse::<PlatformFilter>().is_err());
    }

    #[test]
    fn report_rows_render() {
        let row = AppVersions {
            app: "shop".into(),
            platforms: vec![
                (Platform::Android, Some(record(Some("2.4.1"), 512, Platform::Android))),
                (Platform::Ios, None),
            ],
            error: None,
        };
        assert_eq!(row.to_string(), "shop: android 2.4.1 (512) | ios n/a");
        assert_eq!(AppVersions::failed("ghost", "no config").to_string(), "ghost: ❌ no config");
    }
}
