//! Store authorities: where the latest published version of an app lives.
//!
//! Both clients follow the same policy: any failure (missing credentials,
//! rejected token, empty track, unreachable API) is logged and reported as
//! `None`. One platform's broken setup never aborts lookups on the other.

mod android;
mod ios;
pub mod jwt;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identity::AppIdentity;

pub use android::{AndroidStoreClient, ServiceAccount};
pub use ios::{ApiKeyConfig, IosStoreClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Latest published record for one app on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreVersionInfo {
    /// Human version string, absent when the store record carried none we could parse.
    pub version_name: Option<String>,
    /// Build code; 0 means unknown.
    pub version_code: u64,
    pub source: Platform,
}

/// A store authority that can report an app's latest published version.
#[async_trait]
pub trait VersionStoreClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// Latest version for `identity`, or `None` when it can't be determined.
    async fn latest_version(&self, identity: &AppIdentity) -> Option<StoreVersionInfo>;
}
