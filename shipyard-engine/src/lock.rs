//! Single-flight build gate.
//!
//! At most one [`BuildGuard`] exists at a time. Dropping the guard frees the
//! gate, so every exit path of a build (early return, `?`, panic unwinding)
//! releases it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::store::Platform;

/// What currently holds the gate.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveBuild {
    pub apps: Vec<String>,
    pub platform: Platform,
    pub branch: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl fmt::Display for ActiveBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} build of {}", self.platform, self.apps.join(", "))?;
        if let Some(branch) = &self.branch {
            write!(f, " on {branch}")?;
        }
        write!(f, " since {} UTC", self.started_at.format("%H:%M:%S"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildLock {
    slot: Arc<Mutex<Option<ActiveBuild>>>,
}

impl BuildLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, or return the build that holds it.
    pub fn try_acquire(&self, build: ActiveBuild) -> Result<BuildGuard, ActiveBuild> {
        let mut slot = self.slot.lock();
        if let Some(active) = slot.as_ref() {
            return Err(active.clone());
        }
        *slot = Some(build);
        Ok(BuildGuard {
            slot: Arc::clone(&self.slot),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn active(&self) -> Option<ActiveBuild> {
        self.slot.lock().clone()
    }
}

/// Proof of holding the gate. Releases on drop.
#[derive(Debug)]
pub struct BuildGuard {
    slot: Arc<Mutex<Option<ActiveBuild>>>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}
