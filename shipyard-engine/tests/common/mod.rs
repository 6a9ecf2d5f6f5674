//! In-process fakes for the engine's collaborators.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use shipyard_engine::error::{EngineError, Result};
use shipyard_engine::git::{BranchSource, CheckoutResult};
use shipyard_engine::identity::{AppIdentity, IdentityResolver};
use shipyard_engine::process::{OutputLine, OutputStream, ProcessOutcome, ProcessRunner};
use shipyard_engine::store::{Platform, StoreVersionInfo, VersionStoreClient};
use shipyard_engine::versions::VersionResolver;

pub fn identity(app: &str) -> AppIdentity {
    AppIdentity {
        app_name: app.to_string(),
        android_package_name: format!("com.acme.{app}"),
        ios_bundle_id: format!("com.acme.{app}.ios"),
        bucket_tag: "default".to_string(),
    }
}

/// Knows a fixed set of apps; anything else is `ConfigNotFound`.
pub struct FakeIdentity {
    known: Vec<String>,
}

impl FakeIdentity {
    pub fn new(apps: &[&str]) -> Self {
        Self {
            known: apps.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl IdentityResolver for FakeIdentity {
    async fn resolve(&self, app_name: &str) -> Result<AppIdentity> {
        if self.known.iter().any(|a| a == app_name) {
            Ok(identity(app_name))
        } else {
            Err(EngineError::ConfigNotFound(app_name.to_string()))
        }
    }
}

/// Serves canned records per app. Can be told to panic or stall for one app.
pub struct FakeStore {
    platform: Platform,
    records: HashMap<String, (Option<String>, u64)>,
    panic_for: Option<String>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeStore {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            records: HashMap::new(),
            panic_for: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, app: &str, name: Option<&str>, code: u64) -> Self {
        self.records.insert(app.to_string(), (name.map(str::to_string), code));
        self
    }

    pub fn panicking_for(mut self, app: &str) -> Self {
        self.panic_for = Some(app.to_string());
        self
    }

    pub fn stalling(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl VersionStoreClient for FakeStore {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn latest_version(&self, identity: &AppIdentity) -> Option<StoreVersionInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_for.as_deref() == Some(identity.app_name.as_str()) {
            panic!("store exploded for {}", identity.app_name);
        }
        self.records
            .get(&identity.app_name)
            .map(|(name, code)| StoreVersionInfo {
                version_name: name.clone(),
                version_code: *code,
                source: self.platform,
            })
    }
}

pub fn resolver(
    apps: &[&str],
    android: FakeStore,
    ios: FakeStore,
) -> VersionResolver {
    VersionResolver::new(
        Arc::new(FakeIdentity::new(apps)),
        Arc::new(android),
        Arc::new(ios),
    )
}

/// Remote branch list plus a record of checkouts.
pub struct FakeGit {
    branches: Vec<String>,
    fail_checkout: bool,
    pub checkouts: Mutex<Vec<String>>,
}

impl FakeGit {
    pub fn new(branches: &[&str]) -> Self {
        Self {
            branches: branches.iter().map(|s| s.to_string()).collect(),
            fail_checkout: false,
            checkouts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_checkout(mut self) -> Self {
        self.fail_checkout = true;
        self
    }
}

#[async_trait]
impl BranchSource for FakeGit {
    async fn list_remote_branches(&self) -> Result<Vec<String>> {
        Ok(self.branches.clone())
    }

    async fn checkout_and_pull(&self, branch: &str) -> CheckoutResult {
        self.checkouts.lock().push(branch.to_string());
        if self.fail_checkout {
            CheckoutResult {
                success: false,
                message: "local changes would be overwritten".to_string(),
            }
        } else {
            CheckoutResult {
                success: true,
                message: format!("Checked out and pulled {branch}"),
            }
        }
    }
}

/// Runner that signals when it starts and finishes only when released.
#[derive(Default)]
pub struct BlockingRunner {
    pub started: Notify,
    pub release: Notify,
    pub runs: AtomicUsize,
}

#[async_trait]
impl ProcessRunner for BlockingRunner {
    async fn run(
        &self,
        _command: &str,
        _working_dir: &Path,
        output: mpsc::UnboundedSender<OutputLine>,
    ) -> Result<ProcessOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let _ = output.send(OutputLine {
            stream: OutputStream::Stdout,
            line: "building...".to_string(),
        });
        self.started.notify_one();
        self.release.notified().await;
        Ok(ProcessOutcome {
            success: true,
            exit_code: Some(0),
            stderr_tail: String::new(),
        })
    }
}

/// Runner that dies mid-build.
pub struct PanickingRunner;

#[async_trait]
impl ProcessRunner for PanickingRunner {
    async fn run(
        &self,
        _command: &str,
        _working_dir: &Path,
        _output: mpsc::UnboundedSender<OutputLine>,
    ) -> Result<ProcessOutcome> {
        panic!("runner crashed mid-build");
    }
}

pub const SCRIPT: &str = r#"#!/bin/sh
VERSION="1.0.0"
BUILD_NUMBER=1
for app in \
  "shop" \
  "wallet"
do
  echo "building $app $VERSION ($BUILD_NUMBER)"
done
"#;
