//! Build orchestrator: version stamping, branch switching, single-flight execution.
//!
//! A run moves `Idle → Resolving → (BranchSwitching) → Executing → Idle`. The
//! build gate is held from the moment the script file is written until the
//! run ends, whichever way it ends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::branch::{BranchMatch, resolve_branch};
use crate::error::{EngineError, Result};
use crate::git::BranchSource;
use crate::lock::{ActiveBuild, BuildLock};
use crate::process::{OutputLine, ProcessRunner, overwrite_file};
use crate::script;
use crate::store::Platform;
use crate::versions::{ResolvedVersion, VersionResolver};

/// A build as handed over by the intent classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRequest {
    /// Apps listed in the script. Refreshed from the script when the run starts.
    pub apps: Vec<String>,
    /// Set from the command when the run starts.
    pub platform: Platform,
    pub script: String,
    pub command: String,
    /// Branch token as the user typed it; empty means "stay on the current branch".
    pub branch: String,
    pub use_latest_version: bool,
}

impl BuildRequest {
    pub fn new(script: impl Into<String>, command: impl Into<String>) -> Self {
        let script = script.into();
        Self {
            apps: script::extract_app_names(&script),
            platform: Platform::Android,
            script,
            command: command.into(),
            branch: String::new(),
            use_latest_version: false,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_latest_version(mut self, enabled: bool) -> Self {
        self.use_latest_version = enabled;
        self
    }
}

/// Progress reported while a run is underway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BuildEvent {
    VersionResolved {
        platform: Platform,
        version: ResolvedVersion,
    },
    ScriptWritten {
        path: PathBuf,
    },
    BranchResolved {
        requested: String,
        matched: BranchMatch,
    },
    BranchSwitched {
        branch: String,
        message: String,
    },
    Executing {
        command: String,
    },
    Output(OutputLine),
}

/// How a run ended. Each outcome has exactly one status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BuildOutcome {
    Completed {
        version: Option<ResolvedVersion>,
        branch: Option<String>,
    },
    RejectedBusy {
        holder: String,
    },
    RejectedNoApps,
    BranchAmbiguous {
        input: String,
        candidates: Vec<String>,
    },
    BranchFailed {
        branch: String,
        reason: String,
    },
    VersionLookupFailed {
        reason: String,
    },
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Completed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            BuildOutcome::Completed { version, branch } => {
                let mut msg = "✅ Build finished".to_string();
                if let Some(v) = version {
                    msg.push_str(&format!(" | version {v}"));
                }
                if let Some(b) = branch {
                    msg.push_str(&format!(" | branch {b}"));
                }
                msg
            }
            BuildOutcome::RejectedBusy { holder } => {
                format!("⏳ Another build is running ({holder}). Try again when it finishes.")
            }
            BuildOutcome::RejectedNoApps => {
                "❌ No apps found in the build script, so there is nothing to look up versions for."
                    .to_string()
            }
            BuildOutcome::BranchAmbiguous { input, candidates } => format!(
                "🤔 '{input}' matches several branches: {}. Which one did you mean?",
                candidates.join(", ")
            ),
            BuildOutcome::BranchFailed { branch, reason } => {
                format!("❌ Couldn't switch to branch '{branch}': {reason}")
            }
            BuildOutcome::VersionLookupFailed { reason } => {
                format!("❌ Version lookup failed: {reason}")
            }
            BuildOutcome::ExecutionFailed { exit_code, stderr } => {
                let code = exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
                if stderr.trim().is_empty() {
                    format!("❌ Build failed (exit code {code})")
                } else {
                    format!("❌ Build failed (exit code {code})\n{}", stderr.trim_end())
                }
            }
        }
    }
}

impl From<EngineError> for BuildOutcome {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::BuildBusy(holder) => BuildOutcome::RejectedBusy { holder },
            EngineError::NoApps => BuildOutcome::RejectedNoApps,
            EngineError::BranchAmbiguous { input, candidates } => {
                BuildOutcome::BranchAmbiguous { input, candidates }
            }
            EngineError::BranchNotFound(branch) => BuildOutcome::BranchFailed {
                branch,
                reason: "no remote branch matches".to_string(),
            },
            EngineError::BranchSwitch { branch, reason } => {
                BuildOutcome::BranchFailed { branch, reason }
            }
            EngineError::VersionLookup(reason) => BuildOutcome::VersionLookupFailed { reason },
            EngineError::ExecutionFailed { code, stderr } => BuildOutcome::ExecutionFailed {
                exit_code: code,
                stderr,
            },
            other => BuildOutcome::ExecutionFailed {
                exit_code: None,
                stderr: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Working directory for the build command and the git checkout.
    pub project_dir: PathBuf,
    /// Script file overwritten before every build.
    pub script_path: PathBuf,
    /// A command containing this text builds for iOS; anything else builds for Android.
    pub ios_command_marker: String,
    /// Upper bound on the version lookup step.
    pub version_lookup_timeout: Option<Duration>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    lock: BuildLock,
    versions: VersionResolver,
    git: Arc<dyn BranchSource>,
    runner: Arc<dyn ProcessRunner>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        versions: VersionResolver,
        git: Arc<dyn BranchSource>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            config,
            lock: BuildLock::new(),
            versions,
            git,
            runner,
        }
    }

    pub fn lock(&self) -> &BuildLock {
        &self.lock
    }

    pub fn versions(&self) -> &VersionResolver {
        &self.versions
    }

    /// Platform implied by the build command.
    pub fn platform_for(&self, command: &str) -> Platform {
        let marker = self.config.ios_command_marker.to_lowercase();
        if !marker.is_empty() && command.to_lowercase().contains(&marker) {
            Platform::Ios
        } else {
            Platform::Android
        }
    }

    /// Run one build to a terminal outcome, reporting progress on `events`.
    pub async fn run(
        &self,
        request: BuildRequest,
        events: mpsc::UnboundedSender<BuildEvent>,
    ) -> BuildOutcome {
        let outcome = match self.execute(request, &events).await {
            Ok((version, branch)) => BuildOutcome::Completed { version, branch },
            Err(e) => BuildOutcome::from(e),
        };

        if outcome.is_success() {
            tracing::info!(outcome = ?outcome, "Build completed");
        } else {
            tracing::warn!(outcome = ?outcome, "Build did not complete");
        }
        outcome
    }

    async fn execute(
        &self,
        mut request: BuildRequest,
        events: &mpsc::UnboundedSender<BuildEvent>,
    ) -> Result<(Option<ResolvedVersion>, Option<String>)> {
        if let Some(active) = self.lock.active() {
            return Err(EngineError::BuildBusy(active.to_string()));
        }

        request.platform = self.platform_for(&request.command);
        request.apps = script::extract_app_names(&request.script);

        // Resolving: no side effects happen before the gate is taken.
        let mut version = None;
        if request.use_latest_version {
            if request.apps.is_empty() {
                return Err(EngineError::NoApps);
            }
            let next = self.lookup_version(&request.apps, request.platform).await?;
            request.script =
                script::apply_version(&request.script, &next.version_name, next.build_number);
            let _ = events.send(BuildEvent::VersionResolved {
                platform: request.platform,
                version: next.clone(),
            });
            version = Some(next);
        }

        let branch_input = request.branch.trim().to_string();
        let _guard = self
            .lock
            .try_acquire(ActiveBuild {
                apps: request.apps.clone(),
                platform: request.platform,
                branch: (!branch_input.is_empty()).then(|| branch_input.clone()),
                started_at: Utc::now(),
            })
            .map_err(|active| EngineError::BuildBusy(active.to_string()))?;

        overwrite_file(&self.config.script_path, &request.script).await?;
        let _ = events.send(BuildEvent::ScriptWritten {
            path: self.config.script_path.clone(),
        });

        let branch = if branch_input.is_empty() {
            None
        } else {
            Some(self.switch_branch(&branch_input, events).await?)
        };

        let _ = events.send(BuildEvent::Executing {
            command: request.command.clone(),
        });
        self.execute_command(&request.command, events).await?;

        Ok((version, branch))
    }

    async fn lookup_version(&self, apps: &[String], platform: Platform) -> Result<ResolvedVersion> {
        let lookup = self.versions.resolve_next_version(apps, platform);
        match self.config.version_lookup_timeout {
            Some(limit) => tokio::time::timeout(limit, lookup).await.map_err(|_| {
                EngineError::VersionLookup(format!("timed out after {}s", limit.as_secs()))
            }),
            None => Ok(lookup.await),
        }
    }

    async fn switch_branch(
        &self,
        input: &str,
        events: &mpsc::UnboundedSender<BuildEvent>,
    ) -> Result<String> {
        let remote = self
            .git
            .list_remote_branches()
            .await
            .map_err(|e| EngineError::BranchSwitch {
                branch: input.to_string(),
                reason: e.to_string(),
            })?;

        let matched = resolve_branch(input, &remote);
        let _ = events.send(BuildEvent::BranchResolved {
            requested: input.to_string(),
            matched: matched.clone(),
        });

        let name = match matched {
            BranchMatch::Exact(name) | BranchMatch::Fuzzy(name) => name,
            BranchMatch::Ambiguous(candidates) => {
                return Err(EngineError::BranchAmbiguous {
                    input: input.to_string(),
                    candidates,
                });
            }
            BranchMatch::NotFound => return Err(EngineError::BranchNotFound(input.to_string())),
        };

        let checkout = self.git.checkout_and_pull(&name).await;
        if !checkout.success {
            return Err(EngineError::BranchSwitch {
                branch: name,
                reason: checkout.message,
            });
        }
        tracing::info!(branch = %name, "Switched branch");
        let _ = events.send(BuildEvent::BranchSwitched {
            branch: name.clone(),
            message: checkout.message,
        });
        Ok(name)
    }

    async fn execute_command(
        &self,
        command: &str,
        events: &mpsc::UnboundedSender<BuildEvent>,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forward = async {
            while let Some(line) = rx.recv().await {
                let _ = events.send(BuildEvent::Output(line));
            }
        };
        let (outcome, ()) = tokio::join!(
            self.runner.run(command, &self.config.project_dir, tx),
            forward
        );

        let outcome = outcome?;
        if outcome.success {
            Ok(())
        } else {
            Err(EngineError::ExecutionFailed {
                code: outcome.exit_code,
                stderr: outcome.stderr_tail,
            })
        }
    }
}
