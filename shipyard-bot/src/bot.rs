//! Message dispatch: slash commands, intent classification, and build tasks.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shipyard_engine::git::BranchSource;
use shipyard_engine::{BuildOutcome, BuildRequest, Orchestrator};

use crate::intent::{Intent, IntentClassifier, IntentKind};
use crate::output::{self, AgentId, ChatSink};

const HELP: &str = "Ask for a build in plain words, e.g. \"build shop for android from dark mode with the latest version\", \
or ask which versions are live. Commands: /status | /help";

fn system_agent() -> AgentId {
    AgentId::new("system")
}

fn builder_agent() -> AgentId {
    AgentId::new("builder")
}

pub struct Bot {
    classifier: Arc<dyn IntentClassifier>,
    orchestrator: Arc<Orchestrator>,
    branches: Arc<dyn BranchSource>,
    sink: Arc<dyn ChatSink>,
    known_apps: Vec<String>,
    /// Last branch listing; reused while a build owns the working copy.
    known_branches: Mutex<Vec<String>>,
    prefix: String,
}

impl Bot {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        orchestrator: Arc<Orchestrator>,
        branches: Arc<dyn BranchSource>,
        sink: Arc<dyn ChatSink>,
        known_apps: Vec<String>,
    ) -> Self {
        Self {
            classifier,
            orchestrator,
            branches,
            sink,
            known_apps,
            known_branches: Mutex::new(Vec::new()),
            prefix: "/".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Handle one inbound message. A build is started in the background and
    /// its handle returned; everything else completes before this returns.
    pub async fn handle_message(&self, text: &str) -> Result<Option<JoinHandle<BuildOutcome>>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        if let Some(cmd) = text.strip_prefix(self.prefix.as_str()) {
            let cmd = cmd.split_whitespace().next().unwrap_or("").to_lowercase();
            match cmd.as_str() {
                "help" => output::say(self.sink.as_ref(), &system_agent(), HELP).await?,
                "status" => self.report_status().await?,
                other => {
                    output::say(
                        self.sink.as_ref(),
                        &system_agent(),
                        &format!(
                            "Unknown command: {}{other}. Try {}help",
                            self.prefix, self.prefix
                        ),
                    )
                    .await?
                }
            }
            return Ok(None);
        }

        let branches = self.branches_for_classification().await;
        let intent = match self.classifier.classify(text, &self.known_apps, &branches).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::error!(error = %e, "Intent classification failed");
                output::error(
                    self.sink.as_ref(),
                    &system_agent(),
                    &format!("Sorry, I couldn't understand that: {e}"),
                )
                .await?;
                return Ok(None);
            }
        };

        self.dispatch(intent).await
    }

    /// Remote branches to show the classifier. A running build may be checking
    /// out or pulling in the same working copy, so no fetch happens then.
    async fn branches_for_classification(&self) -> Vec<String> {
        if self.orchestrator.lock().is_busy() {
            tracing::debug!("Build running, using cached branch list");
            return self.known_branches.lock().clone();
        }
        match self.branches.list_remote_branches().await {
            Ok(branches) => {
                *self.known_branches.lock() = branches.clone();
                branches
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not list branches for classification");
                self.known_branches.lock().clone()
            }
        }
    }

    async fn dispatch(&self, intent: Intent) -> Result<Option<JoinHandle<BuildOutcome>>> {
        match intent.intent {
            IntentKind::Build => {
                if !intent.message.trim().is_empty() {
                    output::say(self.sink.as_ref(), &builder_agent(), &intent.message).await?;
                }
                Ok(Some(self.spawn_build(intent.build_request())))
            }
            IntentKind::CheckVersion => {
                self.check_versions(&intent).await?;
                Ok(None)
            }
            IntentKind::Chat => {
                let reply = if intent.message.trim().is_empty() {
                    HELP
                } else {
                    intent.message.as_str()
                };
                output::say(self.sink.as_ref(), &system_agent(), reply).await?;
                Ok(None)
            }
        }
    }

    fn spawn_build(&self, request: BuildRequest) -> JoinHandle<BuildOutcome> {
        let orchestrator = self.orchestrator.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let agent = builder_agent();
            let (tx, mut rx) = mpsc::unbounded_channel();
            let forward = async {
                while let Some(event) = rx.recv().await {
                    let Some(line) = output::event_line(&event) else {
                        continue;
                    };
                    if let Err(e) = output::say(sink.as_ref(), &agent, &line).await {
                        tracing::warn!(error = %e, "Failed to post build progress");
                    }
                }
            };
            let (outcome, ()) = tokio::join!(orchestrator.run(request, tx), forward);

            if let Err(e) = output::say(sink.as_ref(), &agent, &outcome.message()).await {
                tracing::warn!(error = %e, "Failed to post build result");
            }
            outcome
        })
    }

    async fn check_versions(&self, intent: &Intent) -> Result<()> {
        let apps = if intent.check_version_apps.is_empty() {
            self.known_apps.clone()
        } else {
            intent.check_version_apps.clone()
        };
        if apps.is_empty() {
            return output::error(
                self.sink.as_ref(),
                &system_agent(),
                "Which apps? None were named and none are configured.",
            )
            .await;
        }

        let report = self
            .orchestrator
            .versions()
            .build_versions_report(&apps, intent.platform_filter())
            .await;
        output::status(self.sink.as_ref(), &system_agent(), "📦", "Live versions:").await?;
        output::say(self.sink.as_ref(), &system_agent(), &report.to_string()).await
    }

    async fn report_status(&self) -> Result<()> {
        match self.orchestrator.lock().active() {
            Some(build) => {
                output::status(
                    self.sink.as_ref(),
                    &system_agent(),
                    "🔨",
                    &format!("Building: {build}"),
                )
                .await
            }
            None => {
                output::status(self.sink.as_ref(), &system_agent(), "💤", "No build running").await
            }
        }
    }
}
