//! Natural-language intent classification.
//!
//! The LLM is asked to answer with one JSON object. Everything downstream
//! trusts that shape; fields it leaves out take their defaults.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use shipyard_engine::BuildRequest;
use shipyard_engine::versions::PlatformFilter;

use crate::llm::LlmClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Build,
    CheckVersion,
    #[default]
    #[serde(other)]
    Chat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Intent {
    pub intent: IntentKind,
    pub script: String,
    pub command: String,
    pub branch: String,
    pub use_latest_version: bool,
    pub check_version_apps: Vec<String>,
    pub check_version_platform: String,
    /// Reply text for `chat`, or a short acknowledgement for the other intents.
    pub message: String,
}

impl Intent {
    pub fn build_request(&self) -> BuildRequest {
        BuildRequest::new(self.script.clone(), self.command.clone())
            .with_branch(self.branch.trim())
            .with_latest_version(self.use_latest_version)
    }

    /// Platform filter for a version check; anything unrecognised means all.
    pub fn platform_filter(&self) -> PlatformFilter {
        self.check_version_platform
            .parse()
            .unwrap_or(PlatformFilter::All)
    }
}

/// Pull the JSON object out of a model reply, tolerating code fences and chatter.
pub fn parse_intent(reply: &str) -> Result<Intent> {
    let start = reply.find('{').context("No JSON object in classifier reply")?;
    let end = reply.rfind('}').context("Unterminated JSON object in classifier reply")?;
    anyhow::ensure!(end > start, "Malformed JSON object in classifier reply");
    serde_json::from_str(&reply[start..=end]).context("Classifier reply is not a valid intent")
}

pub fn system_prompt(known_apps: &[String], known_branches: &[String]) -> String {
    format!(
        r#"You route chat messages for a mobile app build bot. Reply with ONE JSON object and nothing else.

Fields:
- "intent": "build" | "check_version" | "chat"
- "script": full build script text. It must contain a VERSION= line, a BUILD_NUMBER= line, and the apps to build as one double-quoted name per line.
- "command": shell command that runs the build from the project root. iOS builds go through the ios/ path.
- "branch": branch the user asked for, as they wrote it, or "" for the current branch.
- "use_latest_version": true when the user wants the next version after what is live in the stores.
- "check_version_apps": apps to report versions for (check_version only).
- "check_version_platform": "android", "ios" or "all" (check_version only).
- "message": a short reply to show the user.

Known apps: {apps}
Known branches: {branches}"#,
        apps = known_apps.join(", "),
        branches = if known_branches.is_empty() {
            "(unavailable)".to_string()
        } else {
            known_branches.join(", ")
        },
    )
}

/// Turns a chat message into an [`Intent`].
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        known_apps: &[String],
        known_branches: &[String],
    ) -> Result<Intent>;
}

#[async_trait]
impl IntentClassifier for LlmClient {
    async fn classify(
        &self,
        message: &str,
        known_apps: &[String],
        known_branches: &[String],
    ) -> Result<Intent> {
        let reply = self
            .complete(&system_prompt(known_apps, known_branches), message)
            .await?;
        let intent = parse_intent(&reply)?;
        tracing::info!(intent = ?intent.intent, branch = %intent.branch, "Classified message");
        Ok(intent)
    }
}
