//! Source-control primitives: list remote branches, check one out.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{EngineError, Result};

/// Result of a checkout + pull. Failure carries a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutResult {
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait BranchSource: Send + Sync {
    /// Remote branch names without the remote prefix.
    async fn list_remote_branches(&self) -> Result<Vec<String>>;

    async fn checkout_and_pull(&self, branch: &str) -> CheckoutResult;
}

/// A git working copy driven through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitRepo {
    dir: PathBuf,
    remote: String,
}

impl GitRepo {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            remote: "origin".to_string(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .await
            .map_err(|e| EngineError::RemoteUnavailable(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::RemoteUnavailable(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl BranchSource for GitRepo {
    async fn list_remote_branches(&self) -> Result<Vec<String>> {
        self.git(&["fetch", "--prune", self.remote.as_str()]).await?;
        let listing = self.git(&["branch", "-r"]).await?;
        Ok(parse_remote_branches(&listing, &self.remote))
    }

    async fn checkout_and_pull(&self, branch: &str) -> CheckoutResult {
        if let Err(e) = self.git(&["checkout", branch]).await {
            return CheckoutResult {
                success: false,
                message: e.to_string(),
            };
        }
        match self.git(&["pull", self.remote.as_str(), branch]).await {
            Ok(_) => CheckoutResult {
                success: true,
                message: format!("Checked out and pulled {branch}"),
            },
            Err(e) => CheckoutResult {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

/// Parse `git branch -r` output, dropping the `HEAD ->` alias and the remote prefix.
fn parse_remote_branches(listing: &str, remote: &str) -> Vec<String> {
    let prefix = format!("{remote}/");
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains("->"))
        .map(|line| line.strip_prefix(&prefix).unwrap_or(line).to_string())
        .collect()
}
