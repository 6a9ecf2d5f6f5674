//! shipyard-engine: turns structured build requests into single-flight mobile builds.
//!
//! - Version resolution against the Android publisher API and App Store Connect
//! - Fuzzy branch matching against the real remote branches
//! - A build gate that lets at most one build run at a time
//! - Script templating and streamed execution of the build command

pub mod branch;
pub mod error;
pub mod git;
pub mod identity;
pub mod lock;
pub mod orchestrator;
pub mod process;
pub mod script;
pub mod semver;
pub mod store;
pub mod versions;

pub use error::{EngineError, Result};
pub use orchestrator::{BuildEvent, BuildOutcome, BuildRequest, Orchestrator, OrchestratorConfig};
