use std::time::Duration;

use async_trait::async_trait;

use crate::environment::Snapshot;
use crate::errors::OracleError;
use crate::plan::Action;

/// What the oracle is being asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Produce an initial plan for `command`.
    Plan { command: String },
    /// Propose one alternative for a step that failed.
    Recover {
        command: String,
        failed_step: Action,
        error: String,
        attempt: u32,
        max_retries: u32,
        /// Alternatives already tried for this step, oldest first.
        previous_attempts: Vec<Action>,
    },
    /// Revise the remaining steps after a navigation changed the page.
    Replan {
        command: String,
        remaining: Vec<Action>,
        context_note: String,
    },
}

impl Directive {
    pub fn label(&self) -> &'static str {
        match self {
            Directive::Plan { .. } => "plan",
            Directive::Recover { .. } => "recover",
            Directive::Replan { .. } => "replan",
        }
    }

    pub fn command(&self) -> &str {
        match self {
            Directive::Plan { command }
            | Directive::Recover { command, .. }
            | Directive::Replan { command, .. } => command,
        }
    }
}

/// One request/response exchange: directive, snapshot, and the time budget.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub directive: Directive,
    pub snapshot: Snapshot,
    pub timeout: Duration,
}

/// A single-attempt decision oracle. Implementations never retry; retry
/// policy belongs to the executor.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Returns the provider's identifier (matches the config.toml key).
    fn name(&self) -> &str;

    /// Sends the request and returns the raw reply text.
    async fn consult(&self, request: &OracleRequest) -> Result<String, OracleError>;
}
