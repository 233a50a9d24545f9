use serde::{Deserialize, Serialize};

use crate::plan::action::Action;

/// Ordered actions produced for one command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub steps: Vec<Action>,
    #[serde(default)]
    pub overall_explanation: String,
}

impl Plan {
    pub fn new(steps: Vec<Action>, overall_explanation: impl Into<String>) -> Self {
        Self {
            steps,
            overall_explanation: overall_explanation.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn remaining_after(&self, index: usize) -> &[Action] {
        self.steps.get(index + 1..).unwrap_or(&[])
    }

    /// Swaps the entry at `index` for a recovered alternative.
    pub fn replace_step(&mut self, index: usize, action: Action) {
        if let Some(slot) = self.steps.get_mut(index) {
            *slot = action;
        }
    }

    /// Drops everything after `index` and appends `tail` in its place.
    pub fn splice_after(&mut self, index: usize, tail: Vec<Action>) {
        let keep = (index + 1).min(self.steps.len());
        self.steps.truncate(keep);
        self.steps.extend(tail);
    }
}

/// Outcome of one plan entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Recovery attempts spent on this entry; 0 when the first try settled it.
    #[serde(default)]
    pub recovery_attempts: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ExecutionResult {
    pub fn succeeded(result: serde_json::Value) -> Self {
        Self {
            success: true,
            error: None,
            result: Some(result),
            recovery_attempts: 0,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            result: None,
            recovery_attempts: 0,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Error text, or a generic placeholder for failures that carried none.
    pub fn error_text(&self) -> String {
        self.error.clone().unwrap_or_else(|| "unknown error".to_string())
    }
}

/// One round of the recovery loop. Lives only until its step resolves.
#[derive(Debug, Clone)]
pub struct RecoveryAttempt {
    pub attempt: u32,
    pub alternative: Option<Action>,
    pub outcome: ExecutionResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Executing,
    Succeeded,
    Failed,
    Recovering { attempt: u32 },
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Planning,
    Running,
    Completed,
    PartiallyCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step succeeded.
    Completed,
    /// At least one step was exhausted.
    PartiallyCompleted,
    /// The plan had no steps.
    NothingToDo,
}

/// Aggregate returned by `PlanExecutor::execute_all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub success: bool,
    pub outcome: RunOutcome,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub results: Vec<ExecutionResult>,
    pub steps: Vec<Action>,
    pub overall_explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message: String,
    pub level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_step_plan() -> Plan {
        Plan::new(
            vec![
                Action::navigate("https://a.example"),
                Action::click(1.0, 1.0),
                Action::click(2.0, 2.0),
            ],
            "demo",
        )
    }

    #[test]
    fn splice_replaces_tail_only() {
        let mut plan = three_step_plan();
        plan.splice_after(0, vec![Action::click(9.0, 9.0)]);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[0], Action::navigate("https://a.example"));
        assert_eq!(plan.steps[1], Action::click(9.0, 9.0));
    }

    #[test]
    fn splice_at_last_index_appends() {
        let mut plan = three_step_plan();
        plan.splice_after(2, vec![Action::click(5.0, 5.0)]);
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn remaining_after_last_is_empty() {
        let plan = three_step_plan();
        assert_eq!(plan.remaining_after(0).len(), 2);
        assert!(plan.remaining_after(2).is_empty());
        assert!(plan.remaining_after(10).is_empty());
    }

    #[test]
    fn plan_serializes_camel_case() {
        let json = serde_json::to_value(three_step_plan()).unwrap();
        assert_eq!(json["overallExplanation"], "demo");
        assert_eq!(json["steps"][1]["action"], "click");
        assert_eq!(json["steps"][1]["coordinates"]["x"], 1.0);
    }
}
