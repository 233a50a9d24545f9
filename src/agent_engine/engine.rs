use std::sync::Arc;

use serde_json::json;

use crate::agent_engine::progress::{ProgressEvent, ProgressSink, StepsSnapshot};
use crate::config::{ExecutorConfig, TimeoutsConfig};
use crate::decoder::{decode_alternative, decode_plan};
use crate::environment::Environment;
use crate::errors::{InitializationError, OracleError};
use crate::llm::provider::{Directive, Oracle, OracleRequest};
use crate::plan::{
    Action, ActionKind, ExecutionResult, LogEntry, LogLevel, Plan, RecoveryAttempt, RunOutcome,
    RunReport, RunState, StepState,
};

const NO_ACTION_NEEDED: &str = "No action needed";

/// Drives one plan against one environment, step by step, with bounded
/// per-step recovery. Owns the plan and its results for the whole run.
pub struct PlanExecutor {
    oracle: Arc<dyn Oracle>,
    environment: Arc<dyn Environment>,
    sink: Arc<dyn ProgressSink>,
    config: ExecutorConfig,
    timeouts: TimeoutsConfig,

    // ── Run state (reset by `initialize`) ─────────────────────────────────
    command: String,
    plan: Plan,
    results: Vec<ExecutionResult>,
    step_states: Vec<StepState>,
    current_index: Option<usize>,
    state: RunState,
    logs: Vec<LogEntry>,
}

impl PlanExecutor {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        environment: Arc<dyn Environment>,
        sink: Arc<dyn ProgressSink>,
        config: ExecutorConfig,
        timeouts: TimeoutsConfig,
    ) -> Self {
        Self {
            oracle,
            environment,
            sink,
            config,
            timeouts,
            command: String::new(),
            plan: Plan::default(),
            results: Vec::new(),
            step_states: Vec::new(),
            current_index: None,
            state: RunState::NotStarted,
            logs: Vec::new(),
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn step_states(&self) -> &[StepState] {
        &self.step_states
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Captures the page, asks the oracle for a plan, and decodes it. Nothing
    /// is executed; the plan is returned for display.
    pub async fn initialize(&mut self, command: &str) -> Result<Plan, InitializationError> {
        self.command = command.to_string();
        self.plan = Plan::default();
        self.results.clear();
        self.step_states.clear();
        self.current_index = None;
        self.set_state(RunState::Planning);
        self.log(format!("Processing command: {command}"), LogLevel::Info);

        match self.request_plan(command).await {
            Ok(plan) => {
                self.step_states = vec![StepState::Pending; plan.len()];
                self.plan = plan.clone();
                self.log(format!("Plan created with {} steps", plan.len()), LogLevel::Info);
                if !plan.overall_explanation.is_empty() {
                    self.log(format!("Plan: {}", plan.overall_explanation), LogLevel::Info);
                }
                self.emit_steps();
                Ok(plan)
            }
            Err(e) => {
                self.log(format!("Failed to initialize: {e}"), LogLevel::Error);
                self.set_state(RunState::NotStarted);
                Err(e)
            }
        }
    }

    /// Runs every step in order. A step that exhausts its recovery budget
    /// never stops the ones after it.
    pub async fn execute_all(&mut self) -> RunReport {
        self.set_state(RunState::Running);
        self.results.clear();
        self.step_states = vec![StepState::Pending; self.plan.len()];

        if self.plan.is_empty() {
            self.log("Plan has no steps; nothing to do", LogLevel::Info);
            return self.finish();
        }

        let mut index = 0;
        while index < self.plan.len() {
            self.run_step(index).await;
            index += 1;
            if index < self.plan.len() && !self.config.step_pause.is_zero() {
                tokio::time::sleep(self.config.step_pause).await;
            }
        }
        self.finish()
    }

    async fn run_step(&mut self, index: usize) {
        let action = self.plan.steps[index].clone();
        self.current_index = Some(index);
        self.set_step_state(index, StepState::Executing);
        self.log(
            format!("Executing step {}/{}: {}", index + 1, self.plan.len(), action.describe()),
            LogLevel::Info,
        );

        let mut result = self.execute_step(&action, index).await;
        if !result.success {
            let error = result.error_text();
            self.log(format!("Step {} failed: {error}", index + 1), LogLevel::Warn);
            self.set_step_state(index, StepState::Failed);
            result = self.recover_failed_step(&action, index, error).await;
        }

        let succeeded = result.success;
        self.results.push(result);
        if succeeded {
            self.set_step_state(index, StepState::Succeeded);
            self.log(format!("Step {} completed", index + 1), LogLevel::Success);
        } else {
            self.set_step_state(index, StepState::Exhausted);
            self.log(
                format!("Step {} could not be completed; moving on", index + 1),
                LogLevel::Error,
            );
        }

        // The entry may have been replaced by a recovered alternative.
        if succeeded && self.plan.steps[index].is_navigation() && index + 1 < self.plan.len() {
            self.refresh_after_navigation(index).await;
        }
    }

    /// Performs one action. Environment and validation failures come back as
    /// a failed result; nothing propagates.
    pub async fn execute_step(&mut self, action: &Action, index: usize) -> ExecutionResult {
        if action.kind == ActionKind::None {
            self.log(format!("Step {}: {NO_ACTION_NEEDED}", index + 1), LogLevel::Info);
            return ExecutionResult::succeeded(json!({ "message": NO_ACTION_NEEDED }));
        }

        let instruction = match action.validate() {
            Ok(instruction) => instruction,
            Err(e) => {
                tracing::debug!(step = index, kind = %action.kind, error = %e, "action rejected");
                return ExecutionResult::failed(e.to_string());
            }
        };

        match self.environment.perform(&instruction).await {
            Ok(value) => {
                tracing::debug!(step = index, kind = %action.kind, "step performed");
                ExecutionResult::succeeded(value)
            }
            Err(e) => {
                tracing::debug!(step = index, kind = %action.kind, error = %e, "step failed");
                ExecutionResult::failed(e.message)
            }
        }
    }

    /// Up to `max_retries` rounds of: fresh snapshot, ask for an alternative
    /// unlike every earlier one, try it. A success replaces the plan entry.
    pub async fn recover_failed_step(
        &mut self,
        action: &Action,
        index: usize,
        error: String,
    ) -> ExecutionResult {
        let max_retries = self.config.max_retries;
        let mut last_error = error;
        let mut attempts: Vec<RecoveryAttempt> = Vec::new();

        for attempt in 1..=max_retries {
            self.set_step_state(index, StepState::Recovering { attempt });
            self.log(
                format!("Recovery attempt {attempt}/{max_retries} for step {}", index + 1),
                LogLevel::Warn,
            );
            if !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let previous: Vec<Action> = attempts.iter().filter_map(|a| a.alternative.clone()).collect();
            let alternative = match self.request_alternative(action, &last_error, attempt, previous).await {
                Ok(alternative) => alternative,
                Err(reason) => {
                    self.log(format!("Recovery attempt {attempt} failed: {reason}"), LogLevel::Warn);
                    attempts.push(RecoveryAttempt {
                        attempt,
                        alternative: None,
                        outcome: ExecutionResult::failed(reason.clone()),
                    });
                    last_error = reason;
                    continue;
                }
            };

            self.log(format!("Trying alternative: {}", alternative.describe()), LogLevel::Info);
            let mut outcome = self.execute_step(&alternative, index).await;
            outcome.recovery_attempts = attempt;
            if outcome.success {
                self.plan.replace_step(index, alternative);
                self.log(
                    format!("Step {} recovered on attempt {attempt}", index + 1),
                    LogLevel::Success,
                );
                return outcome;
            }

            last_error = outcome.error_text();
            self.log(format!("Alternative failed: {last_error}"), LogLevel::Warn);
            attempts.push(RecoveryAttempt {
                attempt,
                alternative: Some(alternative),
                outcome,
            });
        }

        tracing::debug!(
            step = index,
            attempts = ?attempts.iter().map(|a| (a.attempt, a.outcome.error_text())).collect::<Vec<_>>(),
            "recovery budget exhausted"
        );
        let mut exhausted =
            ExecutionResult::failed(format!("Failed after {max_retries} recovery attempts: {last_error}"));
        exhausted.recovery_attempts = max_retries;
        exhausted
    }

    /// After a navigation: let the page settle, then ask for revised remaining
    /// steps. Any failure keeps the current remainder.
    async fn refresh_after_navigation(&mut self, index: usize) {
        if !self.config.navigation_settle.is_zero() {
            self.log("Waiting for the page to settle after navigation", LogLevel::Info);
            tokio::time::sleep(self.config.navigation_settle).await;
        }
        if !self.config.replan_after_navigation {
            return;
        }

        self.log("Page changed; requesting updated steps", LogLevel::Info);
        match self.request_replan(index).await {
            Ok(steps) if !steps.is_empty() => {
                let count = steps.len();
                self.plan.splice_after(index, steps);
                self.step_states.truncate(index + 1);
                self.step_states.resize(self.plan.len(), StepState::Pending);
                self.log(format!("Updated remaining steps: {count}"), LogLevel::Info);
                self.emit_steps();
            }
            Ok(_) => self.log(
                "No updated steps returned; keeping the original plan",
                LogLevel::Info,
            ),
            Err(reason) => self.log(
                format!("Could not update steps ({reason}); keeping the original plan"),
                LogLevel::Warn,
            ),
        }
    }

    // ── Oracle round-trips ────────────────────────────────────────────────

    async fn request_plan(&self, command: &str) -> Result<Plan, InitializationError> {
        let target = self
            .environment
            .active_target()
            .await
            .ok_or(InitializationError::NoActiveTarget)?;
        tracing::info!(active_target = %target, "planning against active target");

        let snapshot = self.environment.capture().await?;
        let request = OracleRequest {
            directive: Directive::Plan {
                command: command.to_string(),
            },
            snapshot,
            timeout: self.timeouts.plan(),
        };
        let raw = self.consult(&request).await?;
        let decoded = decode_plan(&raw)?;
        tracing::info!(tier = %decoded.tier, steps = decoded.value.len(), "initial plan decoded");
        Ok(decoded.value)
    }

    async fn request_alternative(
        &self,
        failed_step: &Action,
        error: &str,
        attempt: u32,
        previous_attempts: Vec<Action>,
    ) -> Result<Action, String> {
        let snapshot = self.environment.capture().await.map_err(|e| e.to_string())?;
        let request = OracleRequest {
            directive: Directive::Recover {
                command: self.command.clone(),
                failed_step: failed_step.clone(),
                error: error.to_string(),
                attempt,
                max_retries: self.config.max_retries,
                previous_attempts,
            },
            snapshot,
            timeout: self.timeouts.recovery(),
        };
        let raw = self.consult(&request).await.map_err(|e| e.guidance())?;
        let decoded = decode_alternative(&raw).map_err(|e| e.to_string())?;
        tracing::debug!(tier = %decoded.tier, attempt, "alternative decoded");
        Ok(decoded.value)
    }

    async fn request_replan(&self, index: usize) -> Result<Vec<Action>, String> {
        let snapshot = self.environment.capture().await.map_err(|e| e.to_string())?;
        let completed = &self.plan.steps[index];
        let request = OracleRequest {
            directive: Directive::Replan {
                command: self.command.clone(),
                remaining: self.plan.remaining_after(index).to_vec(),
                context_note: format!(
                    "I just completed step {} ({}) and the page has changed.",
                    index + 1,
                    completed.describe()
                ),
            },
            snapshot,
            timeout: self.timeouts.replan(),
        };
        let raw = self.consult(&request).await.map_err(|e| e.guidance())?;
        let decoded = decode_plan(&raw).map_err(|e| e.to_string())?;
        tracing::debug!(tier = %decoded.tier, steps = decoded.value.len(), "updated steps decoded");
        Ok(decoded.value.steps)
    }

    /// Single attempt, bounded by the request's timeout whatever the oracle
    /// implementation does internally.
    async fn consult(&self, request: &OracleRequest) -> Result<String, OracleError> {
        match tokio::time::timeout(request.timeout, self.oracle.consult(request)).await {
            Ok(reply) => reply,
            Err(_) => Err(OracleError::Timeout(request.timeout.as_secs())),
        }
    }

    // ── Progress ──────────────────────────────────────────────────────────

    fn finish(&mut self) -> RunReport {
        let total_steps = self.plan.len();
        let completed_steps = self.results.iter().filter(|r| r.success).count();
        let success = completed_steps == total_steps;
        let outcome = if total_steps == 0 {
            RunOutcome::NothingToDo
        } else if success {
            RunOutcome::Completed
        } else {
            RunOutcome::PartiallyCompleted
        };

        self.current_index = None;
        self.set_state(if success { RunState::Completed } else { RunState::PartiallyCompleted });
        self.log(
            format!("Completed {completed_steps}/{total_steps} steps"),
            if success { LogLevel::Success } else { LogLevel::Warn },
        );
        self.emit_steps();

        RunReport {
            success,
            outcome,
            completed_steps,
            total_steps,
            results: self.results.clone(),
            steps: self.plan.steps.clone(),
            overall_explanation: self.plan.overall_explanation.clone(),
        }
    }

    fn log(&mut self, message: impl Into<String>, level: LogLevel) {
        let entry = LogEntry {
            timestamp: chrono::Utc::now(),
            message: message.into(),
            level,
        };
        match level {
            LogLevel::Info | LogLevel::Success => tracing::info!(level = ?level, "{}", entry.message),
            LogLevel::Warn => tracing::warn!("{}", entry.message),
            LogLevel::Error => tracing::error!("{}", entry.message),
        }
        self.sink.emit(ProgressEvent::Log(entry.clone()));
        self.logs.push(entry);
    }

    fn set_state(&mut self, state: RunState) {
        tracing::debug!(from = ?self.state, to = ?state, "run state changed");
        self.state = state;
        self.sink.emit(ProgressEvent::State(state));
    }

    fn set_step_state(&mut self, index: usize, state: StepState) {
        if let Some(slot) = self.step_states.get_mut(index) {
            *slot = state;
        }
        self.emit_steps();
    }

    fn emit_steps(&self) {
        self.sink.emit(ProgressEvent::Steps(StepsSnapshot {
            steps: self.plan.steps.clone(),
            current_index: self.current_index,
            step_states: self.step_states.clone(),
            results: self.results.clone(),
        }));
    }
}
