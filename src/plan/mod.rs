pub mod action;
pub mod types;

pub use action::{Action, ActionKind, ExtractTarget, Instruction, Point, ScrollDirection};
pub use types::{
    ExecutionResult, LogEntry, LogLevel, Plan, RecoveryAttempt, RunOutcome, RunReport, RunState,
    StepState,
};
