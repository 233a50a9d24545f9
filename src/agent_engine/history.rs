use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::agent_engine::progress::{ProgressEvent, ProgressSink};
use crate::errors::PilotResult;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry<'a> {
    pub ts: i64,
    pub session_id: &'a str,
    #[serde(flatten)]
    pub event: &'a ProgressEvent,
}

/// Appends every progress event of one run to `session_<uuid>.jsonl`.
pub struct SessionHistory {
    pub session_id: String,
    file_path: PathBuf,
}

impl SessionHistory {
    pub fn new(directory: Option<PathBuf>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let dir = directory.unwrap_or_else(data_dir_or_cwd);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(path = %dir.display(), error = %e, "could not create session directory");
        }
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Append one event to the JSONL file.
    pub fn record(&self, event: &ProgressEvent) -> PilotResult<()> {
        let entry = HistoryEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            session_id: &self.session_id,
            event,
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        tracing::trace!(path = %self.file_path.display(), "history entry flushed");
        Ok(())
    }
}

impl ProgressSink for SessionHistory {
    fn emit(&self, event: ProgressEvent) {
        if let Err(e) = self.record(&event) {
            tracing::warn!(path = %self.file_path.display(), error = %e, "failed to write session history");
        }
    }
}

/// `<data_local_dir>/tabpilot/sessions`, falling back to the working directory.
fn data_dir_or_cwd() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        return data_dir.join("tabpilot").join("sessions");
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
