/// Compiles a regex literal once and hands back a `&'static Regex`.
macro_rules! regex {
    ($re:literal) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).expect("regex literal is valid"))
    }};
}

pub mod agent_engine;
pub mod config;
pub mod decoder;
pub mod environment;
pub mod errors;
pub mod llm;
pub mod plan;

use std::sync::Arc;

use crate::agent_engine::engine::PlanExecutor;
use crate::agent_engine::history::SessionHistory;
use crate::agent_engine::progress::{NoopSink, ProgressSink};
use crate::environment::simulated::SimulatedEnvironment;
use crate::errors::PilotResult;
use crate::llm::registry::ProviderRegistry;

/// Entry point of the `tabpilot` binary: plans `command` with the configured
/// oracle and runs it against the simulated page.
pub async fn run(command: String) -> PilotResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let cfg = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load config; using built-in defaults");
            config::AppConfig::default()
        }
    };

    let registry = ProviderRegistry::from_config(&cfg.oracle);
    tracing::debug!(providers = ?registry.list_names(), "oracle registry built");
    let oracle = registry.get_active()?;
    tracing::info!(oracle = oracle.name(), command = %command, "starting run");

    let sink: Arc<dyn ProgressSink> = if cfg.session.record_history {
        let history = SessionHistory::new(cfg.session.directory.clone());
        tracing::info!(session = %history.session_id, path = %history.path().display(), "recording session");
        Arc::new(history)
    } else {
        Arc::new(NoopSink)
    };

    let environment = Arc::new(SimulatedEnvironment::demo());
    let mut executor = PlanExecutor::new(
        oracle,
        environment,
        sink,
        cfg.executor.clone(),
        cfg.oracle.timeouts.clone(),
    );

    let plan = executor.initialize(&command).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);

    let report = executor.execute_all().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
