//! Deterministic keyword planner used when no remote oracle is reachable.
//!
//! Replies are JSON text, exactly like a remote oracle's, so they go through
//! the same decoder.

use async_trait::async_trait;
use serde_json::json;

use crate::errors::OracleError;
use crate::llm::provider::{Directive, Oracle, OracleRequest};
use crate::plan::{Action, ActionKind, Plan};

pub const OFFLINE_PROVIDER: &str = "offline";

const DEFAULT_ORIGIN: &str = "Las Vegas";
const DEFAULT_DESTINATION: &str = "San Francisco";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

/// `from <origin> to <destination>`, case preserved. The destination ends at
/// punctuation, the end of the text, or a trailing date word ("for", "on",
/// "next", ...).
pub fn extract_route(command: &str) -> Option<Route> {
    let caps = regex!(
        r"(?i)\bfrom\s+([a-z][a-z .'-]*?)\s+to\s+([a-z][a-z .'-]*?)(?:\s+(?:for|on|next|this|in|and)\b|[.,;!?]|\s*$)"
    )
    .captures(command)?;
    let origin = caps[1].trim().to_string();
    let destination = caps[2].trim().to_string();
    if origin.is_empty() || destination.is_empty() {
        return None;
    }
    Some(Route { origin, destination })
}

/// `search for <terms>` up to "and" or the end of the command.
fn search_terms(command: &str) -> Option<String> {
    regex!(r"(?i)\bsearch\s+for\s+([a-z0-9#@ ]+?)(?:\s+and\b|[.,;!?]|\s*$)")
        .captures(command)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `for|in <place>` up to "and" or the end of the command.
fn location(command: &str) -> Option<String> {
    regex!(r"(?i)\b(?:for|in)\s+([a-z ]+?)(?:\s+and\b|[.,;!?]|\s*$)")
        .captures(command)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

fn step(action: Action, explanation: impl Into<String>) -> Action {
    action.with_explanation(explanation)
}

/// Keyword-driven plan for `command`.
pub fn plan_for(command: &str) -> Plan {
    let lower = command.to_lowercase();
    let mut steps;

    if lower.contains("priceline") {
        steps = vec![
            step(Action::navigate("https://www.priceline.com"), "Navigate to Priceline.com"),
            step(Action::click(150.0, 120.0), "Click on the Flights tab"),
        ];
        if lower.contains("flight") {
            let route = extract_route(command).unwrap_or_else(|| Route {
                origin: DEFAULT_ORIGIN.to_string(),
                destination: DEFAULT_DESTINATION.to_string(),
            });
            steps.push(step(
                Action::type_text(250.0, 200.0, route.origin.clone()),
                format!("Enter '{}' in the origin field", route.origin),
            ));
            steps.push(step(
                Action::type_text(450.0, 200.0, route.destination.clone()),
                format!("Enter '{}' in the destination field", route.destination),
            ));
            steps.push(step(Action::click(300.0, 250.0), "Click on the search button"));
        }
    } else if lower.contains("amazon") {
        steps = vec![step(Action::navigate("https://www.amazon.com"), "Navigate to Amazon.com")];
        if lower.contains("search") {
            let term = search_terms(command).unwrap_or_else(|| "products".to_string());
            steps.push(step(
                Action::type_text(400.0, 60.0, term.clone()),
                format!("Type '{term}' in the search box"),
            ));
            steps.push(step(Action::click(500.0, 60.0), "Click the search button"));
        }
    } else if lower.contains("weather") {
        let place = location(command).unwrap_or_else(|| "Current Location".to_string());
        let mut extract = Action::new(ActionKind::Extract).at(400.0, 250.0);
        extract.explanation = Some("Extract the weather information".to_string());
        steps = vec![
            step(Action::navigate("https://www.weather.com"), "Navigate to Weather.com"),
            step(
                Action::type_text(300.0, 80.0, place.clone()),
                format!("Enter '{place}' in the search field"),
            ),
            step(Action::click(350.0, 80.0), "Click the search button"),
            extract,
        ];
    } else if lower.contains("gmail") {
        steps = vec![step(Action::navigate("https://www.gmail.com"), "Navigate to Gmail.com")];
        if lower.contains("compose") {
            steps.push(step(Action::click(120.0, 150.0), "Click on the Compose button"));
            steps.push(step(
                Action::type_text(400.0, 200.0, "example@example.com"),
                "Enter recipient email address",
            ));
            steps.push(step(Action::type_text(400.0, 250.0, "Email Subject"), "Enter email subject"));
        }
    } else if lower.contains("twitter") || lower.contains("x.com") {
        steps = vec![step(Action::navigate("https://twitter.com"), "Navigate to Twitter.com")];
        if lower.contains("search") {
            let term = search_terms(command).unwrap_or_else(|| "#trending".to_string());
            steps.push(step(Action::click(400.0, 60.0), "Click on the search box"));
            steps.push(step(
                Action::type_text(400.0, 60.0, term.clone()),
                format!("Type '{term}' in the search box"),
            ));
            steps.push(step(Action::click(450.0, 100.0), "Click on the first search result"));
        }
    } else {
        steps = vec![step(Action::navigate("https://www.example.com"), "Navigate to example.com")];
    }

    Plan::new(steps, format!("Execute command: {command}"))
}

/// Escalating alternative for a failed step: nudge the coordinates, then
/// change approach, then a wider fallback offset.
pub fn alternative_for(failed: &Action, attempt: u32) -> Action {
    let mut alternative = failed.clone();
    match attempt {
        1 => {
            alternative.coordinates = failed.coordinates.map(|p| p.offset(20.0, 10.0));
            alternative.explanation = Some(format!("Retry with adjusted coordinates (attempt {attempt})"));
        }
        2 => match failed.kind {
            ActionKind::Type => {
                alternative = Action::new(ActionKind::Click);
                alternative.coordinates = failed.coordinates;
                alternative.explanation = Some(format!("Click the field first before typing (attempt {attempt})"));
            }
            _ => {
                alternative.coordinates = failed.coordinates.map(|p| p.offset(-20.0, -10.0));
                alternative.explanation = Some(format!("Try the opposite edge of the element (attempt {attempt})"));
            }
        },
        _ => {
            alternative.coordinates = failed.coordinates.map(|p| p.offset(50.0, -30.0));
            alternative.explanation = Some(format!("Using fallback method (attempt {attempt})"));
        }
    }
    alternative
}

pub struct OfflineOracle;

#[async_trait]
impl Oracle for OfflineOracle {
    fn name(&self) -> &str {
        OFFLINE_PROVIDER
    }

    async fn consult(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let reply = match &request.directive {
            Directive::Plan { command } => serde_json::to_value(plan_for(command)),
            Directive::Recover { failed_step, attempt, .. } => {
                let alternative = alternative_for(failed_step, *attempt);
                serde_json::to_value(&alternative).map(|step| {
                    json!({
                        "analysis": format!("Offline recovery strategy {attempt}"),
                        "alternativeStep": step,
                    })
                })
            }
            Directive::Replan { remaining, .. } => {
                serde_json::to_value(remaining).map(|steps| json!({ "steps": steps }))
            }
        }
        .map_err(|e| OracleError::UpstreamError(format!("offline planner produced invalid JSON: {e}")))?;

        tracing::debug!(directive = request.directive.label(), "offline planner replied");
        Ok(reply.to_string())
    }
}
