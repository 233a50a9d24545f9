use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::environment::{Environment, Snapshot};
use crate::errors::{CaptureError, StepExecutionError};
use crate::plan::{ExtractTarget, Instruction, Point, ScrollDirection};

/// In-memory page for the demo binary. Clicks and typing land unless they
/// fall within `tolerance` of a broken point.
pub struct SimulatedEnvironment {
    broken: Vec<Point>,
    tolerance: f64,
    elements: HashSet<String>,
    state: Mutex<PageState>,
}

#[derive(Debug, Default)]
struct PageState {
    url: Option<String>,
    scroll: (f64, f64),
    performed: Vec<Instruction>,
}

impl SimulatedEnvironment {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            broken: Vec::new(),
            tolerance: 15.0,
            elements: HashSet::new(),
            state: Mutex::new(PageState {
                url: Some(url.into()),
                ..PageState::default()
            }),
        }
    }

    /// A page with no target at all.
    pub fn detached() -> Self {
        Self {
            broken: Vec::new(),
            tolerance: 15.0,
            elements: HashSet::new(),
            state: Mutex::new(PageState::default()),
        }
    }

    /// Blank start page whose first-guess "Flights" tab misses, so the
    /// recovery loop has something to do.
    pub fn demo() -> Self {
        Self::new("about:blank")
            .with_broken_point(Point::new(150.0, 120.0))
            .with_element("#results")
    }

    pub fn with_broken_point(mut self, point: Point) -> Self {
        self.broken.push(point);
        self
    }

    pub fn with_element(mut self, selector: impl Into<String>) -> Self {
        self.elements.insert(selector.into());
        self
    }

    /// Every instruction performed so far, in order.
    pub async fn performed(&self) -> Vec<Instruction> {
        self.state.lock().await.performed.clone()
    }

    fn hit(&self, verb: &str, at: Point) -> Result<(), StepExecutionError> {
        if self.broken.iter().any(|p| p.distance(at) <= self.tolerance) {
            return Err(StepExecutionError::new(format!(
                "Failed to {verb} at coordinates {at}: Element not found"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Environment for SimulatedEnvironment {
    async fn active_target(&self) -> Option<String> {
        self.state.lock().await.url.clone()
    }

    async fn capture(&self) -> Result<Snapshot, CaptureError> {
        let state = self.state.lock().await;
        let url = state.url.as_deref().ok_or(CaptureError::NoTarget)?;
        let frame = format!(
            "simulated-frame url={url} scroll={},{} actions={}",
            state.scroll.0,
            state.scroll.1,
            state.performed.len()
        );
        Ok(Snapshot::from_bytes("image/png", frame.as_bytes()))
    }

    async fn perform(&self, instruction: &Instruction) -> Result<Value, StepExecutionError> {
        let outcome = match instruction {
            Instruction::Click { at } => self.hit("click", *at).map(|_| {
                json!({ "message": format!("Clicked at {at}") })
            }),
            Instruction::Type { at, text } => self.hit("type", *at).map(|_| {
                json!({ "message": format!("Typed '{text}' at {at}") })
            }),
            Instruction::Extract { target } => match target {
                ExtractTarget::Point(at) => self
                    .hit("extract", *at)
                    .map(|_| json!({ "text": format!("Content at {at}") })),
                ExtractTarget::Selector(selector) if self.elements.contains(selector) => {
                    Ok(json!({ "text": format!("Content of {selector}") }))
                }
                ExtractTarget::Selector(selector) => {
                    Err(StepExecutionError::new(format!("Element not found: {selector}")))
                }
            },
            Instruction::Navigate { url } => {
                let mut state = self.state.lock().await;
                state.url = Some(url.clone());
                state.scroll = (0.0, 0.0);
                Ok(json!({ "message": format!("Navigating to {url}") }))
            }
            Instruction::Scroll { direction, amount } => {
                let mut state = self.state.lock().await;
                let (dx, dy) = match direction {
                    ScrollDirection::Up => (0.0, -amount),
                    ScrollDirection::Down => (0.0, *amount),
                    ScrollDirection::Left => (-amount, 0.0),
                    ScrollDirection::Right => (*amount, 0.0),
                };
                state.scroll = (state.scroll.0 + dx, state.scroll.1 + dy);
                Ok(json!({ "message": format!("Scrolled {} by {amount}px", direction.as_str()) }))
            }
            Instruction::WaitForElement { selector, timeout } => {
                if self.elements.contains(selector) {
                    Ok(json!({ "message": format!("Element {selector} found") }))
                } else {
                    Err(StepExecutionError::new(format!(
                        "Timed out after {}ms waiting for {selector}",
                        timeout.as_millis()
                    )))
                }
            }
            Instruction::None => Ok(json!({ "message": "No action needed" })),
        };

        self.state.lock().await.performed.push(instruction.clone());
        match &outcome {
            Ok(_) => tracing::debug!(instruction = ?instruction, "simulated instruction performed"),
            Err(e) => tracing::debug!(instruction = ?instruction, error = %e, "simulated instruction failed"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn clicks_near_broken_points_fail() {
        let env = SimulatedEnvironment::new("https://a.example").with_broken_point(Point::new(100.0, 100.0));
        let miss = env.perform(&Instruction::Click { at: Point::new(105.0, 100.0) }).await;
        assert!(miss.unwrap_err().message.contains("Element not found"));
        let hit = env.perform(&Instruction::Click { at: Point::new(130.0, 110.0) }).await;
        assert!(hit.is_ok());
        assert_eq!(env.performed().await.len(), 2);
    }

    #[tokio::test]
    async fn navigation_changes_the_target() {
        let env = SimulatedEnvironment::demo();
        env.perform(&Instruction::Navigate { url: "https://b.example".into() })
            .await
            .unwrap();
        assert_eq!(env.active_target().await.as_deref(), Some("https://b.example"));
        assert!(env.capture().await.is_ok());
    }

    #[tokio::test]
    async fn detached_page_cannot_be_captured() {
        let env = SimulatedEnvironment::detached();
        assert!(env.active_target().await.is_none());
        assert_eq!(env.capture().await.unwrap_err(), CaptureError::NoTarget);
    }

    #[tokio::test]
    async fn wait_for_unknown_element_times_out() {
        let env = SimulatedEnvironment::demo();
        let ok = env
            .perform(&Instruction::WaitForElement { selector: "#results".into(), timeout: Duration::from_millis(10) })
            .await;
        assert!(ok.is_ok());
        let err = env
            .perform(&Instruction::WaitForElement { selector: "#nope".into(), timeout: Duration::from_millis(10) })
            .await
            .unwrap_err();
        assert!(err.message.contains("10ms"));
        let scrolled = env
            .perform(&Instruction::Scroll { direction: ScrollDirection::Down, amount: 300.0 })
            .await
            .unwrap();
        assert_eq!(scrolled["message"], "Scrolled down by 300px");
    }
}
