use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::ActionError;

const DEFAULT_WAIT_MS: u64 = 5000;

/// Action keyword as sent by the oracle. The set is open: anything not
/// recognised is kept verbatim in `Other` and rejected at validation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Click,
    Type,
    Extract,
    Navigate,
    Scroll,
    WaitForElement,
    None,
    Other(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Extract => "extract",
            ActionKind::Navigate => "navigate",
            ActionKind::Scroll => "scroll",
            ActionKind::WaitForElement => "waitForElement",
            ActionKind::None => "none",
            ActionKind::Other(raw) => raw,
        }
    }

    /// Parses a keyword case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "click" => ActionKind::Click,
            "type" => ActionKind::Type,
            "extract" => ActionKind::Extract,
            "navigate" => ActionKind::Navigate,
            "scroll" => ActionKind::Scroll,
            "waitforelement" => ActionKind::WaitForElement,
            "none" => ActionKind::None,
            _ => ActionKind::Other(raw.trim().to_string()),
        }
    }
}

impl From<String> for ActionKind {
    fn from(raw: String) -> Self {
        ActionKind::parse(&raw)
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewport coordinate pair in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    pub fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One plan entry in the oracle's wire shape. Deserialization accepts any
/// JSON object: a missing `action` or a field of the wrong type is kept as
/// absent and reported by [`Action::validate`] when the step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "action", default = "unnamed_kind", deserialize_with = "lenient_kind")]
    pub kind: ActionKind,
    #[serde(default, deserialize_with = "lenient_point", skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Point>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub scroll_direction: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub scroll_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            coordinates: None,
            text: None,
            url: None,
            scroll_direction: None,
            scroll_amount: None,
            explanation: None,
        }
    }

    pub fn click(x: f64, y: f64) -> Self {
        Self::new(ActionKind::Click).at(x, y)
    }

    pub fn type_text(x: f64, y: f64, text: impl Into<String>) -> Self {
        let mut action = Self::new(ActionKind::Type).at(x, y);
        action.text = Some(text.into());
        action
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        let mut action = Self::new(ActionKind::Navigate);
        action.url = Some(url.into());
        action
    }

    pub fn scroll(direction: ScrollDirection, amount: f64) -> Self {
        let mut action = Self::new(ActionKind::Scroll);
        action.scroll_direction = Some(direction.as_str().to_string());
        action.scroll_amount = Some(amount);
        action
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.coordinates = Some(Point::new(x, y));
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    /// Human-readable label: the explanation when present, else the keyword.
    pub fn describe(&self) -> &str {
        self.explanation
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| self.kind.as_str())
    }

    pub fn is_navigation(&self) -> bool {
        self.kind == ActionKind::Navigate
    }

    /// Checks the fields required by this action's kind and produces the
    /// typed instruction the environment executes.
    pub fn validate(&self) -> Result<Instruction, ActionError> {
        let missing = |field: &'static str| ActionError::MissingField {
            kind: self.kind.to_string(),
            field,
        };
        let non_empty = |value: &Option<String>| {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
        };

        match &self.kind {
            ActionKind::Other(raw) if raw.is_empty() => Err(ActionError::MissingField {
                kind: "unnamed".into(),
                field: "action",
            }),
            ActionKind::Click => {
                let at = self.coordinates.ok_or_else(|| missing("coordinates"))?;
                Ok(Instruction::Click { at })
            }
            ActionKind::Type => {
                let at = self.coordinates.ok_or_else(|| missing("coordinates"))?;
                let text = self.text.clone().ok_or_else(|| missing("text"))?;
                Ok(Instruction::Type { at, text })
            }
            ActionKind::Extract => match (self.coordinates, non_empty(&self.text)) {
                (Some(at), _) => Ok(Instruction::Extract { target: ExtractTarget::Point(at) }),
                (None, Some(selector)) => Ok(Instruction::Extract {
                    target: ExtractTarget::Selector(selector),
                }),
                (None, None) => Err(missing("coordinates")),
            },
            ActionKind::Navigate => {
                let url = non_empty(&self.url).ok_or_else(|| missing("url"))?;
                Ok(Instruction::Navigate { url })
            }
            ActionKind::Scroll => {
                let raw = non_empty(&self.scroll_direction).ok_or_else(|| missing("scrollDirection"))?;
                let direction = ScrollDirection::parse(&raw).ok_or_else(|| ActionError::InvalidValue {
                    field: "scrollDirection",
                    reason: format!("unknown direction '{raw}'"),
                })?;
                let amount = self.scroll_amount.ok_or_else(|| missing("scrollAmount"))?;
                if !amount.is_finite() || amount <= 0.0 {
                    return Err(ActionError::InvalidValue {
                        field: "scrollAmount",
                        reason: format!("expected a positive number, got {amount}"),
                    });
                }
                Ok(Instruction::Scroll { direction, amount })
            }
            ActionKind::WaitForElement => {
                let selector = non_empty(&self.text).ok_or_else(|| missing("text"))?;
                let ms = self
                    .scroll_amount
                    .filter(|v| v.is_finite() && *v > 0.0)
                    .map(|v| v as u64)
                    .unwrap_or(DEFAULT_WAIT_MS);
                Ok(Instruction::WaitForElement {
                    selector,
                    timeout: Duration::from_millis(ms),
                })
            }
            ActionKind::None => Ok(Instruction::None),
            ActionKind::Other(raw) => Err(ActionError::UnsupportedAction(raw.clone())),
        }
    }
}

// ── Lenient field decoding ────────────────────────────────────────────────

fn unnamed_kind() -> ActionKind {
    ActionKind::Other(String::new())
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn lenient_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ActionKind, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(raw) => ActionKind::parse(&raw),
        _ => unnamed_kind(),
    })
}

/// `{"x": .., "y": ..}` with numbers or numeric strings.
fn lenient_point<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Point>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let x = value.get("x").and_then(number);
    let y = value.get("y").and_then(number);
    Ok(x.zip(y).map(|(x, y)| Point::new(x, y)))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(number(&Value::deserialize(deserializer)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Some(ScrollDirection::Up),
            "down" => Some(ScrollDirection::Down),
            "left" => Some(ScrollDirection::Left),
            "right" => Some(ScrollDirection::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExtractTarget {
    Point(Point),
    Selector(String),
}

/// A validated action, ready for the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    Click { at: Point },
    Type { at: Point, text: String },
    Extract { target: ExtractTarget },
    Navigate { url: String },
    Scroll { direction: ScrollDirection, amount: f64 },
    WaitForElement { selector: String, timeout: Duration },
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively_and_keeps_unknown() {
        assert_eq!(ActionKind::parse("Click"), ActionKind::Click);
        assert_eq!(ActionKind::parse("waitForElement"), ActionKind::WaitForElement);
        assert_eq!(ActionKind::parse("doubleClick"), ActionKind::Other("doubleClick".into()));
        assert_eq!(ActionKind::WaitForElement.as_str(), "waitForElement");
    }

    #[test]
    fn deserializes_wire_shape() {
        let action: Action = serde_json::from_str(
            r#"{"action":"scroll","scrollDirection":"down","scrollAmount":300,"explanation":"see more"}"#,
        )
        .unwrap();
        assert_eq!(action.kind, ActionKind::Scroll);
        assert_eq!(
            action.validate().unwrap(),
            Instruction::Scroll { direction: ScrollDirection::Down, amount: 300.0 }
        );
    }

    #[test]
    fn null_coordinates_are_absent() {
        let action: Action =
            serde_json::from_str(r#"{"action":"click","coordinates":null}"#).unwrap();
        assert_eq!(action.coordinates, None);
    }

    #[test]
    fn wrongly_typed_fields_deserialize_as_absent() {
        let action: Action = serde_json::from_str(
            r#"{"action":"scroll","scrollDirection":"down","scrollAmount":"300px","text":94103}"#,
        )
        .unwrap();
        assert_eq!(action.scroll_amount, None);
        assert_eq!(action.text.as_deref(), Some("94103"));
        assert_eq!(
            action.validate().unwrap_err(),
            ActionError::MissingField { kind: "scroll".into(), field: "scrollAmount" }
        );

        let quoted: Action =
            serde_json::from_str(r#"{"action":"click","coordinates":{"x":"12","y":" 7.5"}}"#).unwrap();
        assert_eq!(quoted.coordinates, Some(Point::new(12.0, 7.5)));
    }

    #[test]
    fn missing_action_keyword_fails_validation_only() {
        let action: Action = serde_json::from_str(r#"{"explanation":"press it"}"#).unwrap();
        assert_eq!(action.kind, ActionKind::Other(String::new()));
        assert_eq!(
            action.validate().unwrap_err(),
            ActionError::MissingField { kind: "unnamed".into(), field: "action" }
        );
    }

    #[test]
    fn click_without_target_is_a_validation_failure() {
        let err = Action::new(ActionKind::Click).validate().unwrap_err();
        assert_eq!(
            err,
            ActionError::MissingField { kind: "click".into(), field: "coordinates" }
        );
    }

    #[test]
    fn navigate_requires_url() {
        assert!(matches!(
            Action::new(ActionKind::Navigate).validate(),
            Err(ActionError::MissingField { field: "url", .. })
        ));
        assert_eq!(
            Action::navigate("https://example.com").validate().unwrap(),
            Instruction::Navigate { url: "https://example.com".into() }
        );
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let action = Action::new(ActionKind::parse("pressKey"));
        assert_eq!(
            action.validate().unwrap_err(),
            ActionError::UnsupportedAction("pressKey".into())
        );
    }

    #[test]
    fn extract_accepts_selector_in_text() {
        let mut action = Action::new(ActionKind::Extract);
        action.text = Some(".price".into());
        assert_eq!(
            action.validate().unwrap(),
            Instruction::Extract { target: ExtractTarget::Selector(".price".into()) }
        );
    }

    #[test]
    fn wait_for_element_reuses_scroll_amount_as_budget() {
        let mut action = Action::new(ActionKind::WaitForElement);
        action.text = Some("#results".into());
        action.scroll_amount = Some(1500.0);
        assert_eq!(
            action.validate().unwrap(),
            Instruction::WaitForElement {
                selector: "#results".into(),
                timeout: Duration::from_millis(1500),
            }
        );
    }

    #[test]
    fn describe_falls_back_to_keyword() {
        assert_eq!(Action::click(1.0, 2.0).describe(), "click");
        assert_eq!(Action::click(1.0, 2.0).with_explanation("Press go").describe(), "Press go");
    }
}
