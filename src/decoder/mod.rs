//! Resilient decoding of free-form oracle replies into plans and alternatives.
//!
//! Tiers run in order and the first success wins:
//! direct parse, repaired parse, steps/alternative salvage, flat-object scan,
//! and finally pattern matching over the raw text.

pub(crate) mod extract;
pub(crate) mod salvage;
pub mod sanitize;

use std::fmt;

use serde_json::Value;

use crate::decoder::extract::outermost_block;
use crate::decoder::salvage::{action_from_value, step_from_value};
use crate::decoder::sanitize::repair_all;
use crate::errors::DecodeError;
use crate::plan::{Action, Plan};

const SALVAGED_STEPS: &str = "Extracted from malformed JSON";
const RECOVERED_OBJECT: &str = "Recovered from malformed JSON";
const FROM_TEXT: &str = "Constructed from text response";
const SINGLE_ACTION: &str = "Executing single action";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeTier {
    Direct,
    Sanitized,
    Salvaged,
    ObjectScan,
    PatternMatch,
}

impl fmt::Display for DecodeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecodeTier::Direct => "direct",
            DecodeTier::Sanitized => "sanitized",
            DecodeTier::Salvaged => "salvaged",
            DecodeTier::ObjectScan => "object_scan",
            DecodeTier::PatternMatch => "pattern_match",
        };
        f.write_str(name)
    }
}

/// A decoded value and the tier that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub tier: DecodeTier,
}

impl<T> Decoded<T> {
    fn new(value: T, tier: DecodeTier) -> Self {
        Self { value, tier }
    }
}

/// Decodes a planning reply (`{"steps": [...], "overallExplanation": ...}`).
pub fn decode_plan(raw: &str) -> Result<Decoded<Plan>, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    let decoded = decode_plan_tiers(raw);
    match &decoded {
        Some(d) => tracing::debug!(tier = %d.tier, steps = d.value.len(), "plan decoded"),
        None => tracing::warn!(reply_len = raw.len(), "plan decoding exhausted every tier"),
    }
    decoded.ok_or_else(|| DecodeError::Exhausted {
        expected: "plan",
        reason: "no steps, action object, or action keyword with coordinates".into(),
    })
}

/// Decodes a recovery reply (`{"analysis": ..., "alternativeStep": {...}}`).
pub fn decode_alternative(raw: &str) -> Result<Decoded<Action>, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    let decoded = decode_alternative_tiers(raw);
    match &decoded {
        Some(d) => tracing::debug!(tier = %d.tier, kind = %d.value.kind, "alternative decoded"),
        None => tracing::warn!(reply_len = raw.len(), "alternative decoding exhausted every tier"),
    }
    decoded.ok_or_else(|| DecodeError::Exhausted {
        expected: "alternative step",
        reason: "no alternativeStep, action object, or action keyword with coordinates".into(),
    })
}

fn decode_plan_tiers(raw: &str) -> Option<Decoded<Plan>> {
    if let Some(block) = outermost_block(raw) {
        if let Some(plan) = parse_strict(block).and_then(plan_from_value) {
            return Some(Decoded::new(plan, DecodeTier::Direct));
        }

        let repaired = repair_all(block);
        if let Some(plan) = parse_strict(&repaired).and_then(plan_from_value) {
            return Some(Decoded::new(plan, DecodeTier::Sanitized));
        }

        if let Some(steps) = salvage::steps_array(&repaired).or_else(|| salvage::steps_array(block)) {
            return Some(Decoded::new(Plan::new(steps, SALVAGED_STEPS), DecodeTier::Salvaged));
        }
    }

    if let Some(action) = salvage::object_scan(raw) {
        return Some(Decoded::new(Plan::new(vec![action], RECOVERED_OBJECT), DecodeTier::ObjectScan));
    }

    salvage::pattern_match(raw)
        .map(|action| Decoded::new(Plan::new(vec![action], FROM_TEXT), DecodeTier::PatternMatch))
}

fn decode_alternative_tiers(raw: &str) -> Option<Decoded<Action>> {
    if let Some(block) = outermost_block(raw) {
        if let Some(action) = parse_strict(block).and_then(alternative_from_value) {
            return Some(Decoded::new(action, DecodeTier::Direct));
        }

        let repaired = repair_all(block);
        if let Some(action) = parse_strict(&repaired).and_then(alternative_from_value) {
            return Some(Decoded::new(action, DecodeTier::Sanitized));
        }

        let salvaged = salvage::alternative_object(&repaired)
            .or_else(|| salvage::alternative_object(block));
        if let Some(action) = salvaged {
            return Some(Decoded::new(action, DecodeTier::Salvaged));
        }
    }

    if let Some(action) = salvage::object_scan(raw) {
        return Some(Decoded::new(action, DecodeTier::ObjectScan));
    }

    salvage::pattern_match(raw).map(|action| Decoded::new(action, DecodeTier::PatternMatch))
}

fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// `{"steps": [...]}` or a bare action object promoted to a one-step plan.
fn plan_from_value(value: Value) -> Option<Plan> {
    let overall = value
        .get("overallExplanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match value.get("steps") {
        Some(Value::Array(entries)) => {
            let steps = entries
                .iter()
                .cloned()
                .map(step_from_value)
                .collect::<Option<Vec<Action>>>()?;
            Some(Plan::new(steps, overall))
        }
        Some(_) => None,
        None => {
            let action = action_from_value(value)?;
            let overall = action
                .explanation
                .clone()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| SINGLE_ACTION.to_string());
            Some(Plan::new(vec![action], overall))
        }
    }
}

/// `{"alternativeStep": {...}}`, a bare action object, or the first entry of
/// a `steps` array.
fn alternative_from_value(value: Value) -> Option<Action> {
    if let Some(step) = value.get("alternativeStep") {
        return action_from_value(step.clone());
    }
    if value.get("action").is_some() {
        return action_from_value(value);
    }
    value
        .get("steps")
        .and_then(Value::as_array)
        .and_then(|steps| steps.first().cloned())
        .and_then(action_from_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ActionKind, Point};

    #[test]
    fn empty_reply_is_a_typed_error() {
        assert_eq!(decode_plan("   ").unwrap_err(), DecodeError::Empty);
        assert_eq!(decode_alternative("").unwrap_err(), DecodeError::Empty);
    }

    #[test]
    fn direct_tier_handles_prose_around_json() {
        let raw = "Here you go:\n{\"steps\":[{\"action\":\"navigate\",\"url\":\"https://a.example\"}],\"overallExplanation\":\"open\"}\nDone.";
        let decoded = decode_plan(raw).unwrap();
        assert_eq!(decoded.tier, DecodeTier::Direct);
        assert_eq!(decoded.value, Plan::new(vec![Action::navigate("https://a.example")], "open"));
    }

    #[test]
    fn quoted_coordinates_in_valid_json_are_coerced() {
        let raw = r#"{"steps":[{"action":"click","coordinates":{"x":"120","y":"45"}}],"overallExplanation":"o"}"#;
        let decoded = decode_plan(raw).unwrap();
        assert_eq!(decoded.tier, DecodeTier::Direct);
        assert_eq!(decoded.value.steps[0].coordinates, Some(Point::new(120.0, 45.0)));
    }

    #[test]
    fn one_bad_step_does_not_shrink_the_plan() {
        let raw = r#"{"steps":[
            {"action":"navigate","url":"https://a.example"},
            {"action":"scroll","scrollDirection":"down","scrollAmount":"300px"},
            {"action":"click","coordinates":{"x":4,"y":5}}
        ],"overallExplanation":"browse"}"#;
        let decoded = decode_plan(raw).unwrap();
        assert_eq!(decoded.tier, DecodeTier::Direct);
        assert_eq!(decoded.value.len(), 3);
        assert_eq!(decoded.value.overall_explanation, "browse");
        assert_eq!(decoded.value.steps[2], Action::click(4.0, 5.0));
        assert!(decoded.value.steps[1].validate().is_err());

        let raw = r#"{"steps":[{"action":"click","coordinates":{"x":1,"y":1}},{"explanation":"then this"},{"action":"click","coordinates":{"x":2,"y":2}}],"overallExplanation":"two clicks"}"#;
        let decoded = decode_plan(raw).unwrap();
        assert_eq!(decoded.value.len(), 3);
        assert_eq!(decoded.value.steps[1].kind, ActionKind::Other(String::new()));
        assert_eq!(decoded.value.overall_explanation, "two clicks");
    }

    #[test]
    fn non_object_step_rejects_the_direct_tier() {
        let raw = r#"{"steps":[{"action":"click","coordinates":{"x":1,"y":1}}, 42],"overallExplanation":"o"}"#;
        let decoded = decode_plan(raw).unwrap();
        assert_ne!(decoded.tier, DecodeTier::Direct);
    }

    #[test]
    fn single_action_reply_becomes_one_step_plan() {
        let decoded = decode_plan(r#"{"action":"scroll","scrollDirection":"down","scrollAmount":200}"#).unwrap();
        assert_eq!(decoded.value.len(), 1);
        assert_eq!(decoded.value.overall_explanation, SINGLE_ACTION);
    }

    #[test]
    fn truncated_reply_keeps_complete_steps() {
        let raw = r#"{"steps":[{"action":"navigate","url":"https://a.example","explanation":"go"},{"action":"cli"#;
        let decoded = decode_plan(raw).unwrap();
        assert_eq!(decoded.tier, DecodeTier::Salvaged);
        assert_eq!(decoded.value.len(), 1);
        assert_eq!(decoded.value.overall_explanation, SALVAGED_STEPS);
    }

    #[test]
    fn pattern_tier_is_last_resort() {
        let decoded = decode_plan("I'll click the login link at x: 40, y: 12.").unwrap();
        assert_eq!(decoded.tier, DecodeTier::PatternMatch);
        assert_eq!(decoded.value.steps[0].kind, ActionKind::Click);
        assert_eq!(decoded.value.overall_explanation, FROM_TEXT);
    }

    #[test]
    fn nothing_recognisable_fails() {
        let err = decode_plan("I'm sorry, I can't see the page.").unwrap_err();
        assert!(matches!(err, DecodeError::Exhausted { expected: "plan", .. }));
    }

    #[test]
    fn alternative_reply_decodes_nested_step() {
        let raw = r#"{"analysis": "button moved", "alternativeStep": {"action": "click", "coordinates": {"x": 10, "y": 20}, "explanation": "retry lower"}}"#;
        let decoded = decode_alternative(raw).unwrap();
        assert_eq!(decoded.tier, DecodeTier::Direct);
        assert_eq!(decoded.value, Action::click(10.0, 20.0).with_explanation("retry lower"));
    }

    #[test]
    fn alternative_with_loose_quoting_is_sanitized() {
        let raw = "```json\n{analysis: 'moved', alternativeStep: {action: 'click', coordinates: {x: '10', y: '20'},},}\n```";
        let decoded = decode_alternative(raw).unwrap();
        assert_eq!(decoded.value, Action::click(10.0, 20.0));
    }

    #[test]
    fn alternative_without_action_keyword_fails() {
        assert!(decode_alternative(r#"{"analysis": "no idea"}"#).is_err());
    }
}
