use serde_json::Value;

use crate::decoder::extract::{array_elements, flat_objects, matching_close};
use crate::decoder::sanitize::repair_all;
use crate::plan::{Action, ActionKind, Point};

/// Parses `text` strictly and converts it; on failure retries once after the
/// repair chain.
pub(crate) fn parse_as<T>(text: &str, convert: impl Fn(Value) -> Option<T>) -> Option<T> {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(&convert)
        .or_else(|| serde_json::from_str::<Value>(&repair_all(text)).ok().and_then(&convert))
}

/// An object with a string `action` keyword that deserializes as an [`Action`].
pub(crate) fn action_from_value(value: Value) -> Option<Action> {
    if !value.get("action").is_some_and(Value::is_string) {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// A plan entry: any JSON object. Bad or missing fields are left for
/// [`Action::validate`] so one malformed entry does not drop its neighbours.
pub(crate) fn step_from_value(value: Value) -> Option<Action> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Tier 3: the `{...}` entries of the `"steps": [...]` array on their own.
/// Every complete entry must parse; one cut off by truncation is dropped.
pub(crate) fn steps_array(text: &str) -> Option<Vec<Action>> {
    let open = regex!(r#"['"]?steps['"]?\s*:\s*\["#).find(text)?.end() - 1;
    let elements = array_elements(text, open);
    if elements.is_empty() {
        return None;
    }
    elements
        .into_iter()
        .map(|elem| parse_as(elem, step_from_value))
        .collect()
}

/// Tier 3 for recovery replies: the `"alternativeStep": {...}` object on its own.
pub(crate) fn alternative_object(text: &str) -> Option<Action> {
    let open = regex!(r#"['"]?alternativeStep['"]?\s*:\s*\{"#).find(text)?.end() - 1;
    let end = matching_close(text, open)?;
    parse_as(&text[open..=end], action_from_value)
}

/// Tier 4: the first flat `{...}` carrying a recognised action field.
pub(crate) fn object_scan(text: &str) -> Option<Action> {
    flat_objects(text).into_iter().find_map(|candidate| {
        parse_as(candidate, |value| {
            let recognised = ["action", "coordinates", "text"]
                .iter()
                .any(|field| value.get(field).is_some());
            if recognised {
                action_from_value(value)
            } else {
                None
            }
        })
    })
}

/// Tier 5: independent pattern matches over the raw text. Needs at least an
/// action keyword and a coordinate pair.
pub(crate) fn pattern_match(text: &str) -> Option<Action> {
    let keyword = regex!(
        r#"(?i)\b(?:action|kind)\b['"]?\s*[:=]?\s*['"]?(click|type|extract|navigate|scroll|waitforelement)\b"#
    )
    .captures(text)
    .or_else(|| regex!(r"(?i)\b(click|type|extract|navigate|scroll)\b").captures(text))?
    .get(1)?
    .as_str()
    .to_string();

    let point = coordinate_pair(text)?;

    let kind = ActionKind::parse(&keyword);
    let mut action = Action::new(kind.clone());
    action.coordinates = Some(point);
    action.text = quoted_field(text, "text");
    action.url = regex!(r#"(?i)\burl\b['"]?\s*[:=]\s*['"]?(https?://[^\s'",}]+)"#)
        .captures(text)
        .map(|c| c[1].to_string());
    action.explanation =
        Some(quoted_field(text, "explanation").unwrap_or_else(|| format!("Perform {kind} action")));
    Some(action)
}

fn coordinate_pair(text: &str) -> Option<Point> {
    let labelled = regex!(
        r#"(?is)\bx\b['"]?\s*[:=]\s*['"]?\s*(-?\d+(?:\.\d+)?).*?\by\b['"]?\s*[:=]\s*['"]?\s*(-?\d+(?:\.\d+)?)"#
    );
    let tuple = regex!(r"\(\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*\)");
    let caps = labelled.captures(text).or_else(|| tuple.captures(text))?;
    let x = caps[1].parse().ok()?;
    let y = caps[2].parse().ok()?;
    Some(Point::new(x, y))
}

fn quoted_field(text: &str, field: &str) -> Option<String> {
    let pattern = format!(r#"(?i)\b{field}\b['"]?\s*[:=]\s*(?:"([^"]+)"|'([^']+)')"#);
    let re = regex::Regex::new(&pattern).ok()?;
    let caps = re.captures(text)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_array_isolated_from_broken_wrapper() {
        let text = r#"{"steps": [{"action": "click", "coordinates": {"x": 1, "y": 2}}], "overallExplanation": oops "#;
        let steps = steps_array(text).unwrap();
        assert_eq!(steps, vec![Action::click(1.0, 2.0)]);
    }

    #[test]
    fn steps_array_keeps_entries_with_bad_fields() {
        let text = r#"{"steps": [{"action": "click"}, {"coordinates": {"x": 1}}, {"action": "navigate", "url": "https://a.b"}], oops"#;
        let steps = steps_array(text).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].kind, ActionKind::Other(String::new()));
        assert_eq!(steps[1].coordinates, None);
        assert_eq!(steps[2], Action::navigate("https://a.b"));
    }

    #[test]
    fn steps_array_rejects_unparseable_element() {
        let text = r#"{"steps": [{"action": "click"}, {"action" "click" ::}]}"#;
        assert!(steps_array(text).is_none());
    }

    #[test]
    fn alternative_object_is_found_inside_prose() {
        let text = r#"Analysis: the button moved. "alternativeStep": {"action": "click", "coordinates": {"x": 5, "y": 6},} and more"#;
        assert_eq!(alternative_object(text), Some(Action::click(5.0, 6.0)));
    }

    #[test]
    fn object_scan_needs_an_action_keyword() {
        assert!(object_scan(r#"{"x": 1, "y": 2}"#).is_none());
        let found = object_scan(r#"garbage {"x": 1} {"action": "navigate", "url": "https://a.b"} tail"#);
        assert_eq!(found, Some(Action::navigate("https://a.b")));
    }

    #[test]
    fn pattern_match_builds_minimal_action() {
        let text = r#"I would action: "click" the search button at coordinates x: 310, y: 42 explanation: "Press search""#;
        let action = pattern_match(text).unwrap();
        assert_eq!(action.kind, ActionKind::Click);
        assert_eq!(action.coordinates, Some(Point::new(310.0, 42.0)));
        assert_eq!(action.explanation.as_deref(), Some("Press search"));
    }

    #[test]
    fn pattern_match_requires_coordinates() {
        assert!(pattern_match("just click the big button").is_none());
        assert!(pattern_match("coordinates x: 1, y: 2 but nothing to do").is_none());
    }

    #[test]
    fn pattern_match_accepts_tuple_coordinates() {
        let action = pattern_match("Type 'hello' into the field at (120, 48)").unwrap();
        assert_eq!(action.kind, ActionKind::Type);
        assert_eq!(action.coordinates, Some(Point::new(120.0, 48.0)));
        assert_eq!(action.explanation.as_deref(), Some("Perform type action"));
    }
}
