use tabpilot_lib::decoder::{decode_alternative, decode_plan, DecodeTier};
use tabpilot_lib::errors::DecodeError;
use tabpilot_lib::llm::offline::{extract_route, plan_for, Route};
use tabpilot_lib::plan::{Action, ActionKind, Plan, Point, ScrollDirection};

fn corrected() -> Plan {
    serde_json::from_str(
        r#"{
            "steps": [
                {"action": "click", "coordinates": {"x": 123, "y": 45}, "explanation": "Open search"},
                {"action": "type", "coordinates": {"x": 300, "y": 45}, "text": "red shoes", "explanation": "Type query"}
            ],
            "overallExplanation": "Search for red shoes"
        }"#,
    )
    .unwrap()
}

#[test]
fn malformed_but_salvageable_replies_match_the_corrected_json() {
    let variants = [
        // trailing commas
        r#"{"steps": [{"action": "click", "coordinates": {"x": 123, "y": 45}, "explanation": "Open search",}, {"action": "type", "coordinates": {"x": 300, "y": 45}, "text": "red shoes", "explanation": "Type query",},], "overallExplanation": "Search for red shoes",}"#,
        // single-quoted keys and values
        r#"{'steps': [{'action': 'click', 'coordinates': {'x': 123, 'y': 45}, 'explanation': 'Open search'}, {'action': 'type', 'coordinates': {'x': 300, 'y': 45}, 'text': 'red shoes', 'explanation': 'Type query'}], 'overallExplanation': 'Search for red shoes'}"#,
        // quoted numeric coordinates
        r#"{"steps": [{"action": "click", "coordinates": {"x": "123", "y": "45"}, "explanation": "Open search"}, {"action": "type", "coordinates": {"x": "300", "y": "45"}, "text": "red shoes", "explanation": "Type query"}], "overallExplanation": "Search for red shoes"}"#,
        // fenced, with prose around it
        "Here is the plan:\n```json\n{\"steps\": [{\"action\": \"click\", \"coordinates\": {\"x\": 123, \"y\": 45}, \"explanation\": \"Open search\"}, {\"action\": \"type\", \"coordinates\": {\"x\": 300, \"y\": 45}, \"text\": \"red shoes\", \"explanation\": \"Type query\"}], \"overallExplanation\": \"Search for red shoes\"}\n```\nLet me know!",
    ];

    for raw in variants {
        let decoded = decode_plan(raw).unwrap_or_else(|e| panic!("failed on {raw}: {e}"));
        assert_eq!(decoded.value, corrected(), "input: {raw}");
    }
}

#[test]
fn well_formed_plans_round_trip_through_the_strict_tier() {
    let mut wait = Action::new(ActionKind::WaitForElement);
    wait.text = Some("#results".into());
    wait.scroll_amount = Some(2500.0);

    let plans = [
        Plan::new(vec![], "nothing"),
        corrected(),
        Plan::new(
            vec![
                Action::navigate("https://example.com/a?b=c"),
                Action::scroll(ScrollDirection::Down, 400.0).with_explanation("see more"),
                Action::type_text(1.5, 2.25, "quote \" and brace }"),
                wait,
                Action::new(ActionKind::None),
            ],
            "mixed",
        ),
    ];

    for plan in plans {
        let raw = serde_json::to_string(&plan).unwrap();
        let decoded = decode_plan(&raw).unwrap();
        assert_eq!(decoded.tier, DecodeTier::Direct);
        assert_eq!(decoded.value, plan);
    }
}

#[test]
fn plain_text_with_keyword_and_coordinates_yields_one_action() {
    let text = "The best move is to click the Search button located at x: 640, y: 88.";

    let plan = decode_plan(text).unwrap();
    assert_eq!(plan.tier, DecodeTier::PatternMatch);
    assert_eq!(plan.value.len(), 1);
    assert_eq!(plan.value.steps[0].kind, ActionKind::Click);
    assert_eq!(plan.value.steps[0].coordinates, Some(Point::new(640.0, 88.0)));

    let alternative = decode_alternative(text).unwrap();
    assert_eq!(alternative.value.coordinates, Some(Point::new(640.0, 88.0)));
}

#[test]
fn plain_text_without_keyword_or_coordinates_fails() {
    for text in [
        "I could not find anything useful on this page.",
        "Try clicking somewhere near the top.",
        "Position x: 10, y: 20 looks interesting.",
        "",
    ] {
        let err = decode_plan(text).unwrap_err();
        assert!(matches!(err, DecodeError::Exhausted { .. } | DecodeError::Empty), "input: {text}");
        assert!(decode_alternative(text).is_err(), "input: {text}");
    }
}

#[test]
fn offline_route_extraction_is_exact() {
    assert_eq!(
        extract_route("from Reno to Denver"),
        Some(Route {
            origin: "Reno".into(),
            destination: "Denver".into(),
        })
    );

    let plan = plan_for("Use priceline to find a flight from Reno to Denver");
    let typed: Vec<&str> = plan.steps.iter().filter_map(|s| s.text.as_deref()).collect();
    assert_eq!(typed, vec!["Reno", "Denver"]);
}
