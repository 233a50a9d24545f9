//! Directive text sent alongside the snapshot.

use crate::llm::provider::Directive;
use crate::plan::Action;

const ACTION_SHAPE: &str = r#"{
    "action": "click" | "type" | "extract" | "navigate" | "scroll" | "waitForElement" | "none",
    "coordinates": { "x": number, "y": number } (REQUIRED for click and type actions),
    "text": string (text to type, or a selector for extract / waitForElement),
    "url": string (for navigate),
    "explanation": string (what this step does),
    "scrollDirection": "up" | "down" | "left" | "right" (for scroll),
    "scrollAmount": number (pixels for scroll, milliseconds for waitForElement)
  }"#;

const FORMAT_RULES: &str = "\
JSON FORMATTING RULES:
1. Use double quotes for every property name and every string value.
2. Do not use single quotes anywhere in the JSON.
3. No trailing commas after the last property of an object or element of an array.
4. Do not put any text or markdown before or after the JSON object.
5. Coordinates must be numbers, not strings: \"x\": 150, not \"x\": \"150\".

COORDINATE GUIDELINES:
1. For click and type actions give the coordinates of the CENTER of the element.
2. If you are unsure of the exact location, give your best estimate.
3. Type actions always carry both \"text\" and \"coordinates\"; the coordinates are those of the input field.";

/// Full directive text for one oracle request.
pub fn render(directive: &Directive) -> String {
    match directive {
        Directive::Plan { command } => plan_prompt(command),
        Directive::Recover {
            command,
            failed_step,
            error,
            attempt,
            max_retries,
            previous_attempts,
        } => recover_prompt(command, failed_step, error, *attempt, *max_retries, previous_attempts),
        Directive::Replan {
            command,
            remaining,
            context_note,
        } => replan_prompt(command, remaining, context_note),
    }
}

fn plan_prompt(command: &str) -> String {
    format!(
        "Analyze this webpage screenshot and carry out this command: \"{command}\".\n\
         Break the command down into a series of steps if it is complex.\n\n\
         Respond with ONLY a single valid JSON object with this structure:\n\
         {{\n  \"steps\": [\n  {ACTION_SHAPE}\n  ],\n  \"overallExplanation\": string\n}}\n\n\
         {FORMAT_RULES}"
    )
}

fn recover_prompt(
    command: &str,
    failed_step: &Action,
    error: &str,
    attempt: u32,
    max_retries: u32,
    previous_attempts: &[Action],
) -> String {
    let mut prompt = format!(
        "This browser automation step has failed.\n\n\
         Original command: \"{command}\"\n\n\
         Failed step: {}\n\n\
         Error message: \"{error}\"\n\n\
         This is recovery attempt {attempt} of {max_retries}.\n",
        to_json(failed_step),
    );
    if !previous_attempts.is_empty() {
        prompt.push_str("\nThese alternatives were already tried and also failed:\n");
        for (i, tried) in previous_attempts.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, to_json(tried)));
        }
    }
    prompt.push_str(&format!(
        "\nBased on the screenshot, propose an alternative way to accomplish the same thing, \
         using a strategy different from the failed step and from every alternative listed above.\n\n\
         Respond with ONLY a single valid JSON object with this structure:\n\
         {{\n  \"analysis\": string (what went wrong),\n  \"alternativeStep\": {ACTION_SHAPE}\n}}\n\n\
         {FORMAT_RULES}"
    ));
    prompt
}

fn replan_prompt(command: &str, remaining: &[Action], context_note: &str) -> String {
    format!(
        "{context_note} Original command: \"{command}\"\n\
         Based on this new screenshot, provide updated steps to complete the remaining parts of the command.\n\
         The previously planned remaining steps were: {}\n\n\
         Respond with ONLY a single valid JSON object with this structure:\n\
         {{\n  \"steps\": [\n  {ACTION_SHAPE}\n  ]\n}}\n\n\
         {FORMAT_RULES}",
        serde_json::to_string(remaining).unwrap_or_else(|_| "[]".to_string()),
    )
}

fn to_json(action: &Action) -> String {
    serde_json::to_string_pretty(action).unwrap_or_else(|_| action.describe().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_prompt_quotes_the_command_and_asks_for_steps() {
        let text = render(&Directive::Plan {
            command: "search for socks".into(),
        });
        assert!(text.contains("\"search for socks\""));
        assert!(text.contains("\"steps\""));
        assert!(text.contains("\"overallExplanation\""));
        assert!(text.contains("Coordinates must be numbers"));
    }

    #[test]
    fn recover_prompt_lists_previous_attempts() {
        let text = render(&Directive::Recover {
            command: "log in".into(),
            failed_step: Action::click(10.0, 20.0).with_explanation("Click login"),
            error: "element not found".into(),
            attempt: 3,
            max_retries: 3,
            previous_attempts: vec![Action::click(30.0, 30.0), Action::click(40.0, 40.0)],
        });
        assert!(text.contains("recovery attempt 3 of 3"));
        assert!(text.contains("\"element not found\""));
        assert!(text.contains("Click login"));
        assert!(text.contains("already tried"));
        assert!(text.contains("2. {"));
        assert!(text.contains("\"alternativeStep\""));
    }

    #[test]
    fn first_recovery_attempt_has_no_history_section() {
        let text = render(&Directive::Recover {
            command: "c".into(),
            failed_step: Action::click(1.0, 1.0),
            error: "e".into(),
            attempt: 1,
            max_retries: 3,
            previous_attempts: Vec::new(),
        });
        assert!(!text.contains("already tried"));
    }

    #[test]
    fn replan_prompt_carries_context_and_remaining_steps() {
        let text = render(&Directive::Replan {
            command: "book".into(),
            remaining: vec![Action::click(5.0, 6.0)],
            context_note: "Navigated to https://a.example.".into(),
        });
        assert!(text.starts_with("Navigated to https://a.example."));
        assert!(text.contains(r#"[{"action":"click","coordinates":{"x":5.0,"y":6.0}}]"#));
    }
}
