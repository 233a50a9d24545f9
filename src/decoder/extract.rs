/// A run of text that is either inside a double-quoted JSON string (quotes
/// included) or outside of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment<'a> {
    pub quoted: bool,
    pub text: &'a str,
}

/// Splits `text` into alternating quoted / unquoted runs. Backslash escapes
/// inside strings are honoured; an unterminated string runs to the end.
pub(crate) fn split_strings(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                segments.push(Segment { quoted: true, text: &text[start..=i] });
                start = i + 1;
                in_string = false;
            }
        } else if ch == '"' {
            if i > start {
                segments.push(Segment { quoted: false, text: &text[start..i] });
            }
            start = i;
            in_string = true;
        }
    }
    if start < text.len() {
        segments.push(Segment { quoted: in_string, text: &text[start..] });
    }
    segments
}

/// Applies `f` to every unquoted run and leaves string literals untouched.
pub(crate) fn map_unquoted(text: &str, f: impl Fn(&str) -> String) -> String {
    split_strings(text)
        .into_iter()
        .map(|seg| if seg.quoted { seg.text.to_string() } else { f(seg.text) })
        .collect()
}

/// Byte offset of the bracket closing the one at `open` (`{` or `[`), skipping
/// over string literals. `None` when the text ends first.
pub(crate) fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if !matches!(bytes.get(open), Some(b'{') | Some(b'[')) {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Outermost `{...}` span of the reply. Falls back to first-`{`-to-last-`}`
/// when braces don't balance, and to first-`{`-to-end when the reply was
/// truncated before any closing brace.
pub(crate) fn outermost_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    if let Some(end) = matching_close(text, start) {
        return Some(&text[start..=end]);
    }
    match text.rfind('}') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

/// Brace-delimited substrings that contain no nested braces.
pub(crate) fn flat_objects(text: &str) -> Vec<&str> {
    regex!(r"\{[^{}]*\}")
        .find_iter(text)
        .map(|m| m.as_str())
        .collect()
}

/// Complete `{...}` elements of the array whose `[` sits at `open`. Stops at
/// the closing `]` or at the first element cut off by truncation.
pub(crate) fn array_elements(text: &str, open: usize) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut elements = Vec::new();
    let mut i = open + 1;

    while i < bytes.len() {
        match bytes[i] {
            b']' => break,
            b'{' => match matching_close(text, i) {
                Some(end) => {
                    elements.push(&text[i..=end]);
                    i = end + 1;
                }
                None => break,
            },
            _ => i += 1,
        }
    }
    elements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_escaped_quotes_inside_strings() {
        let segs = split_strings(r#"{"a": "say \"hi\"", b: 1}"#);
        let quoted: Vec<&str> = segs.iter().filter(|s| s.quoted).map(|s| s.text).collect();
        assert_eq!(quoted, vec![r#""a""#, r#""say \"hi\"""#]);
        let joined: String = segs.iter().map(|s| s.text).collect();
        assert_eq!(joined, r#"{"a": "say \"hi\"", b: 1}"#);
    }

    #[test]
    fn map_unquoted_leaves_strings_alone() {
        let out = map_unquoted(r#"{"a:b": c}"#, |s| s.replace(':', "="));
        assert_eq!(out, r#"{"a:b"= c}"#);
    }

    #[test]
    fn outermost_block_ignores_surrounding_prose() {
        let text = "Sure! Here is the plan:\n{\"steps\": [{\"action\": \"none\"}]}\nGood luck {really}";
        assert_eq!(outermost_block(text), Some("{\"steps\": [{\"action\": \"none\"}]}"));
    }

    #[test]
    fn outermost_block_skips_braces_in_strings() {
        let text = r#"{"text": "a } b", "n": 1}"#;
        assert_eq!(outermost_block(text), Some(text));
    }

    #[test]
    fn outermost_block_on_truncated_reply_runs_to_end() {
        assert_eq!(outermost_block(r#"x {"steps": [{"a": 1"#), Some(r#"{"steps": [{"a": 1"#));
        assert_eq!(outermost_block("no braces"), None);
    }

    #[test]
    fn array_elements_drop_truncated_tail() {
        let text = r#"[{"a": 1}, {"b": {"c": 2}}, {"d": "#;
        let elems = array_elements(text, 0);
        assert_eq!(elems, vec![r#"{"a": 1}"#, r#"{"b": {"c": 2}}"#]);
    }

    #[test]
    fn flat_objects_skip_nested() {
        let found = flat_objects(r#"{"outer": {"inner": 1}} and {"x": 2}"#);
        assert_eq!(found, vec![r#"{"inner": 1}"#, r#"{"x": 2}"#]);
    }
}
