//! Ordered text repairs for almost-JSON oracle replies.
//!
//! Each repair is a pure `&str -> String` transform aimed at one malformation
//! and is safe to run on text that is already valid JSON. [`sanitize`] runs
//! them left to right and only when the input does not already parse.

use regex::Captures;

use crate::decoder::extract::{map_unquoted, split_strings};

pub type Repair = fn(&str) -> String;

/// Repairs in application order.
pub const REPAIRS: &[(&str, Repair)] = &[
    ("strip_code_fences", strip_code_fences),
    ("normalize_quotes", normalize_quotes),
    ("coerce_numeric_strings", coerce_numeric_strings),
    ("remove_trailing_commas", remove_trailing_commas),
    ("insert_missing_commas", insert_missing_commas),
    ("normalize_coordinates", normalize_coordinates),
    ("quote_bare_values", quote_bare_values),
];

pub fn parses(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text).is_ok()
}

/// Runs every repair in order. Returns the input unchanged when it already
/// parses; the caller re-validates the result.
pub fn sanitize(block: &str) -> String {
    if parses(block) {
        return block.to_string();
    }
    repair_all(block)
}

/// Runs every repair in order without the parse gate. Used when the text
/// parses as JSON but not into the expected shape (e.g. `"x": "120"`).
pub fn repair_all(block: &str) -> String {
    REPAIRS.iter().fold(block.to_string(), |text, (name, repair)| {
        let next = repair(&text);
        if next != text {
            tracing::trace!(repair = *name, "sanitizer rewrote reply");
        }
        next
    })
}

/// Markdown fences: ```` ```json ```` and bare ```` ``` ````.
pub fn strip_code_fences(text: &str) -> String {
    map_unquoted(text, |seg| {
        regex!(r"```(?:json|JSON|javascript|js)?")
            .replace_all(seg, "")
            .into_owned()
    })
}

/// Single-quoted literals (`{'action': 'click'}`) become JSON strings, then
/// bare property names (`{action: ...}`) are quoted outside any literal.
pub fn normalize_quotes(text: &str) -> String {
    let literals = map_unquoted(text, single_quoted_to_json);
    map_unquoted(&literals, |seg| {
        regex!(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:")
            .replace_all(seg, r#"${1}"${2}":"#)
            .into_owned()
    })
}

/// A `'` opens a literal only after `{ [ , :` (or at the start of the run)
/// and closes at the first `'` followed by `, : } ]` or the end. Apostrophes
/// anywhere else are left alone.
fn single_quoted_to_json(seg: &str) -> String {
    let mut out = String::with_capacity(seg.len() + 8);
    let mut rest = seg;
    while let Some(open) = rest.find('\'') {
        out.push_str(&rest[..open]);
        let body = &rest[open + 1..];
        let opens = out
            .trim_end()
            .chars()
            .last()
            .map_or(true, |c| matches!(c, '{' | '[' | ',' | ':'));
        match opens.then(|| literal_end(body)).flatten() {
            Some(end) => {
                out.push_str(&json_string(&body[..end]));
                rest = &body[end + 1..];
            }
            None => {
                out.push('\'');
                rest = body;
            }
        }
    }
    out.push_str(rest);
    out
}

fn literal_end(body: &str) -> Option<usize> {
    body.match_indices('\'').map(|(i, _)| i).find(|&i| {
        body[i + 1..]
            .trim_start()
            .chars()
            .next()
            .map_or(true, |c| matches!(c, ',' | ':' | '}' | ']'))
    })
}

/// Quoted numbers in numeric fields: `"x": " 123"` becomes `"x": 123`.
pub fn coerce_numeric_strings(text: &str) -> String {
    regex!(r#""(x|y|scrollAmount)"\s*:\s*"\s*(-?\d+(?:\.\d+)?)\s*""#)
        .replace_all(text, r#""${1}": ${2}"#)
        .into_owned()
}

/// `,}` and `,]`.
pub fn remove_trailing_commas(text: &str) -> String {
    map_unquoted(text, |seg| {
        regex!(r",\s*([\]}])").replace_all(seg, "${1}").into_owned()
    })
}

/// Adjacent literals with no separator: `} {`, `] [`, `"a" "b"`, `"a" {`,
/// and `1 "y"`.
pub fn insert_missing_commas(text: &str) -> String {
    let joined = map_unquoted(text, |seg| {
        let objects = regex!(r"\}(\s*)\{").replace_all(seg, "},${1}{");
        regex!(r"\](\s*)\[").replace_all(&objects, "],${1}[").into_owned()
    });

    let segments = split_strings(&joined);
    let mut out = String::with_capacity(joined.len() + 8);
    for (i, seg) in segments.iter().enumerate() {
        let prev_quoted = i > 0 && segments[i - 1].quoted;
        let next_quoted = segments.get(i + 1).is_some_and(|s| s.quoted);

        if seg.quoted {
            if prev_quoted {
                out.push(',');
            }
            out.push_str(seg.text);
            continue;
        }

        let trimmed = seg.text.trim_start();
        let whitespace_only = trimmed.is_empty();
        if prev_quoted && (trimmed.starts_with('{') || (whitespace_only && next_quoted)) {
            out.push(',');
        }
        out.push_str(seg.text);
        if next_quoted && !whitespace_only {
            let ends_with_value = seg
                .text
                .trim_end()
                .chars()
                .last()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '}' || c == ']');
            if ends_with_value {
                out.push(',');
            }
        }
    }
    out
}

/// Inside a `"coordinates": {...}` object: collapse whitespace, drop a
/// trailing comma, fill empty values with null, and separate properties that
/// lack a comma.
pub fn normalize_coordinates(text: &str) -> String {
    regex!(r#""coordinates"\s*:\s*\{([^}]*)\}"#)
        .replace_all(text, |caps: &Captures| {
            let inner = regex!(r"\s+").replace_all(&caps[1], " ");
            let inner = regex!(r",\s*$").replace_all(inner.trim(), "");
            let inner = regex!(r":\s*,").replace_all(&inner, ": null,");
            let inner = regex!(r":\s*$").replace_all(&inner, ": null");
            let inner = regex!(r#"([^,{\s])\s*"(\w+)"\s*:"#).replace_all(&inner, r#"${1}, "${2}":"#);
            format!(r#""coordinates": {{{inner}}}"#)
        })
        .into_owned()
}

/// Bare-word values (`"action": click,`) become strings. JSON literals and
/// numbers are left as they are.
pub fn quote_bare_values(text: &str) -> String {
    map_unquoted(text, |seg| {
        regex!(r"(:\s*)([^\s\x22,{\[\]}][^\x22,{\[\]}]*?)(\s*[,}\]])")
            .replace_all(seg, |caps: &Captures| {
                let value = caps[2].trim();
                if is_json_scalar(value) {
                    caps[0].to_string()
                } else {
                    format!("{}{}{}", &caps[1], json_string(value), &caps[3])
                }
            })
            .into_owned()
    })
}

fn is_json_scalar(value: &str) -> bool {
    matches!(value, "true" | "false" | "null")
        || regex!(r"^-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?$").is_match(value)
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
