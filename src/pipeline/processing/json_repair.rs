//! Best-effort repair of client-supplied JSON.
//!
//! Trackers frequently send truncated or hand-built JSON in context and event
//! payloads. [`repair_json`] accepts valid input unchanged, otherwise rewrites
//! the text to close unterminated strings and containers, escape stray quotes
//! inside strings, drop dangling commas and fill dangling keys with `null`.

use serde_json::{Map, Value};

/// Parses `input` as JSON, repairing it if needed.
///
/// Returns the parsed value and `true` on success. When the text cannot be
/// salvaged the result is an empty object and `false`.
pub fn repair_json(input: &str) -> (Value, bool) {
    if let Ok(value) = serde_json::from_str::<Value>(input) {
        return (value, true);
    }

    let repaired = rewrite(input);
    match first_value(&repaired) {
        Some(value) => (value, true),
        None => (Value::Object(Map::new()), false),
    }
}

/// Like [`repair_json`] but only accepts objects; anything else degrades to
/// an empty object.
pub fn repair_object(input: &str) -> (Value, bool) {
    match repair_json(input) {
        (value @ Value::Object(_), true) => (value, true),
        _ => (Value::Object(Map::new()), false),
    }
}

/// Takes the first complete value, ignoring trailing garbage.
fn first_value(text: &str) -> Option<Value> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Some(value),
        _ => None,
    }
}

fn rewrite(input: &str) -> String {
    let chars: Vec<char> = input.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut string_is_key = false;
    // Whether the last string closed at top of an object frame was a key
    // still waiting for its value.
    let mut dangling_key = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    escaped = true;
                }
                '"' => {
                    if closes_string(&chars[i + 1..]) {
                        out.push('"');
                        in_string = false;
                        dangling_key = string_is_key;
                    } else {
                        out.push_str("\\\"");
                    }
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                string_is_key = stack.last() == Some(&'{')
                    && matches!(last_significant(&out), Some('{') | Some(','));
                in_string = true;
                dangling_key = false;
                out.push(c);
            }
            '{' | '[' => {
                stack.push(c);
                dangling_key = false;
                out.push(c);
            }
            '}' | ']' => {
                let open = if c == '}' { '{' } else { '[' };
                if stack.last() == Some(&open) {
                    close_frame(&mut out, open, dangling_key);
                    stack.pop();
                    dangling_key = false;
                }
                // Unbalanced closers are dropped.
            }
            ':' => {
                dangling_key = false;
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    if escaped {
        out.pop();
    }
    if in_string {
        out.push('"');
        dangling_key = string_is_key;
    }
    while let Some(open) = stack.pop() {
        close_frame(&mut out, open, dangling_key);
        dangling_key = false;
    }
    out
}

/// A quote inside a string is treated as the closing quote only when what
/// follows looks like structure; otherwise it is an unescaped literal quote.
fn closes_string(rest: &[char]) -> bool {
    match rest.iter().find(|c| !c.is_whitespace()) {
        None => true,
        Some(next) => matches!(next, ',' | '}' | ']' | ':'),
    }
}

fn last_significant(out: &str) -> Option<char> {
    out.chars().rev().find(|c| !c.is_whitespace())
}

fn close_frame(out: &mut String, open: char, dangling_key: bool) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    }
    if out.ends_with(':') {
        out.push_str("null");
    } else if open == '{' && dangling_key {
        out.push_str(":null");
    }
    out.push(if open == '{' { '}' } else { ']' });
}
