//! Tool-call extraction from free-form model output.
//!
//! The model does not use a native function-calling API. It writes
//! `{"tool": "<name>", "params": {...}}` objects (or an array of them) into
//! ordinary text, often wrapped across lines, surrounded by prose and
//! `<think>` blocks. This module recovers an ordered, de-duplicated list of
//! calls plus the prose that precedes the first one.
//!
//! Malformed fragments are skipped, never reported: zero calls simply means
//! a plain answer.

use codeloop_core::tool::{Params, ToolCall};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
static OBJECT_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{\s*"tool"\s*:"#).expect("valid regex"));
static ARRAY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[\s*\{\s*"tool"\s*:"#).expect("valid regex"));

const CLOSE_TAG: &str = "</think>";

/// Result of scanning one model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Calls in the order they appear, duplicates removed
    pub calls: Vec<ToolCall>,
    /// Text to show the user: everything before the first call, or the whole
    /// cleaned response when there are no calls
    pub prose: String,
}

impl Extraction {
    pub fn has_calls(&self) -> bool {
        !self.calls.is_empty()
    }
}

#[derive(Deserialize)]
struct WireCall {
    #[serde(default)]
    tool: String,
    #[serde(default)]
    params: Option<Params>,
}

impl WireCall {
    fn into_call(self) -> Option<ToolCall> {
        if self.tool.is_empty() {
            None
        } else {
            Some(ToolCall::new(self.tool, self.params.unwrap_or_default()))
        }
    }
}

/// Remove reasoning blocks and trim.
///
/// Well-formed `<think>...</think>` spans are dropped. A leftover `</think>`
/// whose opening tag never arrived drops everything up to and including it.
pub fn clean_response(response: &str) -> String {
    let cleaned = THINK_BLOCK.replace_all(response, "");
    let cleaned = match cleaned.find(CLOSE_TAG) {
        Some(idx) => &cleaned[idx + CLOSE_TAG.len()..],
        None => &cleaned[..],
    };
    cleaned.trim().to_string()
}

/// Extract tool calls and leading prose from a complete response.
pub fn extract_tool_calls(response: &str) -> Extraction {
    let cleaned = clean_response(response);
    let mut calls = Vec::new();
    let mut seen = HashSet::new();
    let mut first_offset: Option<usize> = None;

    for m in OBJECT_START.find_iter(&cleaned) {
        let start = m.start();
        let Some(end) = balanced_end(&cleaned, start, b'{', b'}') else {
            continue;
        };
        let Ok(wire) = serde_json::from_str::<WireCall>(&normalize_json(&cleaned[start..end])) else {
            continue;
        };
        let Some(call) = wire.into_call() else {
            continue;
        };
        if seen.insert(dedup_key(&call)) {
            calls.push(call);
            first_offset.get_or_insert(start);
        }
    }

    for m in ARRAY_START.find_iter(&cleaned) {
        let start = m.start();
        let Some(end) = balanced_end(&cleaned, start, b'[', b']') else {
            continue;
        };
        let Ok(items) = serde_json::from_str::<Vec<WireCall>>(&normalize_json(&cleaned[start..end]))
        else {
            continue;
        };
        let array_calls: Vec<ToolCall> = items.into_iter().filter_map(WireCall::into_call).collect();
        if array_calls.is_empty() {
            continue;
        }
        for call in array_calls {
            if seen.insert(dedup_key(&call)) {
                calls.push(call);
            }
        }
        first_offset = Some(first_offset.map_or(start, |o| o.min(start)));
    }

    let prose = match first_offset {
        _ if calls.is_empty() => cleaned,
        Some(0) | None => String::new(),
        Some(off) => cleaned[..off].trim().to_string(),
    };

    Extraction { calls, prose }
}

/// Byte offset of the first tool-call opening (`{"tool":` or `[{"tool":`).
pub(crate) fn call_start(text: &str) -> Option<usize> {
    let object = OBJECT_START.find(text).map(|m| m.start());
    let array = ARRAY_START.find(text).map(|m| m.start());
    match (object, array) {
        (Some(o), Some(a)) => Some(o.min(a)),
        (o, a) => o.or(a),
    }
}

/// Whether `tail` could still grow into a tool-call opening.
pub(crate) fn may_open_call(tail: &str) -> bool {
    const KEY: &str = "\"tool\"";
    let rest = match tail.strip_prefix('[') {
        Some(after) => after.trim_start(),
        None => tail,
    };
    let Some(rest) = rest.strip_prefix('{') else {
        return rest.is_empty();
    };
    let rest = rest.trim_start();
    if rest.len() <= KEY.len() {
        return KEY.starts_with(rest);
    }
    rest.starts_with(KEY) && rest[KEY.len()..].trim_start().is_empty()
}

/// Find the end (exclusive) of the bracketed value opening at `start`.
///
/// Quotes toggle string mode and a backslash inside a string escapes the
/// next byte, so quoted or escaped delimiters never change the depth.
fn balanced_end(text: &str, start: usize, open: u8, close: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Repair JSON mangled by the model's line wrapping.
///
/// Outside strings, newlines and tabs go away and runs of spaces collapse to
/// one (dropped entirely after `{`, `[`, `:` or `,`). Inside strings, literal
/// newlines and tabs become `\n` and `\t`. Carriage returns always go.
pub fn normalize_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in raw.chars().filter(|c| *c != '\r') {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => {
                out.push(c);
                escaped = true;
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' if in_string => out.push_str("\\n"),
            '\t' if in_string => out.push_str("\\t"),
            _ if in_string => out.push(c),
            '\n' | '\t' => {}
            ' ' => {
                if out
                    .chars()
                    .next_back()
                    .is_some_and(|last| !matches!(last, ' ' | '{' | '[' | ':' | ','))
                {
                    out.push(' ');
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Identity of a call for de-duplication: the tool name plus its params
/// serialized with object keys sorted at every level.
fn dedup_key(call: &ToolCall) -> String {
    let mut key = call.tool.clone();
    key.push(':');
    write_canonical(&mut key, &Value::Object(call.params.clone()));
    key
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(out, v);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, v);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
