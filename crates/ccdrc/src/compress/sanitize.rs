//! Tool-call sanitization.
//!
//! Raw tool inputs are JSON objects. Echoing them back into a prompt teaches
//! the model to imitate them instead of calling tools, so tool activity is
//! only ever rendered as short bracketed descriptions:
//!
//! - [`describe_invocation`] turns a tool name and input map into one phrase.
//! - [`describe_result`] classifies a tool result into a placeholder.
//! - [`strip_embedded_tool_json`] rewrites `[Tool: Name] {...}` fragments
//!   left inside free text by older transcript exports.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::transcript::{ContentBlock, Record, ToolPayload};

/// Marker that introduces an embedded tool call in free text.
pub const TOOL_MARKER: &str = "[Tool:";

const COMMAND_PREVIEW_CHARS: usize = 50;
const UNKNOWN: &str = "unknown";

static EMBEDDED_TOOL_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Tool:\s*(\w+)\]\s*(\{[^}]*\})").expect("embedded tool call pattern is valid")
});

static SINGLE_PAIR_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\{\s*"[^"]+"\s*:\s*"[^"]+"\s*\}$"#).expect("single pair pattern is valid")
});

// ── Invocations ────────────────────────────────────────────────────

/// Describe a tool invocation in one phrase. Missing fields read `unknown`;
/// the input map itself is never reproduced.
pub fn describe_invocation(name: &str, input: &Map<String, Value>) -> String {
    let field = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or(UNKNOWN);
    let field_or = |key: &str, default: &'static str| {
        input.get(key).and_then(Value::as_str).unwrap_or(default)
    };
    let len_of = |key: &str| input.get(key).and_then(Value::as_array).map_or(0, Vec::len);

    match name {
        "Write" => format!("[Created file: {}]", field("file_path")),
        "Edit" => format!("[Edited file: {}]", field("file_path")),
        "MultiEdit" => format!(
            "[Made {} edits to: {}]",
            len_of("edits"),
            field("file_path")
        ),
        "Read" => describe_read(field("file_path"), input),
        "Bash" => format!("[Executed: {}]", preview_command(field("command"))),
        "Grep" => format!(
            "[Searched for '{}' in {}]",
            field("pattern"),
            field_or("path", ".")
        ),
        "Glob" => format!("[Found files matching: {}]", field("pattern")),
        "LS" => format!("[Listed directory: {}]", field_or("path", ".")),
        "WebSearch" => format!("[Web search: {}]", field("query")),
        "WebFetch" => format!("[Fetched URL: {}]", field("url")),
        "TodoWrite" => format!("[Updated todo list: {} items]", len_of("todos")),
        "Task" => format!("[Launched agent: {}]", field_or("description", "unknown task")),
        "NotebookEdit" => format!("[Edited notebook: {}]", field("notebook_path")),
        "ExitPlanMode" => "[Exited plan mode]".to_string(),
        "BashOutput" => format!("[Checked bash output: {}]", field("bash_id")),
        "KillBash" => format!("[Killed bash process: {}]", field("shell_id")),
        _ => format!("[Used tool: {name}]"),
    }
}

fn describe_read(path: &str, input: &Map<String, Value>) -> String {
    let positive = |key: &str| input.get(key).and_then(Value::as_u64).filter(|v| *v > 0);
    match (positive("offset"), positive("limit")) {
        (None, None) => format!("[Read file: {path}]"),
        (Some(offset), Some(limit)) => format!(
            "[Read file: {path} (lines {offset}-{})]",
            offset.saturating_add(limit)
        ),
        _ => format!("[Read file: {path} (partial)]"),
    }
}

fn preview_command(command: &str) -> Cow<'_, str> {
    if command.chars().count() <= COMMAND_PREVIEW_CHARS {
        return Cow::Borrowed(command);
    }
    let head: String = command.chars().take(COMMAND_PREVIEW_CHARS - 3).collect();
    Cow::Owned(format!("{head}..."))
}

// ── Results ────────────────────────────────────────────────────────

/// Classify a tool result. Empty output reads as completion, output
/// mentioning an error or a success collapses to a fixed placeholder, long
/// output is reduced to its length, and short output passes through trimmed.
pub fn describe_result(payload: &str, max_len: usize) -> String {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return "[Tool completed]".to_string();
    }

    let lower = trimmed.to_lowercase();
    if lower.contains("error") {
        return "[Tool error occurred]".to_string();
    }
    if lower.contains("success") {
        return "[Tool succeeded]".to_string();
    }

    let chars = trimmed.chars().count();
    if chars > max_len {
        format!("[Tool output: {chars} chars]")
    } else {
        trimmed.to_string()
    }
}

/// Placeholder for a list-shaped tool result.
pub fn describe_items(count: usize) -> String {
    format!("[Tool results: {count} items]")
}

// ── Embedded tool JSON ─────────────────────────────────────────────

/// A rewrite that applies to one tool when its body names every key.
struct Rewrite {
    tool: &'static str,
    keys: &'static [&'static str],
    replacement: &'static str,
}

const REWRITES: &[Rewrite] = &[
    Rewrite {
        tool: "Write",
        keys: &["file_path", "content"],
        replacement: "[Created file]",
    },
    Rewrite {
        tool: "Edit",
        keys: &["file_path", "old_string"],
        replacement: "[Edited file]",
    },
    Rewrite {
        tool: "Bash",
        keys: &["command"],
        replacement: "[Executed command]",
    },
    Rewrite {
        tool: "Grep",
        keys: &["pattern"],
        replacement: "[Searched]",
    },
];

fn has_key(body: &str, key: &str) -> bool {
    body.contains(&format!("\"{key}\""))
}

fn rewrite_embedded(caps: &Captures<'_>) -> String {
    let tool = &caps[1];
    let body = &caps[2];

    if let Some(rule) = REWRITES.iter().find(|r| r.tool == tool)
        && rule.keys.iter().all(|key| has_key(body, key))
    {
        return rule.replacement.to_string();
    }
    if has_key(body, "input") || SINGLE_PAIR_BODY.is_match(body) {
        return format!("[Used tool: {tool}]");
    }
    caps[0].to_string()
}

/// Replace `[Tool: Name] {...}` fragments in `text` with short descriptions.
///
/// Each fragment is rewritten at most once and fragments no rule recognizes
/// are left as they are, so applying this twice gives the same result as
/// applying it once. Text without a tool marker is returned unchanged.
pub fn strip_embedded_tool_json(text: &str) -> Cow<'_, str> {
    if !text.contains(TOOL_MARKER) {
        return Cow::Borrowed(text);
    }
    EMBEDDED_TOOL_CALL.replace_all(text, |caps: &Captures<'_>| rewrite_embedded(caps))
}

// ── Records ────────────────────────────────────────────────────────

/// A copy of `record` with embedded tool JSON stripped from every free-text
/// field. The input is not modified.
pub fn clean_record(record: &Record) -> Record {
    let strip = |text: &str| strip_embedded_tool_json(text).into_owned();

    let blocks = record
        .blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => ContentBlock::Text { text: strip(text) },
            ContentBlock::Reasoning { text, signature } => ContentBlock::Reasoning {
                text: strip(text),
                signature: signature.clone(),
            },
            ContentBlock::ToolResult {
                payload: ToolPayload::Text(text),
            } => ContentBlock::ToolResult {
                payload: ToolPayload::Text(strip(text)),
            },
            other => other.clone(),
        })
        .collect();

    let mut meta = record.meta.clone();
    meta.summary = meta.summary.as_deref().map(strip);

    Record {
        kind: record.kind,
        blocks,
        meta,
    }
}

/// [`clean_record`] applied to every record, order preserved.
pub fn clean_records(records: &[Record]) -> Vec<Record> {
    records.iter().map(clean_record).collect()
}
