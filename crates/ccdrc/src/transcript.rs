//! Transcript records: the canonical shape every JSONL line is normalized into.
//!
//! A transcript log holds one JSON object per line, and the objects come in
//! several layouts: a nested `message` carrying a `role` and a `content` array
//! of typed blocks, a bare `content` string, top-level `text` / `thinking`
//! fields, or `summary` entries written when a session is continued.
//! [`parse_line`] maps every supported layout into one [`Record`], so the rest
//! of the crate only ever matches on [`RecordKind`] and [`ContentBlock`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

/// Nesting depth followed while normalizing one raw record. Deeper content
/// is ignored and the record keeps whatever was collected above it.
pub const MAX_NORMALIZE_DEPTH: usize = 10;

/// Errors raised while reading transcripts from disk.
#[derive(Error, Debug)]
pub enum TranscriptError {
    /// Reading a transcript file failed.
    #[error("failed to read transcript '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Scanning a sessions directory failed.
    #[error("failed to scan '{}': {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// No session matched the given id or path.
    #[error("no session matches '{0}'")]
    SessionNotFound(String),
    /// More than one session id starts with the given prefix.
    #[error("'{query}' matches {count} sessions; use a longer id")]
    AmbiguousSession { query: String, count: usize },
}

// ── Record model ───────────────────────────────────────────────────

/// What a record is, decided once at parse time.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    User,
    Assistant,
    /// An assistant turn made only of tool invocations.
    ToolInvocation,
    /// A user turn made only of tool results.
    ToolResult,
    /// A session summary written when a conversation is continued.
    Summary,
    Other,
}

impl RecordKind {
    /// Who a rendered record is attributed to.
    pub fn speaker(self) -> Speaker {
        match self {
            RecordKind::Assistant | RecordKind::ToolInvocation => Speaker::Assistant,
            _ => Speaker::User,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::User => write!(f, "user"),
            RecordKind::Assistant => write!(f, "assistant"),
            RecordKind::ToolInvocation => write!(f, "tool_invocation"),
            RecordKind::ToolResult => write!(f, "tool_result"),
            RecordKind::Summary => write!(f, "summary"),
            RecordKind::Other => write!(f, "other"),
        }
    }
}

/// Role label used when rendering a record.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "User"),
            Speaker::Assistant => write!(f, "Assistant"),
        }
    }
}

/// Payload of a tool result block.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ToolPayload {
    Text(String),
    /// A list payload; only its length is kept.
    Items(usize),
}

/// One typed fragment of a record's content.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Reasoning {
        text: String,
        /// Opaque integrity token sent alongside the reasoning. It occupies
        /// context when a session is resumed but is never rendered.
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolInvocation { name: String, input: Map<String, Value> },
    ToolResult { payload: ToolPayload },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        ContentBlock::Reasoning {
            text: text.into(),
            signature: None,
        }
    }

    pub fn signed_reasoning(text: impl Into<String>, signature: impl Into<String>) -> Self {
        ContentBlock::Reasoning {
            text: text.into(),
            signature: Some(signature.into()),
        }
    }

    pub fn tool_invocation(name: impl Into<String>, input: Map<String, Value>) -> Self {
        ContentBlock::ToolInvocation {
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(payload: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            payload: ToolPayload::Text(payload.into()),
        }
    }
}

/// Metadata carried along but never counted toward the context.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct RecordMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    /// Text of a [`RecordKind::Summary`] entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One parsed transcript entry.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub blocks: Vec<ContentBlock>,
    pub meta: RecordMeta,
}

impl Record {
    pub fn new(kind: RecordKind, blocks: Vec<ContentBlock>) -> Self {
        Self {
            kind,
            blocks,
            meta: RecordMeta::default(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(RecordKind::User, vec![ContentBlock::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(RecordKind::Assistant, vec![ContentBlock::text(text)])
    }

    pub fn with_meta(mut self, meta: RecordMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Reasoning signatures carried by this record.
    pub fn signatures(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Reasoning {
                signature: Some(signature),
                ..
            } => Some(signature.as_str()),
            _ => None,
        })
    }

    /// A copy of this record whose content is replaced by a single text block.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            blocks: vec![ContentBlock::text(text)],
            meta: self.meta.clone(),
        }
    }
}

// ── Parsing ────────────────────────────────────────────────────────

/// Parse one transcript line. Blank lines, invalid JSON, and JSON values that
/// are not objects yield `None`.
pub fn parse_line(line: &str) -> Option<Record> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(obj)) => Some(normalize(&obj)),
        Ok(_) => {
            trace!("Skipping non-object transcript line");
            None
        }
        Err(e) => {
            trace!("Skipping unparseable transcript line: {e}");
            None
        }
    }
}

/// Parse a whole newline-delimited transcript, dropping unparseable lines.
pub fn parse_transcript(text: &str) -> Vec<Record> {
    let mut lines = 0;
    let records: Vec<Record> = text
        .lines()
        .inspect(|_| lines += 1)
        .filter_map(parse_line)
        .collect();
    debug!(
        "Parsed transcript: {} records from {} lines",
        records.len(),
        lines
    );
    records
}

/// Read and parse a transcript file. Invalid UTF-8 is replaced rather than
/// rejected so one damaged line cannot hide the rest of the file.
pub fn load_transcript(path: &Path) -> Result<Vec<Record>, TranscriptError> {
    let bytes = std::fs::read(path).map_err(|source| TranscriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_transcript(&String::from_utf8_lossy(&bytes)))
}

/// Map one raw JSON object onto the canonical [`Record`].
pub fn normalize(obj: &Map<String, Value>) -> Record {
    let entry_type = obj.get("type").and_then(Value::as_str);
    let role = obj
        .get("message")
        .and_then(Value::as_object)
        .and_then(|m| m.get("role"))
        .and_then(Value::as_str);

    let mut blocks = Vec::new();
    collect_blocks(obj, 0, &mut blocks);

    let kind = classify(entry_type, role, &blocks);
    let meta = RecordMeta {
        timestamp: string_field(obj, "timestamp"),
        git_branch: string_field(obj, "gitBranch").filter(|b| !b.is_empty()),
        summary: if kind == RecordKind::Summary {
            string_field(obj, "summary")
        } else {
            None
        },
    };

    Record { kind, blocks, meta }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn collect_blocks(obj: &Map<String, Value>, depth: usize, out: &mut Vec<ContentBlock>) {
    if depth > MAX_NORMALIZE_DEPTH {
        debug!("Record nesting exceeds depth {MAX_NORMALIZE_DEPTH}; ignoring deeper content");
        return;
    }

    if let Some(Value::Object(inner)) = obj.get("message") {
        collect_blocks(inner, depth + 1, out);
        return;
    }

    match obj.get("content") {
        Some(Value::Array(items)) => out.extend(items.iter().filter_map(parse_block)),
        Some(Value::String(text)) if !text.is_empty() => out.push(ContentBlock::text(text)),
        Some(Value::Object(inner)) => collect_blocks(inner, depth + 1, out),
        Some(_) => {}
        None => {
            if let Some(text) = obj.get("text").and_then(Value::as_str) {
                out.push(ContentBlock::text(text));
            } else if let Some(thinking) = obj.get("thinking").and_then(Value::as_str) {
                out.push(ContentBlock::Reasoning {
                    text: thinking.to_string(),
                    signature: string_field(obj, "signature").filter(|s| !s.is_empty()),
                });
            }
        }
    }
}

fn parse_block(item: &Value) -> Option<ContentBlock> {
    let block = match item {
        Value::String(text) => return Some(ContentBlock::text(text)),
        Value::Object(block) => block,
        _ => return None,
    };

    let str_of = |key: &str| block.get(key).and_then(Value::as_str).unwrap_or_default();

    match block.get("type").and_then(Value::as_str) {
        Some("text") => Some(ContentBlock::text(str_of("text"))),
        Some("thinking") => Some(ContentBlock::Reasoning {
            text: str_of("thinking").to_string(),
            signature: string_field(block, "signature").filter(|s| !s.is_empty()),
        }),
        Some("tool_use") => {
            let name = block
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let input = block
                .get("input")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            Some(ContentBlock::tool_invocation(name, input))
        }
        Some("tool_result") => {
            let payload = match block.get("content") {
                Some(Value::Array(items)) => ToolPayload::Items(items.len()),
                Some(Value::String(text)) => ToolPayload::Text(text.clone()),
                None | Some(Value::Null) => ToolPayload::Text(String::new()),
                Some(other) => ToolPayload::Text(other.to_string()),
            };
            Some(ContentBlock::ToolResult { payload })
        }
        _ => None,
    }
}

fn classify(entry_type: Option<&str>, role: Option<&str>, blocks: &[ContentBlock]) -> RecordKind {
    match entry_type {
        Some("summary") => return RecordKind::Summary,
        Some("tool_use") => return RecordKind::ToolInvocation,
        Some("tool_result") => return RecordKind::ToolResult,
        _ => {}
    }

    // The entry type wins over the nested role when both name a speaker.
    let speaker = entry_type
        .filter(|t| matches!(*t, "user" | "human" | "assistant"))
        .or(role);

    let kind = match speaker {
        Some("assistant") => RecordKind::Assistant,
        Some("user" | "human") => RecordKind::User,
        _ => return RecordKind::Other,
    };

    if blocks.is_empty() {
        return kind;
    }
    if blocks
        .iter()
        .all(|b| matches!(b, ContentBlock::ToolInvocation { .. }))
    {
        RecordKind::ToolInvocation
    } else if blocks
        .iter()
        .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
    {
        RecordKind::ToolResult
    } else {
        kind
    }
}
