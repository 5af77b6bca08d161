//! Per-session summaries for listing and inspection.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::compress::CompressionEngine;
use crate::compress::extract::Extractor;
use crate::config::CompressConfig;
use crate::transcript::{ContentBlock, Record, RecordKind, Speaker, TranscriptError, load_transcript};

use super::discovery::SessionFile;

/// Summaries shown per session.
pub const MAX_SUMMARIES: usize = 3;
/// Highlights taken from each end of a session.
pub const HIGHLIGHTS_PER_END: usize = 5;
/// Lines joined into one highlight.
const HIGHLIGHT_LINES: usize = 3;
const HIGHLIGHT_CHARS: usize = 300;
const MIN_HIGHLIGHT_LINE_CHARS: usize = 10;
/// Characters shown per preview line.
pub const PREVIEW_CHARS: usize = 200;

/// Boilerplate that never makes a useful highlight.
const NOISE: &[&str] = &[
    "This session is being continued",
    "[Request interrupted",
    "No response requested",
    "Caveat: The messages below were generated",
];

/// What to do with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Nothing worth resuming.
    Empty,
    /// Small enough to resume as is.
    Resume,
    /// Large enough that compressing first is advised.
    Compress,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::Empty => write!(f, "empty session"),
            Recommendation::Resume => write!(f, "resume directly"),
            Recommendation::Compress => write!(f, "compress before resuming"),
        }
    }
}

/// Everything shown about one session in a listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub project: String,
    #[serde(skip)]
    pub file: Option<SessionFile>,
    pub record_count: usize,
    /// Context the session takes up when resumed, signatures included.
    pub tokens: usize,
    pub summaries: Vec<String>,
    pub git_branch: Option<String>,
    pub duration: Option<String>,
    /// Opening highlights, then closing ones.
    pub highlights: Vec<String>,
    /// Set when the session could not be loaded.
    pub error: Option<String>,
}

impl SessionInfo {
    /// Stand-in for a session whose load failed.
    pub fn placeholder(file: &SessionFile, error: impl Into<String>) -> Self {
        Self {
            id: file.id.clone(),
            project: file.project.clone(),
            file: Some(file.clone()),
            record_count: 0,
            tokens: 0,
            summaries: Vec::new(),
            git_branch: None,
            duration: None,
            highlights: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// True for placeholders that still need a full load.
    pub fn needs_full_load(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens == 0 || self.record_count <= 2
    }

    pub fn recommendation(&self, config: &CompressConfig) -> Recommendation {
        if self.is_empty() {
            Recommendation::Empty
        } else if config.needs_compression(self.tokens) {
            Recommendation::Compress
        } else {
            Recommendation::Resume
        }
    }

    /// Whether the session no longer fits the model context.
    pub fn exceeds_context(&self, config: &CompressConfig) -> bool {
        self.tokens > config.context_limit
    }
}

/// Load `file` and summarize it.
pub fn inspect_session(
    file: &SessionFile,
    engine: &CompressionEngine,
) -> Result<SessionInfo, TranscriptError> {
    let records = load_transcript(&file.path)?;
    Ok(describe_records(file, &records, engine))
}

/// Summarize already-parsed records.
pub fn describe_records(
    file: &SessionFile,
    records: &[Record],
    engine: &CompressionEngine,
) -> SessionInfo {
    let mut summaries: Vec<String> = Vec::new();
    for summary in records.iter().filter_map(|r| r.meta.summary.as_deref()) {
        if summaries.len() == MAX_SUMMARIES {
            break;
        }
        if !summary.is_empty() && !summaries.iter().any(|s| s == summary) {
            summaries.push(summary.to_string());
        }
    }

    SessionInfo {
        id: file.id.clone(),
        project: file.project.clone(),
        file: Some(file.clone()),
        record_count: records.len(),
        tokens: engine.footprint(records),
        summaries,
        git_branch: records.iter().find_map(|r| r.meta.git_branch.clone()),
        duration: session_duration(records).map(format_duration),
        highlights: highlights(records, HIGHLIGHTS_PER_END),
        error: None,
    }
}

// ── Duration ───────────────────────────────────────────────────────

fn parse_timestamp(record: &Record) -> Option<DateTime<FixedOffset>> {
    record
        .meta
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
}

/// Time between the first and last timestamped records.
pub fn session_duration(records: &[Record]) -> Option<chrono::Duration> {
    let first = records.iter().find_map(parse_timestamp)?;
    let last = records.iter().rev().find_map(parse_timestamp)?;
    Some(last - first)
}

/// Coarse human-readable duration.
pub fn format_duration(duration: chrono::Duration) -> String {
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    if duration.num_days() > 0 {
        plural(duration.num_days(), "day")
    } else if duration.num_hours() > 0 {
        plural(duration.num_hours(), "hour")
    } else if duration.num_minutes() > 0 {
        plural(duration.num_minutes(), "minute")
    } else {
        "under a minute".to_string()
    }
}

// ── Highlights ─────────────────────────────────────────────────────

/// Plain text of a record's text blocks only; reasoning and tool activity
/// never make highlights.
fn conversational_text(record: &Record) -> Option<(Speaker, String)> {
    let speaker = match record.kind {
        RecordKind::User => Speaker::User,
        RecordKind::Assistant => Speaker::Assistant,
        _ => return None,
    };
    let text: Vec<&str> = record
        .blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let text = text.join("\n");
    if text.trim().is_empty() || NOISE.iter().any(|n| text.contains(n)) {
        return None;
    }
    Some((speaker, text))
}

fn condense(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim().trim_matches('*').trim())
        .filter(|l| l.chars().count() > MIN_HIGHLIGHT_LINE_CHARS)
        .filter(|l| !l.starts_with('#') && !l.starts_with('_') && !l.starts_with('<'))
        .take(HIGHLIGHT_LINES)
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(truncate_chars(&lines.join(" "), HIGHLIGHT_CHARS))
}

fn collect_highlights<'r>(records: impl Iterator<Item = &'r Record>, count: usize) -> Vec<String> {
    let mut users = Vec::new();
    let mut assistants = Vec::new();
    for record in records {
        if users.len() >= count && assistants.len() >= count {
            break;
        }
        let Some((speaker, text)) = conversational_text(record) else {
            continue;
        };
        let Some(line) = condense(&text) else {
            continue;
        };
        match speaker {
            Speaker::User => users.push(format!("User: {line}")),
            Speaker::Assistant => assistants.push(format!("Assistant: {line}")),
        }
    }

    // Alternate speakers, starting with the user.
    let mut out = Vec::with_capacity(count);
    let mut users = users.into_iter();
    let mut assistants = assistants.into_iter();
    while out.len() < count {
        let before = out.len();
        out.extend(users.next());
        if out.len() < count {
            out.extend(assistants.next());
        }
        if out.len() == before {
            break;
        }
    }
    out
}

/// Up to `per_end` highlights from the opening of the session followed by up
/// to `per_end` from its close, oldest first within each group.
pub fn highlights(records: &[Record], per_end: usize) -> Vec<String> {
    let mut opening = collect_highlights(records.iter(), per_end);
    if records.len() <= per_end * 2 {
        return opening;
    }
    let mut closing = collect_highlights(records.iter().rev(), per_end);
    closing.reverse();
    closing.retain(|h| !opening.contains(h));
    opening.extend(closing);
    opening
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max).collect();
    format!("{head}...")
}

// ── Preview ────────────────────────────────────────────────────────

/// One rendered record in a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewLine {
    /// 1-based position in the transcript.
    pub position: usize,
    pub speaker: Speaker,
    pub text: String,
}

/// The first and last records of a transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub head: Vec<PreviewLine>,
    pub tail: Vec<PreviewLine>,
    /// Records between head and tail not shown.
    pub skipped: usize,
}

/// Build a preview with up to `count` records from each end. Records with no
/// text are not shown; the two ends never overlap.
pub fn preview(records: &[Record], count: usize, extractor: Extractor) -> Preview {
    let line = |(i, record): (usize, &Record)| {
        let text = extractor.extract(record);
        if text.is_empty() {
            return None;
        }
        Some(PreviewLine {
            position: i + 1,
            speaker: record.kind.speaker(),
            text: truncate_chars(&text, PREVIEW_CHARS),
        })
    };

    let head_end = records.len().min(count);
    let tail_start = records.len().saturating_sub(count).max(head_end);

    Preview {
        head: records.iter().enumerate().take(head_end).filter_map(line).collect(),
        tail: records.iter().enumerate().skip(tail_start).filter_map(line).collect(),
        skipped: tail_start - head_end,
    }
}
