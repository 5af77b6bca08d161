//! Flattening a record into the plain text that is counted and rendered.

use crate::config::DEFAULT_RESULT_MAX_LEN;
use crate::transcript::{ContentBlock, Record, ToolPayload};

use super::sanitize::{describe_invocation, describe_items, describe_result};

/// Prefix applied to reasoning blocks.
pub const THINKING_MARKER: &str = "[Thinking]";

/// Turns records into text. Pure: the same record always yields the same
/// string and nothing is mutated.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    result_max_len: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            result_max_len: DEFAULT_RESULT_MAX_LEN,
        }
    }
}

impl Extractor {
    pub fn new(result_max_len: usize) -> Self {
        Self { result_max_len }
    }

    /// Newline-joined text of every block. Reasoning is prefixed with
    /// [`THINKING_MARKER`], tool invocations and results become short
    /// descriptions, and empty fragments are skipped. Records without
    /// usable content yield an empty string.
    pub fn extract(&self, record: &Record) -> String {
        let parts: Vec<String> = record
            .blocks
            .iter()
            .filter_map(|block| self.block_text(block))
            .collect();
        parts.join("\n")
    }

    fn block_text(&self, block: &ContentBlock) -> Option<String> {
        match block {
            ContentBlock::Text { text } if !text.is_empty() => Some(text.clone()),
            ContentBlock::Reasoning { text, .. } if !text.is_empty() => {
                Some(format!("{THINKING_MARKER} {text}"))
            }
            ContentBlock::ToolInvocation { name, input } => Some(describe_invocation(name, input)),
            ContentBlock::ToolResult {
                payload: ToolPayload::Items(count),
            } => Some(describe_items(*count)),
            ContentBlock::ToolResult {
                payload: ToolPayload::Text(text),
            } if !text.is_empty() => Some(describe_result(text, self.result_max_len)),
            _ => None,
        }
    }
}

/// [`Extractor::extract`] with the default result length.
pub fn extract(record: &Record) -> String {
    Extractor::default().extract(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::RecordKind;
    use serde_json::{Map, json};

    #[test]
    fn joins_blocks_with_newlines() {
        let record = Record::new(
            RecordKind::Assistant,
            vec![
                ContentBlock::reasoning("plan first"),
                ContentBlock::text("Done."),
                ContentBlock::tool_invocation(
                    "Write",
                    json!({"file_path": "a.py", "content": "x"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
            ],
        );
        assert_eq!(
            extract(&record),
            "[Thinking] plan first\nDone.\n[Created file: a.py]"
        );
    }

    #[test]
    fn tool_results_are_described() {
        let record = Record::new(
            RecordKind::ToolResult,
            vec![
                ContentBlock::tool_result("All tests passed"),
                ContentBlock::tool_result("error: oops"),
                ContentBlock::ToolResult {
                    payload: ToolPayload::Items(4),
                },
            ],
        );
        assert_eq!(
            extract(&record),
            "All tests passed\n[Tool error occurred]\n[Tool results: 4 items]"
        );
    }

    #[test]
    fn result_length_is_configurable() {
        let record = Record::new(RecordKind::ToolResult, vec![ContentBlock::tool_result("twelve chars")]);
        assert_eq!(Extractor::new(5).extract(&record), "[Tool output: 12 chars]");
        assert_eq!(Extractor::new(50).extract(&record), "twelve chars");
    }

    #[test]
    fn empty_fragments_are_skipped() {
        let record = Record::new(
            RecordKind::User,
            vec![
                ContentBlock::text(""),
                ContentBlock::reasoning(""),
                ContentBlock::tool_result(""),
            ],
        );
        assert_eq!(extract(&record), "");
        assert_eq!(extract(&Record::new(RecordKind::Summary, Vec::new())), "");
    }

    #[test]
    fn extraction_is_pure() {
        let record = Record::new(
            RecordKind::Assistant,
            vec![ContentBlock::tool_invocation("Bash", Map::new())],
        );
        let before = record.clone();
        assert_eq!(extract(&record), extract(&record));
        assert_eq!(record, before);
    }
}
