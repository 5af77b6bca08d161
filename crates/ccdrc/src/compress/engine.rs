//! The compression pipeline: clean, select, render.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::CompressConfig;
use crate::transcript::Record;

use super::extract::Extractor;
use super::sanitize::clean_records;
use super::tokens::TokenEstimator;
use super::truncate::{Budget, CompressionStats, SelectedRecord, Truncator, TruncationPolicy};

/// Heading of every rendered summary.
pub const SUMMARY_HEADING: &str = "# Extracted conversation context";

/// Result of one compression run.
#[derive(Debug, Clone, Serialize)]
pub struct Compressed {
    /// Markdown rendering of the selected records.
    pub summary: String,
    pub stats: CompressionStats,
    #[serde(skip)]
    pub selection: Vec<SelectedRecord>,
    /// Name of the counter that produced the token figures.
    pub encoder: String,
}

/// Owns a token estimator and a configuration and runs the full pipeline.
///
/// ```ignore
/// let engine = CompressionEngine::new(CompressConfig::default());
/// let records = parse_transcript(&text);
/// let compressed = engine.compress(&records);
/// println!("{}", compressed.summary);
/// ```
#[derive(Debug)]
pub struct CompressionEngine {
    estimator: TokenEstimator,
    config: CompressConfig,
}

impl Default for CompressionEngine {
    fn default() -> Self {
        Self::new(CompressConfig::default())
    }
}

impl CompressionEngine {
    /// Build an engine whose estimator follows `config.encoder`.
    pub fn new(config: CompressConfig) -> Self {
        let estimator = TokenEstimator::for_encoder(config.encoder);
        debug!("Compression engine using {}", estimator.encoder_name());
        Self { estimator, config }
    }

    pub fn with_estimator(estimator: TokenEstimator, config: CompressConfig) -> Self {
        Self { estimator, config }
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn config(&self) -> &CompressConfig {
        &self.config
    }

    pub fn extractor(&self) -> Extractor {
        Extractor::new(self.config.result_max_len)
    }

    fn truncator(&self) -> Truncator<'_> {
        Truncator::new(
            &self.estimator,
            self.extractor(),
            TruncationPolicy::from(&self.config),
        )
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.estimator.count_tokens(text)
    }

    /// Token cost of a transcript after cleaning.
    pub fn measure(&self, records: &[Record]) -> usize {
        self.truncator().measure(&clean_records(records))
    }

    /// Context a session occupies when resumed as is: [`Self::measure`]
    /// plus the reasoning signatures, which are never part of a summary.
    pub fn footprint(&self, records: &[Record]) -> usize {
        let signatures: usize = records
            .iter()
            .flat_map(Record::signatures)
            .map(|s| self.estimator.count_tokens(s))
            .sum();
        self.measure(records) + signatures
    }

    /// Compress with the configured budget.
    pub fn compress(&self, records: &[Record]) -> Compressed {
        self.compress_with_budget(records, self.config.budget())
    }

    /// Clean `records`, select the opening and recent windows within
    /// `budget`, and render the result. `records` is not modified.
    pub fn compress_with_budget(&self, records: &[Record], budget: Budget) -> Compressed {
        let cleaned = clean_records(records);
        let selection = self.truncator().select(&cleaned, budget);
        info!("Compressed transcript: {}", selection.stats.to_log_string());

        let summary = render_summary(
            &selection.records,
            &selection.stats,
            self.estimator.encoder_name(),
            self.extractor(),
        );

        Compressed {
            summary,
            stats: selection.stats,
            selection: selection.records,
            encoder: self.estimator.encoder_name().to_string(),
        }
    }
}

/// Render selected records as Markdown: a heading with the kept share, one
/// `**Speaker**: text` paragraph per record, and a trailer naming the
/// encoder. Records with no text are skipped.
pub fn render_summary(
    records: &[SelectedRecord],
    stats: &CompressionStats,
    encoder: &str,
    extractor: Extractor,
) -> String {
    let mut out = String::new();
    out.push_str(SUMMARY_HEADING);
    out.push_str("\n\n");
    out.push_str(&format!(
        "Kept {} of {} messages (~{} of {} tokens, {:.1}% removed).\n\n---\n\n",
        stats.extracted_records,
        stats.total_records,
        stats.extracted_tokens,
        stats.total_tokens,
        stats.compression_ratio * 100.0,
    ));

    for selected in records {
        let text = extractor.extract(&selected.record);
        if text.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "**{}**: {}\n\n",
            selected.record.kind.speaker(),
            text
        ));
    }

    out.push_str(&format!(
        "---\n\nTokens counted with {encoder}; ~{} tokens included.\n",
        stats.extracted_tokens
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoder;
    use crate::transcript::{ContentBlock, RecordKind, parse_transcript};

    fn engine(config: CompressConfig) -> CompressionEngine {
        CompressionEngine::with_estimator(TokenEstimator::heuristic(), config)
    }

    #[test]
    fn renders_speakers_in_order() {
        let records = vec![
            Record::user("Please add a parser."),
            Record::assistant("Added the parser."),
        ];
        let compressed = engine(CompressConfig::default()).compress(&records);
        let user_at = compressed.summary.find("**User**: Please add a parser.").unwrap();
        let assistant_at = compressed
            .summary
            .find("**Assistant**: Added the parser.")
            .unwrap();
        assert!(user_at < assistant_at);
        assert!(compressed.summary.starts_with(SUMMARY_HEADING));
        assert!(compressed.summary.contains("Tokens counted with estimation"));
        assert_eq!(compressed.encoder, "estimation");
    }

    #[test]
    fn embedded_tool_json_never_reaches_the_summary() {
        let records = vec![Record::assistant(
            r#"Writing now [Tool: Write] {"file_path": "a.py", "content": "secret body"}"#,
        )];
        let compressed = engine(CompressConfig::default()).compress(&records);
        assert!(compressed.summary.contains("Writing now [Created file]"));
        assert!(!compressed.summary.contains("secret body"));
    }

    #[test]
    fn input_records_are_not_modified() {
        let records = parse_transcript(
            "{\"type\":\"user\",\"message\":{\"content\":\"[Tool: Bash] {\\\"command\\\": \\\"ls\\\"}\"}}",
        );
        let before = records.clone();
        let compressed = engine(CompressConfig::default()).compress(&records);
        assert_eq!(records, before);
        assert!(compressed.summary.contains("[Executed command]"));
    }

    #[test]
    fn empty_transcript_compresses_to_empty_selection() {
        let compressed = engine(CompressConfig::default()).compress(&[]);
        assert!(compressed.selection.is_empty());
        assert_eq!(compressed.stats.total_tokens, 0);
        assert_eq!(compressed.stats.compression_ratio, 0.0);
    }

    #[test]
    fn measure_matches_selection_total() {
        let records = vec![Record::user("a".repeat(70)), Record::assistant("b".repeat(35))];
        let engine = engine(CompressConfig::default());
        assert_eq!(engine.measure(&records), 30);
        assert_eq!(engine.compress(&records).stats.total_tokens, 30);
    }

    #[test]
    fn footprint_counts_signatures_the_summary_omits() {
        let records = vec![
            Record::user("a".repeat(35)),
            Record::new(
                RecordKind::Assistant,
                vec![ContentBlock::signed_reasoning("b".repeat(28), "s".repeat(70))],
            ),
        ];
        let engine = engine(CompressConfig::default());
        let measured = engine.measure(&records);
        assert_eq!(engine.footprint(&records), measured + 20);

        let compressed = engine.compress(&records);
        assert_eq!(compressed.stats.total_tokens, measured);
        assert!(!compressed.summary.contains("sss"));
    }

    #[test]
    fn estimate_encoder_config_builds_heuristic_engine() {
        let engine = CompressionEngine::new(CompressConfig::default().with_encoder(Encoder::Estimate));
        assert!(!engine.estimator().is_exact());
    }
}
