//! Budgeted front/back selection with exact cuts at the boundaries.
//!
//! A long transcript is reduced to two windows:
//! 1. **Opening**: records from the start, up to the front budget. The
//!    opening states what the work is about.
//! 2. **Recent**: records from the end, up to the back budget. The recent
//!    window carries the current state of the work.
//!
//! The middle is dropped. The record that straddles each window's edge is
//! cut at a token boundary found by binary search, as long as more than
//! [`TruncationPolicy::min_cut_headroom`] tokens of budget remain. A cut
//! record becomes a copy holding the kept text plus a marker; the source
//! records are never modified.

use serde::Serialize;
use tracing::debug;

use crate::config::CompressConfig;
use crate::transcript::Record;

use super::extract::Extractor;
use super::tokens::TokenEstimator;

/// Appended to the kept head of a record cut by the opening window.
pub const TRUNCATED_MARKER: &str = "[content truncated]";

/// Prepended to the kept tail of a record cut by the recent window.
pub const OMITTED_MARKER: &str = "[earlier content omitted]";

/// Token budgets for the two windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Budget {
    pub front: usize,
    pub back: usize,
}

impl Budget {
    pub fn new(front: usize, back: usize) -> Self {
        Self { front, back }
    }

    pub fn total(&self) -> usize {
        self.front.saturating_add(self.back)
    }
}

/// How much of a selected record was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cut {
    Whole,
    /// The head was kept; the record ended the opening window.
    Head,
    /// The tail was kept; the record started the recent window.
    Tail,
}

/// A record chosen for the compressed output.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedRecord {
    /// Position in the source transcript.
    pub index: usize,
    pub record: Record,
    pub cut: Cut,
}

/// Counts describing one selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressionStats {
    pub total_records: usize,
    pub extracted_records: usize,
    pub total_tokens: usize,
    pub extracted_tokens: usize,
    /// Share of tokens removed: `1 - extracted_tokens / total_tokens`, or 0
    /// when the source is empty.
    pub compression_ratio: f64,
}

impl CompressionStats {
    fn new(
        total_records: usize,
        extracted_records: usize,
        total_tokens: usize,
        extracted_tokens: usize,
    ) -> Self {
        let compression_ratio = if total_tokens == 0 {
            0.0
        } else {
            1.0 - extracted_tokens as f64 / total_tokens as f64
        };
        Self {
            total_records,
            extracted_records,
            total_tokens,
            extracted_tokens,
            compression_ratio,
        }
    }

    /// One-line summary suitable for logging.
    pub fn to_log_string(&self) -> String {
        format!(
            "kept {}/{} records, ~{}/{} tokens ({:.1}% removed)",
            self.extracted_records,
            self.total_records,
            self.extracted_tokens,
            self.total_tokens,
            self.compression_ratio * 100.0,
        )
    }
}

/// The records chosen from a transcript, in source order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Selection {
    pub records: Vec<SelectedRecord>,
    pub stats: CompressionStats,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Knobs for the selection passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationPolicy {
    /// A boundary record is cut only when remaining budget exceeds this.
    pub min_cut_headroom: usize,
    /// Minimum binary-search steps; long texts get up to `log2(len) + 1`.
    pub search_iterations: u32,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self::from(&CompressConfig::default())
    }
}

impl From<&CompressConfig> for TruncationPolicy {
    fn from(config: &CompressConfig) -> Self {
        Self {
            min_cut_headroom: config.min_cut_headroom,
            search_iterations: config.search_iterations,
        }
    }
}

// ── Selection ──────────────────────────────────────────────────────

/// Selects the opening and recent windows of a transcript.
#[derive(Debug, Clone, Copy)]
pub struct Truncator<'a> {
    estimator: &'a TokenEstimator,
    extractor: Extractor,
    policy: TruncationPolicy,
}

impl<'a> Truncator<'a> {
    pub fn new(estimator: &'a TokenEstimator, extractor: Extractor, policy: TruncationPolicy) -> Self {
        Self {
            estimator,
            extractor,
            policy,
        }
    }

    /// Token cost of one record's extracted text. Empty text costs nothing
    /// regardless of the encoder.
    pub fn cost(&self, record: &Record) -> usize {
        self.cost_of_text(&self.extractor.extract(record))
    }

    fn cost_of_text(&self, text: &str) -> usize {
        if text.is_empty() {
            0
        } else {
            self.estimator.count_tokens(text)
        }
    }

    /// Total token cost of `records`.
    pub fn measure(&self, records: &[Record]) -> usize {
        records.iter().map(|r| self.cost(r)).sum()
    }

    /// Choose records for the opening and recent windows.
    ///
    /// Records with no text are never chosen. Each source record appears at
    /// most once in the result, and the result is ordered by source index.
    pub fn select(&self, records: &[Record], budget: Budget) -> Selection {
        if records.is_empty() {
            return Selection::default();
        }

        let contents: Vec<String> = records.iter().map(|r| self.extractor.extract(r)).collect();
        let costs: Vec<usize> = contents.iter().map(|c| self.cost_of_text(c)).collect();
        let total_tokens: usize = costs.iter().sum();

        let mut claimed: Vec<Option<(Record, Cut)>> = vec![None; records.len()];

        let mut front_used = 0usize;
        for (index, &cost) in costs.iter().enumerate() {
            if cost == 0 {
                continue;
            }
            if front_used + cost <= budget.front {
                claimed[index] = Some((records[index].clone(), Cut::Whole));
                front_used += cost;
                continue;
            }
            let headroom = budget.front - front_used;
            if headroom > self.policy.min_cut_headroom {
                let head = self.cut_prefix(&contents[index], headroom);
                if !head.is_empty() {
                    front_used += self.estimator.count_tokens(head);
                    let text = format!("{head}\n\n{TRUNCATED_MARKER}");
                    claimed[index] = Some((records[index].with_text(text), Cut::Head));
                }
            }
            break;
        }

        let mut back_used = 0usize;
        for index in (0..records.len()).rev() {
            let cost = costs[index];
            if cost == 0 || claimed[index].is_some() {
                continue;
            }
            if back_used + cost <= budget.back {
                claimed[index] = Some((records[index].clone(), Cut::Whole));
                back_used += cost;
                continue;
            }
            let headroom = budget.back - back_used;
            if headroom > self.policy.min_cut_headroom {
                let tail = self.cut_suffix(&contents[index], headroom);
                if !tail.is_empty() {
                    back_used += self.estimator.count_tokens(tail);
                    let text = format!("{OMITTED_MARKER}\n\n{tail}");
                    claimed[index] = Some((records[index].with_text(text), Cut::Tail));
                }
            }
            break;
        }

        let selected: Vec<SelectedRecord> = claimed
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.map(|(record, cut)| SelectedRecord { index, record, cut })
            })
            .collect();

        let extracted_tokens = selected.iter().map(|s| self.cost(&s.record)).sum();
        let stats = CompressionStats::new(records.len(), selected.len(), total_tokens, extracted_tokens);

        debug!(
            "Selection: front ~{}/{} tokens, back ~{}/{} tokens, {}",
            front_used,
            budget.front,
            back_used,
            budget.back,
            stats.to_log_string()
        );

        Selection {
            records: selected,
            stats,
        }
    }

    // ── Boundary cuts ──

    /// Longest prefix of `content`, in whole characters, whose token count
    /// is at most `target`.
    pub fn cut_prefix<'c>(&self, content: &'c str, target: usize) -> &'c str {
        let bounds = char_bounds(content);
        let chars = bounds.len() - 1;
        let prefix = |k: usize| content.get(..bounds[k]).unwrap_or_default();
        prefix(self.longest_fitting(chars, target, prefix))
    }

    /// Longest suffix of `content`, in whole characters, whose token count
    /// is at most `target`.
    pub fn cut_suffix<'c>(&self, content: &'c str, target: usize) -> &'c str {
        let bounds = char_bounds(content);
        let chars = bounds.len() - 1;
        let suffix = |k: usize| content.get(bounds[chars - k]..).unwrap_or_default();
        suffix(self.longest_fitting(chars, target, suffix))
    }

    /// Binary search for the largest `k <= chars` with
    /// `count(slice_of(k)) <= target`. The empty slice is the fallback.
    fn longest_fitting<'c>(
        &self,
        chars: usize,
        target: usize,
        slice_of: impl Fn(usize) -> &'c str,
    ) -> usize {
        if self.estimator.count_tokens(slice_of(chars)) <= target {
            return chars;
        }

        let iterations = self.policy.search_iterations.max(usize::BITS - chars.leading_zeros());
        let (mut low, mut high) = (0usize, chars);
        for _ in 0..iterations {
            if low + 1 >= high {
                break;
            }
            let mid = low + (high - low) / 2;
            if self.estimator.count_tokens(slice_of(mid)) <= target {
                low = mid;
            } else {
                high = mid;
            }
        }
        low
    }
}

/// Byte offset of every character start, plus the end of the string.
fn char_bounds(content: &str) -> Vec<usize> {
    content
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(content.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::tokens::{TokenCounter, TokenizerError};
    use crate::transcript::{ContentBlock, RecordKind};

    fn ten_token_records(n: usize) -> Vec<Record> {
        // 35 ASCII chars estimate to exactly 10 tokens.
        (0..n)
            .map(|i| {
                let body = format!("{i:02}{}", "a".repeat(33));
                if i % 2 == 0 {
                    Record::user(body)
                } else {
                    Record::assistant(body)
                }
            })
            .collect()
    }

    fn truncator(estimator: &TokenEstimator, min_cut_headroom: usize) -> Truncator<'_> {
        Truncator::new(
            estimator,
            Extractor::default(),
            TruncationPolicy {
                min_cut_headroom,
                search_iterations: 20,
            },
        )
    }

    /// One token per whitespace-separated word.
    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn name(&self) -> &str {
            "words"
        }

        fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
            Ok(text.split_whitespace().count())
        }
    }

    #[test]
    fn exact_counter_drives_both_cuts() {
        let estimator = TokenEstimator::with_counter(WordCounter);
        let records: Vec<Record> = (0..10)
            .map(|i| {
                let words: Vec<String> = (0..10).map(|j| format!("r{i}w{j}")).collect();
                Record::user(words.join(" "))
            })
            .collect();
        let selection = truncator(&estimator, 0).select(&records, Budget::new(25, 35));

        let picked: Vec<(usize, Cut)> = selection.records.iter().map(|s| (s.index, s.cut)).collect();
        assert_eq!(
            picked,
            vec![
                (0, Cut::Whole),
                (1, Cut::Whole),
                (2, Cut::Head),
                (6, Cut::Tail),
                (7, Cut::Whole),
                (8, Cut::Whole),
                (9, Cut::Whole),
            ]
        );

        let text_of = |position: usize| match &selection.records[position].record.blocks[0] {
            ContentBlock::Text { text } => text.clone(),
            other => panic!("expected text, got {other:?}"),
        };
        let head = text_of(2);
        assert!(head.starts_with("r2w0 r2w1 r2w2 r2w3 r2w4"));
        assert!(!head.contains("r2w5"));
        let tail = text_of(3);
        assert!(tail.ends_with("r6w5 r6w6 r6w7 r6w8 r6w9"));
        assert!(!tail.contains("r6w4"));

        // Both markers are counted: two words for the head, three for the tail.
        assert_eq!(selection.stats.total_tokens, 100);
        assert_eq!(selection.stats.extracted_tokens, 20 + 7 + 8 + 30);
    }

    #[test]
    fn exact_counter_prefix_is_maximal() {
        let estimator = TokenEstimator::with_counter(WordCounter);
        let t = truncator(&estimator, 100);
        assert_eq!(t.cut_prefix("alpha beta gamma delta", 2), "alpha beta ");
        assert_eq!(t.cut_suffix("alpha beta gamma delta", 2), " gamma delta");
        assert_eq!(t.cut_prefix("alpha beta", 0), "");
    }

    #[test]
    fn small_transcript_is_kept_whole() {
        let estimator = TokenEstimator::heuristic();
        let records = ten_token_records(4);
        let selection = truncator(&estimator, 100).select(&records, Budget::new(25_000, 75_000));
        assert_eq!(selection.records.len(), 4);
        assert!(selection.records.iter().all(|s| s.cut == Cut::Whole));
        assert_eq!(selection.stats.total_tokens, 40);
        assert_eq!(selection.stats.extracted_tokens, 40);
        assert_eq!(selection.stats.compression_ratio, 0.0);
    }

    #[test]
    fn zero_budgets_select_nothing() {
        let estimator = TokenEstimator::heuristic();
        let records = ten_token_records(5);
        let selection = truncator(&estimator, 100).select(&records, Budget::new(0, 0));
        assert!(selection.is_empty());
        assert_eq!(selection.stats.total_tokens, 50);
        assert_eq!(selection.stats.extracted_tokens, 0);
        assert_eq!(selection.stats.compression_ratio, 1.0);
    }

    #[test]
    fn log_string_reports_removed_share() {
        let stats = CompressionStats::new(10, 9, 100, 90);
        assert_eq!(stats.to_log_string(), "kept 9/10 records, ~90/100 tokens (10.0% removed)");
    }

    #[test]
    fn small_headroom_drops_the_middle() {
        let estimator = TokenEstimator::heuristic();
        let records = ten_token_records(10);
        let selection = truncator(&estimator, 100).select(&records, Budget::new(25, 75));

        let indices: Vec<usize> = selection.records.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 3, 4, 5, 6, 7, 8, 9]);
        assert!(selection.records.iter().all(|s| s.cut == Cut::Whole));
        assert_eq!(selection.stats.extracted_tokens, 90);
        assert_eq!(selection.stats.total_tokens, 100);
    }

    #[test]
    fn boundary_record_is_cut_when_headroom_allows() {
        let estimator = TokenEstimator::heuristic();
        let records = ten_token_records(10);
        let selection = truncator(&estimator, 0).select(&records, Budget::new(25, 75));

        assert_eq!(selection.records.len(), 10);
        let cut = &selection.records[2];
        assert_eq!(cut.index, 2);
        assert_eq!(cut.cut, Cut::Head);
        let ContentBlock::Text { text } = &cut.record.blocks[0] else {
            panic!("cut record should hold one text block");
        };
        assert!(text.ends_with(TRUNCATED_MARKER));
        assert!(text.starts_with("02"));
        // The source record is untouched.
        assert_eq!(records[2].blocks.len(), 1);
        assert!(selection.stats.extracted_tokens <= 25 + 75 + 50);
    }

    #[test]
    fn recent_window_cut_keeps_the_tail() {
        let estimator = TokenEstimator::heuristic();
        let mut records = vec![Record::user("short opening message here")];
        records.push(Record::assistant(format!("START{}END", "x".repeat(3_500))));
        let selection = truncator(&estimator, 100).select(&records, Budget::new(10, 500));

        let last = selection.records.last().unwrap();
        assert_eq!(last.index, 1);
        assert_eq!(last.cut, Cut::Tail);
        let ContentBlock::Text { text } = &last.record.blocks[0] else {
            panic!("cut record should hold one text block");
        };
        assert!(text.starts_with(OMITTED_MARKER));
        assert!(text.ends_with("END"));
        assert!(!text.contains("START"));
        assert!(selection.stats.extracted_tokens <= 510 + 50);
    }

    #[test]
    fn single_oversized_record_with_zero_front_budget() {
        let estimator = TokenEstimator::heuristic();
        let content = "b".repeat(350_000);
        let records = vec![Record::user(content)];
        let selection = truncator(&estimator, 100).select(&records, Budget::new(0, 75_000));

        assert_eq!(selection.records.len(), 1);
        assert_eq!(selection.records[0].cut, Cut::Tail);
        assert_eq!(selection.stats.total_tokens, 100_000);
        assert!(selection.stats.extracted_tokens <= 75_000 + 50);
        assert!(selection.stats.extracted_tokens > 74_000);
    }

    #[test]
    fn zero_cost_records_are_never_selected() {
        let estimator = TokenEstimator::heuristic();
        let records = vec![
            Record::new(RecordKind::Summary, Vec::new()),
            Record::user(""),
            Record::assistant("x".repeat(70)),
        ];
        let selection = truncator(&estimator, 100).select(&records, Budget::new(1_000, 1_000));
        let indices: Vec<usize> = selection.records.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![2]);
    }

    #[test]
    fn empty_input_gives_empty_selection() {
        let estimator = TokenEstimator::heuristic();
        let selection = truncator(&estimator, 100).select(&[], Budget::new(10, 10));
        assert!(selection.is_empty());
        assert_eq!(selection.stats, CompressionStats::default());
    }

    #[test]
    fn budget_bound_holds_across_shapes() {
        let estimator = TokenEstimator::heuristic();
        for n in [1usize, 3, 17, 60] {
            let records: Vec<Record> = (0..n)
                .map(|i| Record::user(format!("{}\n{}", "word ".repeat(i * 37 % 400 + 1), "中文".repeat(i % 5))))
                .collect();
            for (front, back) in [(0, 0), (50, 50), (200, 1_000), (5_000, 0)] {
                for headroom in [0, 100] {
                    let selection =
                        truncator(&estimator, headroom).select(&records, Budget::new(front, back));
                    assert!(
                        selection.stats.extracted_tokens <= front + back + 50,
                        "n={n} front={front} back={back}: {}",
                        selection.stats.extracted_tokens
                    );
                    let indices: Vec<usize> = selection.records.iter().map(|s| s.index).collect();
                    assert!(indices.windows(2).all(|w| w[0] < w[1]));
                }
            }
        }
    }

    #[test]
    fn cut_prefix_is_maximal() {
        let estimator = TokenEstimator::heuristic();
        let t = truncator(&estimator, 100);
        let content = "a".repeat(35);
        let head = t.cut_prefix(&content, 5);
        assert_eq!(head.len(), 20);
        assert!(estimator.count_tokens(head) <= 5);
        assert!(estimator.count_tokens(content.get(..21).unwrap()) > 5);
    }

    #[test]
    fn cuts_respect_char_boundaries() {
        let estimator = TokenEstimator::heuristic();
        let t = truncator(&estimator, 100);
        let content = "héllo wörld ünïcödé ".repeat(40);
        for target in [1, 7, 30, 100] {
            let head = t.cut_prefix(&content, target);
            let tail = t.cut_suffix(&content, target);
            assert!(content.starts_with(head));
            assert!(content.ends_with(tail));
            assert!(estimator.count_tokens(head) <= target);
            assert!(estimator.count_tokens(tail) <= target);
        }
    }

    #[test]
    fn whole_content_is_returned_when_it_fits() {
        let estimator = TokenEstimator::heuristic();
        let t = truncator(&estimator, 100);
        assert_eq!(t.cut_prefix("fits", 100), "fits");
        assert_eq!(t.cut_suffix("fits", 100), "fits");
        assert_eq!(t.cut_prefix("", 0), "");
    }
}
