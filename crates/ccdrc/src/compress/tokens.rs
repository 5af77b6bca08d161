//! Token counting with an optional exact tokenizer and a deterministic
//! character-class fallback.
//!
//! [`TokenEstimator`] is the single entry point the rest of the crate uses.
//! It wraps an optional [`TokenCounter`] (a BPE encoder when the `tiktoken`
//! feature is enabled) and falls back to [`estimate_tokens`] whenever no
//! encoder is configured or the encoder reports an error. Every count is a
//! non-negative integer and the same text always yields the same count for a
//! given estimator.

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::Encoder;

/// Average characters per token for non-wide text.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Tokens charged per wide (CJK) character.
pub const WIDE_TOKENS_PER_CHAR: f64 = 1.8;

/// Name reported when counts come from the heuristic.
pub const ESTIMATION_NAME: &str = "estimation";

const CODE_FENCE: &str = "```";
const CODE_FENCE_FACTOR: f64 = 1.2;
const DENSE_NEWLINE_BONUS: f64 = 0.1;
const CHARS_PER_LINE: f64 = 50.0;

/// Errors from an exact tokenizer.
#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("tokenizer initialization failed: {0}")]
    Init(String),
    #[error("token encoding failed: {0}")]
    Encode(String),
}

/// An exact token counter. Implementations must be deterministic.
pub trait TokenCounter: Send + Sync {
    /// Encoder name reported in rendered summaries.
    fn name(&self) -> &str;

    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError>;
}

// ── Heuristic ──────────────────────────────────────────────────────

fn is_wide(c: char) -> bool {
    matches!(
        c,
        '\u{4E00}'..='\u{9FFF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{3040}'..='\u{30FF}'
            | '\u{AC00}'..='\u{D7AF}'
    )
}

/// Estimate the token count of `text` from its character classes.
///
/// Wide characters cost [`WIDE_TOKENS_PER_CHAR`] each and everything else
/// costs `1 / DEFAULT_CHARS_PER_TOKEN`. Text containing a code fence is
/// charged 20% more. Newline-dense text (one newline per 50 characters or
/// more) gets 10% more, whatever its mix of wide and narrow characters.
/// Sparser text gets a partial bonus that ramps in with the newline count
/// instead of switching on at a threshold, so appending text never lowers
/// the estimate. The result is clamped to `[chars / 10, chars / 2]`
/// and floored.
pub fn estimate_tokens(text: &str) -> usize {
    let mut wide = 0usize;
    let mut other = 0usize;
    let mut newlines = 0usize;
    for c in text.chars() {
        if is_wide(c) {
            wide += 1;
        } else {
            other += 1;
            if c == '\n' {
                newlines += 1;
            }
        }
    }

    let total = (wide + other) as f64;
    if total == 0.0 {
        return 0;
    }

    // Wide-dominant and mixed text use the same two rates.
    let base = wide as f64 * WIDE_TOKENS_PER_CHAR + other as f64 / DEFAULT_CHARS_PER_TOKEN;

    // Base cost of the longest text this many newlines make dense, holding
    // as many of the wide characters as fit. It reaches `base` exactly when
    // newlines * CHARS_PER_LINE >= total, whatever the character mix.
    let dense_span = newlines as f64 * CHARS_PER_LINE;
    let line_weight = dense_span / DEFAULT_CHARS_PER_TOKEN
        + (wide as f64).min(dense_span) * (WIDE_TOKENS_PER_CHAR - 1.0 / DEFAULT_CHARS_PER_TOKEN);
    let mut estimated = base + DENSE_NEWLINE_BONUS * base.min(line_weight);

    if text.contains(CODE_FENCE) {
        estimated *= CODE_FENCE_FACTOR;
    }

    estimated.min(total / 2.0).max(total / 10.0).floor() as usize
}

// ── Estimator ──────────────────────────────────────────────────────

/// Counts tokens with an exact encoder when one is available, otherwise
/// with [`estimate_tokens`].
pub struct TokenEstimator {
    exact: Option<Box<dyn TokenCounter>>,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("encoder", &self.encoder_name())
            .finish()
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl TokenEstimator {
    /// An estimator that only uses the heuristic.
    pub fn heuristic() -> Self {
        Self { exact: None }
    }

    /// An estimator backed by an exact counter.
    pub fn with_counter(counter: impl TokenCounter + 'static) -> Self {
        Self {
            exact: Some(Box::new(counter)),
        }
    }

    /// Build the estimator for an encoder choice. Encoders that cannot be
    /// loaded degrade to the heuristic with a warning.
    pub fn for_encoder(encoder: Encoder) -> Self {
        match encoder {
            Encoder::Estimate => Self::heuristic(),
            #[cfg(feature = "tiktoken")]
            Encoder::Auto => match TiktokenCounter::o200k() {
                Ok(counter) => Self::with_counter(counter),
                Err(e) => {
                    debug!("o200k_base unavailable ({e}); trying cl100k_base");
                    Self::or_heuristic(TiktokenCounter::cl100k())
                }
            },
            #[cfg(feature = "tiktoken")]
            Encoder::O200k => Self::or_heuristic(TiktokenCounter::o200k()),
            #[cfg(feature = "tiktoken")]
            Encoder::Cl100k => Self::or_heuristic(TiktokenCounter::cl100k()),
            #[cfg(not(feature = "tiktoken"))]
            other => {
                if other != Encoder::Auto {
                    warn!("Encoder '{other}' needs the tiktoken feature; using {ESTIMATION_NAME}");
                }
                Self::heuristic()
            }
        }
    }

    #[cfg(feature = "tiktoken")]
    fn or_heuristic(counter: Result<TiktokenCounter, TokenizerError>) -> Self {
        match counter {
            Ok(counter) => Self::with_counter(counter),
            Err(e) => {
                warn!("No exact tokenizer available ({e}); using {ESTIMATION_NAME}");
                Self::heuristic()
            }
        }
    }

    /// Whether counts come from an exact encoder.
    pub fn is_exact(&self) -> bool {
        self.exact.is_some()
    }

    /// The encoder name, or `"estimation"` for the heuristic.
    pub fn encoder_name(&self) -> &str {
        self.exact
            .as_ref()
            .map_or(ESTIMATION_NAME, |counter| counter.name())
    }

    /// Count tokens in `text`. An encoder error falls back to the heuristic
    /// for this call only.
    pub fn count_tokens(&self, text: &str) -> usize {
        if let Some(counter) = &self.exact {
            match counter.count_tokens(text) {
                Ok(n) => return n,
                Err(e) => trace!("{} failed, estimating instead: {e}", counter.name()),
            }
        }
        estimate_tokens(text)
    }
}

// ── tiktoken ───────────────────────────────────────────────────────

/// BPE counter backed by `tiktoken-rs`.
#[cfg(feature = "tiktoken")]
pub struct TiktokenCounter {
    name: &'static str,
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenCounter {
    pub fn o200k() -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::o200k_base().map_err(|e| TokenizerError::Init(e.to_string()))?;
        Ok(Self {
            name: "o200k_base",
            bpe,
        })
    }

    pub fn cl100k() -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| TokenizerError::Init(e.to_string()))?;
        Ok(Self {
            name: "cl100k_base",
            bpe,
        })
    }
}

#[cfg(feature = "tiktoken")]
impl TokenCounter for TiktokenCounter {
    fn name(&self) -> &str {
        self.name
    }

    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn name(&self) -> &str {
            "words"
        }

        fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
            Ok(text.split_whitespace().count())
        }
    }

    struct BrokenCounter;

    impl TokenCounter for BrokenCounter {
        fn name(&self) -> &str {
            "broken"
        }

        fn count_tokens(&self, _text: &str) -> Result<usize, TokenizerError> {
            Err(TokenizerError::Encode("boom".into()))
        }
    }

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn plain_ascii_uses_chars_per_token() {
        assert_eq!(estimate_tokens(&"a".repeat(35)), 10);
        assert_eq!(estimate_tokens(&"a".repeat(350)), 100);
    }

    #[test]
    fn wide_text_is_clamped_to_half_its_length() {
        // 10 CJK chars cost 18 before clamping; the ceiling is 10 / 2.
        assert_eq!(estimate_tokens(&"中".repeat(10)), 5);
    }

    #[test]
    fn short_text_respects_floor_clamp() {
        // "ab" estimates 0.57 and the floor clamp is 0.2; both floor to 0.
        assert_eq!(estimate_tokens("ab"), 0);
        assert_eq!(estimate_tokens(&"a".repeat(7)), 2);
    }

    #[test]
    fn code_fence_adds_twenty_percent() {
        let plain = format!("{}{}", "a".repeat(347), "bbb");
        let fenced = format!("{}{}", "a".repeat(347), "```");
        assert_eq!(estimate_tokens(&plain), 100);
        assert_eq!(estimate_tokens(&fenced), 120);
    }

    #[test]
    fn dense_newlines_add_ten_percent() {
        // 700 chars with 100 newlines: well above one newline per 50 chars.
        let text = "abcdef\n".repeat(100);
        assert_eq!(estimate_tokens(&text), 220);
    }

    #[test]
    fn dense_mixed_text_gets_the_full_newline_bonus() {
        // 49-char lines with 5 wide chars each: just past one newline per 50.
        let line = format!("{}{}\n", "中".repeat(5), "a".repeat(43));
        let dense = line.repeat(20);
        // base = 100 * 1.8 + 880 / 3.5 = 431.43, times 1.1.
        assert_eq!(estimate_tokens(&dense), 474);

        let flat = format!("{}{}", "中".repeat(5), "a".repeat(45)).repeat(20);
        // Same size without newlines: no bonus.
        assert_eq!(estimate_tokens(&flat), 437);
    }

    #[test]
    fn estimate_is_monotonic_under_appends() {
        let pieces = ["hello ", "\n", "世界", "```", "x", "\n\n\n", "한국어", "plain words here"];
        let mut text = String::new();
        let mut previous = 0;
        for round in 0..400 {
            text.push_str(pieces[round % pieces.len()]);
            let current = estimate_tokens(&text);
            assert!(current >= previous, "count dropped at round {round}");
            previous = current;
        }
    }

    #[test]
    fn estimate_is_monotonic_under_prepends() {
        let base = "line one\nline two\n".repeat(3);
        let mut text = base.clone();
        let mut previous = estimate_tokens(&text);
        for i in 0..200 {
            let piece = if i % 3 == 0 { "wordy text without breaks " } else { "\n" };
            text.insert_str(0, piece);
            let current = estimate_tokens(&text);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn heuristic_estimator_reports_estimation() {
        let estimator = TokenEstimator::heuristic();
        assert!(!estimator.is_exact());
        assert_eq!(estimator.encoder_name(), ESTIMATION_NAME);
        assert_eq!(estimator.count_tokens(&"a".repeat(35)), 10);
    }

    #[test]
    fn exact_counter_is_preferred() {
        let estimator = TokenEstimator::with_counter(WordCounter);
        assert!(estimator.is_exact());
        assert_eq!(estimator.encoder_name(), "words");
        assert_eq!(estimator.count_tokens("one two three"), 3);
    }

    #[test]
    fn counter_errors_fall_back_to_heuristic() {
        let estimator = TokenEstimator::with_counter(BrokenCounter);
        assert_eq!(estimator.count_tokens(&"a".repeat(35)), 10);
    }

    #[test]
    fn estimate_encoder_is_heuristic() {
        let estimator = TokenEstimator::for_encoder(Encoder::Estimate);
        assert_eq!(estimator.encoder_name(), ESTIMATION_NAME);
    }
}
