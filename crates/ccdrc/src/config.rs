//! Compression configuration.
//!
//! [`CompressConfig`] carries every tunable the engine reads. Defaults keep a
//! 25k-token opening and a 75k-token recent window, cut boundary records only
//! when more than 100 tokens of headroom remain, and recommend compression
//! for sessions of 100k tokens or more.

use serde::{Deserialize, Serialize};

use crate::compress::truncate::Budget;

/// Default token budget for the opening of a transcript.
pub const DEFAULT_FRONT_TOKENS: usize = 25_000;
/// Default token budget for the most recent records.
pub const DEFAULT_BACK_TOKENS: usize = 75_000;
/// A boundary record is only cut when more headroom than this remains.
pub const DEFAULT_MIN_CUT_HEADROOM: usize = 100;
/// Minimum number of binary-search steps when cutting a record.
pub const DEFAULT_SEARCH_ITERATIONS: u32 = 20;
/// Longest tool result passed through verbatim.
pub const DEFAULT_RESULT_MAX_LEN: usize = 100;
/// Sessions of at least this many tokens are recommended for compression.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 100_000;
/// Sessions above this many tokens no longer fit a model context.
pub const DEFAULT_CONTEXT_LIMIT: usize = 200_000;

/// Which token counter to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoder {
    /// The best exact encoder available, else the heuristic.
    #[default]
    Auto,
    O200k,
    Cl100k,
    /// Always use the heuristic.
    Estimate,
}

impl std::fmt::Display for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoder::Auto => write!(f, "auto"),
            Encoder::O200k => write!(f, "o200k"),
            Encoder::Cl100k => write!(f, "cl100k"),
            Encoder::Estimate => write!(f, "estimate"),
        }
    }
}

impl std::str::FromStr for Encoder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Encoder::Auto),
            "o200k" | "o200k_base" => Ok(Encoder::O200k),
            "cl100k" | "cl100k_base" => Ok(Encoder::Cl100k),
            "estimate" | "estimation" | "heuristic" => Ok(Encoder::Estimate),
            other => Err(format!(
                "unknown encoder '{other}' (expected auto, o200k, cl100k, or estimate)"
            )),
        }
    }
}

/// Tunables for extraction, selection, and session recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressConfig {
    pub front_tokens: usize,
    pub back_tokens: usize,
    pub min_cut_headroom: usize,
    pub search_iterations: u32,
    pub result_max_len: usize,
    pub compress_threshold: usize,
    pub context_limit: usize,
    pub encoder: Encoder,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            front_tokens: DEFAULT_FRONT_TOKENS,
            back_tokens: DEFAULT_BACK_TOKENS,
            min_cut_headroom: DEFAULT_MIN_CUT_HEADROOM,
            search_iterations: DEFAULT_SEARCH_ITERATIONS,
            result_max_len: DEFAULT_RESULT_MAX_LEN,
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
            context_limit: DEFAULT_CONTEXT_LIMIT,
            encoder: Encoder::Auto,
        }
    }
}

impl CompressConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(mut self, front: usize, back: usize) -> Self {
        self.front_tokens = front;
        self.back_tokens = back;
        self
    }

    pub fn with_min_cut_headroom(mut self, tokens: usize) -> Self {
        self.min_cut_headroom = tokens;
        self
    }

    pub fn with_compress_threshold(mut self, tokens: usize) -> Self {
        self.compress_threshold = tokens;
        self
    }

    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// The front/back budget this configuration selects with.
    pub fn budget(&self) -> Budget {
        Budget::new(self.front_tokens, self.back_tokens)
    }

    /// Whether a session of `tokens` tokens should be compressed before it
    /// is resumed.
    pub fn needs_compression(&self, tokens: usize) -> bool {
        tokens >= self.compress_threshold
    }
}
