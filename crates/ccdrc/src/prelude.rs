//! Convenience re-exports for common `ccdrc` types.
//!
//! ```ignore
//! use ccdrc::prelude::*;
//! ```

// ── Transcripts ─────────────────────────────────────────────────────
pub use crate::transcript::{
    ContentBlock, Record, RecordKind, RecordMeta, Speaker, ToolPayload, TranscriptError,
    load_transcript, parse_line, parse_transcript,
};

// ── Compression ─────────────────────────────────────────────────────
pub use crate::compress::{
    Budget, Compressed, CompressionEngine, CompressionStats, Cut, Extractor, SelectedRecord,
    Selection, TokenCounter, TokenEstimator, TokenizerError, Truncator, TruncationPolicy,
};

// ── Sessions ────────────────────────────────────────────────────────
pub use crate::session::{Recommendation, SessionFile, SessionInfo, SessionLoader};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{CompressConfig, Encoder};
