//! Compress long chat transcripts into a fixed token budget.
//!
//! `ccdrc` reads newline-delimited JSON transcripts of coding-assistant
//! sessions and produces a Markdown summary that fits a token budget. It keeps
//! the **opening** of a session (what the work is about) and its most
//! **recent** records (where the work stands), drops the middle, and cuts the
//! record at each window's edge at an exact token boundary. Tool activity is
//! rendered as short descriptions such as `[Created file: src/lib.rs]`, never
//! as raw tool-input JSON, so a model resumed on the summary does not learn to
//! imitate that JSON.
//!
//! # Getting started
//!
//! ```ignore
//! use ccdrc::prelude::*;
//!
//! let records = load_transcript(Path::new("session.jsonl"))?;
//! let engine = CompressionEngine::new(CompressConfig::default());
//! let compressed = engine.compress(&records);
//!
//! println!("{}", compressed.summary);
//! eprintln!("{}", compressed.stats.to_log_string());
//! ```
//!
//! # Where to find things
//!
//! - **Parse transcripts:** [`transcript::parse_line`] and
//!   [`transcript::load_transcript`] normalize every supported line layout
//!   into a [`Record`].
//! - **Count tokens:** [`TokenEstimator`](compress::tokens::TokenEstimator)
//!   uses an exact BPE encoder when the `tiktoken` feature is on and a
//!   monotonic character-class heuristic otherwise.
//! - **Describe tool calls:** see [`compress::sanitize`].
//! - **Select within a budget:** [`Truncator`](compress::truncate::Truncator)
//!   runs the opening and recent passes;
//!   [`CompressionEngine`](compress::engine::CompressionEngine) wraps the
//!   whole pipeline.
//! - **Browse sessions on disk:** [`session::discover_sessions`],
//!   [`session::SessionLoader`] for paged concurrent loading, and
//!   [`session::SessionInfo`] for per-session summaries.
//! - **Tune behavior:** [`CompressConfig`].

pub mod compress;
pub mod config;
pub mod logging;
pub mod prelude;
pub mod session;
pub mod transcript;

pub use config::{CompressConfig, Encoder};
pub use transcript::{ContentBlock, Record, RecordKind, RecordMeta, Speaker, ToolPayload, TranscriptError};
