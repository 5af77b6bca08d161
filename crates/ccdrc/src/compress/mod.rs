//! Transcript compression.
//!
//! | Module | Role |
//! |--------|------|
//! | [`sanitize`] | Describes tool calls and strips embedded tool JSON |
//! | [`extract`] | Flattens a record into countable text |
//! | [`tokens`] | Exact or estimated token counts |
//! | [`truncate`] | Budgeted opening/recent selection with boundary cuts |
//! | [`engine`] | Runs the pipeline and renders the summary |

pub mod engine;
pub mod extract;
pub mod sanitize;
pub mod tokens;
pub mod truncate;

pub use engine::{Compressed, CompressionEngine, render_summary};
pub use extract::{Extractor, extract};
pub use sanitize::{clean_record, clean_records, describe_invocation, describe_result, strip_embedded_tool_json};
pub use tokens::{TokenCounter, TokenEstimator, TokenizerError, estimate_tokens};
pub use truncate::{Budget, CompressionStats, Cut, SelectedRecord, Selection, Truncator, TruncationPolicy};
