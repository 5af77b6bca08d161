//! Session files: discovery, per-session summaries, and paged loading.

pub mod discovery;
pub mod info;
pub mod pool;

pub use discovery::{SessionFile, default_sessions_root, discover_sessions, find_session};
pub use info::{Preview, PreviewLine, Recommendation, SessionInfo, describe_records, inspect_session, preview};
pub use pool::{DEFAULT_PAGE_SIZE, SessionLoader};
