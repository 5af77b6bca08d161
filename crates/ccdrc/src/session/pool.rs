//! Concurrent loading of one page of sessions.
//!
//! Each session on a page is parsed and measured on its own blocking worker.
//! Results are gathered from a [`JoinSet`] as they finish and put back in
//! page order. A worker that fails, panics, or misses the page deadline
//! yields a placeholder [`SessionInfo`] instead of failing the page.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::compress::CompressionEngine;

use super::discovery::SessionFile;
use super::info::{SessionInfo, inspect_session};

/// Sessions shown per page.
pub const DEFAULT_PAGE_SIZE: usize = 3;

/// Loads pages of sessions with one worker per session.
///
/// Workers run on the blocking pool and cannot be cancelled once started.
/// Callers that enforce a deadline should shut their runtime down with
/// [`tokio::runtime::Runtime::shutdown_background`] so abandoned workers do
/// not hold up process exit.
#[derive(Debug, Clone)]
pub struct SessionLoader {
    engine: Arc<CompressionEngine>,
    page_size: usize,
    deadline: Option<Duration>,
}

impl SessionLoader {
    pub fn new(engine: Arc<CompressionEngine>) -> Self {
        Self {
            engine,
            page_size: DEFAULT_PAGE_SIZE,
            deadline: None,
        }
    }

    /// Sessions per page; values below one are treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Give up on workers still running after `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages needed for `total` sessions.
    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }

    /// Load page `page` (0-based) of `files`. An out-of-range page is empty.
    pub async fn load_page(&self, files: &[SessionFile], page: usize) -> Vec<SessionInfo> {
        let start = page.saturating_mul(self.page_size);
        let Some(page_files) = files.get(start..files.len().min(start.saturating_add(self.page_size))) else {
            return Vec::new();
        };
        if page_files.is_empty() {
            return Vec::new();
        }

        debug!("Loading page {page}: {} sessions", page_files.len());

        let mut js: JoinSet<(usize, SessionInfo)> = JoinSet::new();
        for (idx, file) in page_files.iter().cloned().enumerate() {
            let engine = Arc::clone(&self.engine);
            js.spawn_blocking(move || {
                let info = match inspect_session(&file, &engine) {
                    Ok(info) => info,
                    Err(e) => {
                        warn!("Failed to load session {}: {e}", file.id);
                        SessionInfo::placeholder(&file, e.to_string())
                    }
                };
                (idx, info)
            });
        }

        let mut slots: Vec<Option<SessionInfo>> = vec![None; page_files.len()];
        let deadline = self.deadline.map(|d| tokio::time::Instant::now() + d);
        loop {
            let next = match deadline {
                Some(at) => {
                    let joined = tokio::time::timeout_at(at, js.join_next()).await;
                    match joined {
                        Ok(next) => next,
                        Err(_) => {
                            warn!("Page {page} deadline reached; {} sessions still loading", js.len());
                            js.abort_all();
                            break;
                        }
                    }
                }
                None => js.join_next().await,
            };
            match next {
                Some(Ok((idx, info))) => slots[idx] = Some(info),
                Some(Err(e)) => warn!("Session worker failed: {e}"),
                None => break,
            }
        }

        slots
            .into_iter()
            .zip(page_files)
            .map(|(slot, file)| {
                slot.unwrap_or_else(|| SessionInfo::placeholder(file, "session did not finish loading"))
            })
            .collect()
    }
}
