//! Finding transcript files on disk.
//!
//! Sessions live under `~/.claude/projects/<project>/<uuid>.jsonl`. Only
//! files named by a session UUID and larger than [`MIN_SESSION_BYTES`] are
//! listed; smaller files are stubs left by sessions that never got going.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;
use tracing::{debug, trace};

use crate::transcript::TranscriptError;

/// Files at or below this size are not listed.
pub const MIN_SESSION_BYTES: u64 = 1024;

static SESSION_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\.jsonl$")
        .expect("session file pattern is valid")
});

/// A transcript file and the facts the file system knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub path: PathBuf,
    /// File stem; the session UUID for discovered files.
    pub id: String,
    /// Name of the directory holding the file.
    pub project: String,
    pub size: u64,
    pub modified: SystemTime,
}

impl SessionFile {
    /// Stat `path` and describe it. Any readable file is accepted.
    pub fn from_path(path: &Path) -> Result<Self, TranscriptError> {
        let meta = std::fs::metadata(path).map_err(|source| TranscriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::with_metadata(path, &meta))
    }

    fn with_metadata(path: &Path, meta: &std::fs::Metadata) -> Self {
        let name_of = |p: Option<&std::ffi::OsStr>| {
            p.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
        };
        Self {
            path: path.to_path_buf(),
            id: name_of(path.file_stem()),
            project: name_of(path.parent().and_then(Path::file_name)),
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
}

/// Default sessions root: `~/.claude/projects`.
pub fn default_sessions_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects"))
}

/// Whether `name` looks like a session transcript file name.
pub fn is_session_file_name(name: &str) -> bool {
    SESSION_FILE_NAME.is_match(name)
}

/// List session files under `root`, newest first. A missing root yields an
/// empty list; unreadable project directories are skipped.
pub fn discover_sessions(root: &Path) -> Result<Vec<SessionFile>, TranscriptError> {
    if !root.is_dir() {
        debug!("Sessions root {} does not exist", root.display());
        return Ok(Vec::new());
    }

    let projects = std::fs::read_dir(root).map_err(|source| TranscriptError::Scan {
        path: root.to_path_buf(),
        source,
    })?;

    let mut sessions = Vec::new();
    for project in projects.flatten() {
        let project_dir = project.path();
        if !project_dir.is_dir() {
            continue;
        }
        let entries = match std::fs::read_dir(&project_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping {}: {e}", project_dir.display());
                continue;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !is_session_file_name(&name.to_string_lossy()) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() || meta.len() <= MIN_SESSION_BYTES {
                trace!("Skipping small session file {}", entry.path().display());
                continue;
            }
            sessions.push(SessionFile::with_metadata(&entry.path(), &meta));
        }
    }

    sessions.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
    debug!("Discovered {} sessions under {}", sessions.len(), root.display());
    Ok(sessions)
}

/// Resolve `query` to a session: an existing file path, a full session id,
/// or a unique id prefix under `root`.
pub fn find_session(root: &Path, query: &str) -> Result<SessionFile, TranscriptError> {
    let as_path = Path::new(query);
    if as_path.is_file() {
        return SessionFile::from_path(as_path);
    }

    let query = query.strip_suffix(".jsonl").unwrap_or(query);
    let sessions = discover_sessions(root)?;
    if let Some(exact) = sessions.iter().find(|s| s.id == query) {
        return Ok(exact.clone());
    }

    let mut matches = sessions.into_iter().filter(|s| s.id.starts_with(query));
    match (matches.next(), matches.count()) {
        (Some(found), 0) => Ok(found),
        (Some(_), rest) => Err(TranscriptError::AmbiguousSession {
            query: query.to_string(),
            count: rest + 1,
        }),
        (None, _) => Err(TranscriptError::SessionNotFound(query.to_string())),
    }
}
