//! Command-line front end for transcript compression.
//!
//! # Examples
//!
//! ```sh
//! # Newest sessions, three per page
//! ccdrc list
//!
//! # Details and a preview of one session (id, id prefix, or path)
//! ccdrc info 0a1b2c3d
//!
//! # Compress into the default 25k + 75k token budget
//! ccdrc compress 0a1b2c3d -o context.md
//!
//! # Sessions under 100k tokens are left alone unless forced
//! ccdrc compress 0a1b2c3d --force
//!
//! # Count tokens of a file or stdin
//! ccdrc count notes.md
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ccdrc::compress::{Budget, CompressionEngine};
use ccdrc::logging::init_logging;
use ccdrc::session::{
    self, Recommendation, SessionFile, SessionInfo, SessionLoader, default_sessions_root,
};
use ccdrc::transcript::load_transcript;
use ccdrc::{CompressConfig, Encoder};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tracing::debug;

/// Compress long coding-assistant transcripts into a token budget.
#[derive(Parser)]
#[command(name = "ccdrc", version)]
struct Cli {
    /// Token counter: auto, o200k, cl100k, or estimate.
    #[arg(long, global = true, default_value = "auto")]
    encoder: Encoder,

    /// Sessions directory (defaults to ~/.claude/projects).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Log debug output to stderr. RUST_LOG takes precedence.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List sessions, newest first.
    List {
        /// Page to show, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Sessions per page.
        #[arg(long, default_value_t = session::DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Seconds to wait for a page before showing placeholders.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Show details and a preview of one session.
    Info {
        /// Session id, unique id prefix, or transcript path.
        session: String,

        /// Records previewed from each end.
        #[arg(long, default_value_t = 3)]
        preview: usize,
    },

    /// Compress a session into a Markdown summary.
    Compress {
        /// Session id, unique id prefix, or transcript path.
        session: String,

        /// Token budget for the opening of the session.
        #[arg(long, default_value_t = ccdrc::config::DEFAULT_FRONT_TOKENS)]
        front: usize,

        /// Token budget for the most recent records.
        #[arg(long, default_value_t = ccdrc::config::DEFAULT_BACK_TOKENS)]
        back: usize,

        /// Write the summary here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the summary and stats as JSON.
        #[arg(long)]
        json: bool,

        /// Compress even when the session is small enough to resume as is.
        #[arg(long)]
        force: bool,
    },

    /// Count tokens in a file, or stdin when no file is given.
    Count {
        file: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start the async runtime: {e}");
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(run(cli));
    // Workers abandoned at a page deadline may still be blocked reading a
    // transcript; do not wait for them.
    runtime.shutdown_background();

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = CompressConfig::default().with_encoder(cli.encoder);
    let engine = Arc::new(CompressionEngine::new(config));
    debug!("Using {} token counts", engine.estimator().encoder_name());

    match cli.command {
        Command::List {
            page,
            page_size,
            timeout,
        } => {
            let loader = SessionLoader::new(Arc::clone(&engine))
                .with_page_size(page_size)
                .with_deadline(Duration::from_secs(timeout));
            run_list(cli.root, &loader, page, engine.config()).await
        }
        Command::Info { session, preview } => run_info(cli.root, &session, preview, &engine),
        Command::Compress {
            session,
            front,
            back,
            output,
            json,
            force,
        } => run_compress(
            cli.root,
            &session,
            CompressOptions {
                budget: Budget::new(front, back),
                output,
                json,
                force,
            },
            &engine,
        ),
        Command::Count { file } => run_count(file.as_deref(), &engine),
    }
}

// ── Commands ──────────────────────────────────────────────────────

fn sessions_root(root: Option<PathBuf>) -> Result<PathBuf, String> {
    root.or_else(default_sessions_root)
        .ok_or_else(|| "cannot determine home directory; pass --root".to_string())
}

fn resolve_session(root: Option<PathBuf>, query: &str) -> Result<SessionFile, String> {
    let root = sessions_root(root)?;
    session::find_session(&root, query).map_err(|e| e.to_string())
}

async fn run_list(
    root: Option<PathBuf>,
    loader: &SessionLoader,
    page: usize,
    config: &CompressConfig,
) -> Result<(), String> {
    let root = sessions_root(root)?;
    let files = session::discover_sessions(&root).map_err(|e| e.to_string())?;
    if files.is_empty() {
        println!("No sessions found under {}", root.display());
        return Ok(());
    }

    let pages = loader.page_count(files.len());
    let page = page.clamp(1, pages);
    let infos = loader.load_page(&files, page - 1).await;

    let first = (page - 1) * loader.page_size() + 1;
    println!(
        "Sessions {}-{} of {} (page {page}/{pages})\n",
        first,
        first + infos.len() - 1,
        files.len()
    );

    for (offset, info) in infos.iter().enumerate() {
        print_session(first + offset, info, config);
    }
    Ok(())
}

fn print_session(number: usize, info: &SessionInfo, config: &CompressConfig) {
    let modified = info
        .file
        .as_ref()
        .map(|f| DateTime::<Local>::from(f.modified).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();

    println!("[{number}] {modified}  {}  {}", info.project, info.id);

    if let Some(error) = &info.error {
        println!("    (could not load: {error})\n");
        return;
    }

    let mut facts = vec![
        format!("{} records", info.record_count),
        format!("~{} tokens", group_thousands(info.tokens)),
    ];
    if let Some(branch) = &info.git_branch {
        facts.push(format!("branch {branch}"));
    }
    if let Some(duration) = &info.duration {
        facts.push(duration.clone());
    }
    println!("    {}", facts.join(", "));

    let recommendation = info.recommendation(config);
    if info.exceeds_context(config) {
        println!(
            "    {recommendation} (exceeds the {} token context)",
            group_thousands(config.context_limit)
        );
    } else if recommendation != Recommendation::Resume {
        println!("    {recommendation}");
    }

    for summary in &info.summaries {
        println!("    Summary: {summary}");
    }
    for highlight in &info.highlights {
        println!("    > {highlight}");
    }
    println!();
}

fn run_info(
    root: Option<PathBuf>,
    query: &str,
    preview_count: usize,
    engine: &CompressionEngine,
) -> Result<(), String> {
    let file = resolve_session(root, query)?;
    let records = load_transcript(&file.path).map_err(|e| e.to_string())?;
    let info = session::describe_records(&file, &records, engine);

    print_session(1, &info, engine.config());

    let preview = session::preview(&records, preview_count, engine.extractor());
    for line in &preview.head {
        println!("  #{} {}: {}", line.position, line.speaker, line.text);
    }
    if preview.skipped > 0 {
        println!("  ... {} records ...", preview.skipped);
    }
    for line in &preview.tail {
        println!("  #{} {}: {}", line.position, line.speaker, line.text);
    }
    Ok(())
}

struct CompressOptions {
    budget: Budget,
    output: Option<PathBuf>,
    json: bool,
    force: bool,
}

fn run_compress(
    root: Option<PathBuf>,
    query: &str,
    options: CompressOptions,
    engine: &CompressionEngine,
) -> Result<(), String> {
    let file = resolve_session(root, query)?;
    let records = load_transcript(&file.path).map_err(|e| e.to_string())?;
    if records.is_empty() {
        return Err(format!("no messages found in {}", file.path.display()));
    }

    let config = engine.config();
    let tokens = engine.footprint(&records);
    if !options.force && !config.needs_compression(tokens) {
        eprintln!(
            "Session {} has ~{} tokens, under the {} token threshold; resume it directly \
             or pass --force to compress anyway.",
            file.id,
            group_thousands(tokens),
            group_thousands(config.compress_threshold)
        );
        return Ok(());
    }

    let compressed = engine.compress_with_budget(&records, options.budget);
    let rendered = if options.json {
        serde_json::to_string_pretty(&compressed).map_err(|e| e.to_string())?
    } else {
        compressed.summary.clone()
    };

    match options.output.as_deref() {
        Some(path) => {
            std::fs::write(path, &rendered)
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{rendered}"),
    }

    let stats = &compressed.stats;
    eprintln!(
        "Kept {}/{} records, ~{} of {} tokens ({:.1}% removed, {})",
        stats.extracted_records,
        stats.total_records,
        group_thousands(stats.extracted_tokens),
        group_thousands(stats.total_tokens),
        stats.compression_ratio * 100.0,
        compressed.encoder,
    );
    Ok(())
}

fn run_count(file: Option<&Path>, engine: &CompressionEngine) -> Result<(), String> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            buf
        }
    };
    println!(
        "{} tokens ({})",
        engine.count_tokens(&text),
        engine.estimator().encoder_name()
    );
    Ok(())
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
