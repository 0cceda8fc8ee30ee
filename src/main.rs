use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use texture_cache_viewer::decode::{load_full_image, Jpeg2000Backend};
#[cfg(not(feature = "openjpeg"))]
use texture_cache_viewer::decode::{ByteStream, DecodeSession};
#[cfg(not(feature = "openjpeg"))]
use texture_cache_viewer::error::DecodeResult;
use texture_cache_viewer::{
    stream_entries, Cache, CacheEntry, Config, ThumbnailDecoder, ThumbnailPool,
};

#[derive(Parser)]
#[command(name = "texture-cache-viewer")]
#[command(version)]
#[command(about = "Browse, export and thumbnail a JPEG2000 texture cache")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Index file of the cache (overrides config file)
    #[arg(short, long, value_name = "INDEX")]
    location: Option<String>,

    /// Log level (overrides config file, RUST_LOG wins over both)
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the index file header
    Info,

    /// List cache entries
    List {
        /// Include entries stored entirely inline
        #[arg(long)]
        all: bool,

        /// Print one JSON array instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Decode thumbnails of listed entries into a directory as PNG
    Thumbnails {
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,

        /// Cap on the longer side of each thumbnail
        #[arg(short, long)]
        max_dimension: Option<u32>,

        /// Concurrent decodes (0 = one per CPU)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Include entries stored entirely inline
        #[arg(long)]
        all: bool,
    },

    /// Write the raw encoded codestream of one entry
    Export {
        id: Uuid,

        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Decode one entry at full resolution into a PNG
    Render {
        id: Uuid,

        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },
}

/// One row of `list --json`
#[derive(Serialize)]
struct EntryRow {
    index: u32,
    id: Uuid,
    has_image: bool,
    image_size: u64,
    body_size: u32,
    size_kib: f64,
    captured_at: Option<DateTime<Utc>>,
}

impl From<&CacheEntry> for EntryRow {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            index: entry.index(),
            id: entry.id(),
            has_image: entry.has_image(),
            image_size: entry.image_size(),
            body_size: entry.body_size(),
            size_kib: entry.size_kib(),
            captured_at: entry.captured_at(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(location) = cli.location {
        config.cache.location = location;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cache = Cache::new(config.cache_location());
    info!(index = %cache.index_path().display(), "Using texture cache");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after current entries");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::Info => show_info(&cache),
        Command::List { all, json } => {
            list(&cache, all || config.cache.include_inline, json, cancel).await
        }
        Command::Thumbnails {
            out,
            max_dimension,
            jobs,
            all,
        } => {
            let max_dimension = max_dimension.unwrap_or(config.thumbnails.max_dimension);
            let workers = jobs.unwrap_or(config.thumbnails.workers);
            let pool = ThumbnailPool::new(decoder(), workers, max_dimension);
            let include_inline = all || config.cache.include_inline;
            thumbnails(&cache, &pool, &out, include_inline, cancel).await
        }
        Command::Export { id, out } => export(&cache, id, &out, cancel).await,
        Command::Render { id, out } => render(&cache, id, &out, cancel).await,
    }
}

#[cfg(feature = "openjpeg")]
fn decoder() -> Arc<ThumbnailDecoder<texture_cache_viewer::decode::OpenJpegBackend>> {
    Arc::new(ThumbnailDecoder::new(
        texture_cache_viewer::decode::OpenJpegBackend::new(),
    ))
}

#[cfg(not(feature = "openjpeg"))]
fn decoder() -> Arc<ThumbnailDecoder<NoEngine>> {
    Arc::new(ThumbnailDecoder::new(NoEngine))
}

/// Stand-in backend for builds without a JPEG2000 engine.
#[cfg(not(feature = "openjpeg"))]
struct NoEngine;

#[cfg(not(feature = "openjpeg"))]
impl Jpeg2000Backend for NoEngine {
    fn open(&self, _stream: ByteStream) -> DecodeResult<Box<dyn DecodeSession>> {
        Err(texture_cache_viewer::DecodeError::Setup(
            "built without the `openjpeg` feature".to_string(),
        ))
    }
}

fn show_info(cache: &Cache) -> Result<()> {
    let header = cache
        .read_header()
        .with_context(|| format!("Cannot read {}", cache.index_path().display()))?;

    println!("📦 {}", cache.index_path().display());
    println!("   Version:  {}", header.version);
    println!("   Address:  {:#010x}", header.address);
    println!("   Encoder:  {}", header.encoder);
    println!("   Entries:  {}", header.entry_count);
    Ok(())
}

/// Entries in file order, optionally skipping fully inline ones.
///
/// Enumeration errors end the listing; whatever was read before is kept.
async fn collect_entries(
    cache: &Cache,
    include_inline: bool,
    cancel: CancellationToken,
) -> (Vec<CacheEntry>, Option<texture_cache_viewer::CacheError>) {
    let mut rx = stream_entries(cache.index_path(), cancel);
    let mut entries = Vec::new();

    while let Some(result) = rx.recv().await {
        match result {
            Ok(entry) if include_inline || entry.body_size() > 0 => entries.push(entry),
            Ok(_) => {}
            Err(e) => return (entries, Some(e)),
        }
    }
    (entries, None)
}

async fn list(
    cache: &Cache,
    include_inline: bool,
    json: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let (entries, error) = collect_entries(cache, include_inline, cancel).await;

    if json {
        let rows: Vec<EntryRow> = entries.iter().map(EntryRow::from).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for entry in &entries {
            let captured = entry
                .captured_at()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            if entry.has_image() {
                println!("{}  {:>9.1} KiB  {}", entry.id(), entry.size_kib(), captured);
            } else {
                println!("{}  {:>13}  {}", entry.id(), "no image", captured);
            }
        }
        println!("{} entries", entries.len());
    }

    match error {
        Some(e) => Err(e).context("Cache enumeration stopped early"),
        None => Ok(()),
    }
}

async fn thumbnails<B>(
    cache: &Cache,
    pool: &ThumbnailPool<B>,
    out: &Path,
    include_inline: bool,
    cancel: CancellationToken,
) -> Result<()>
where
    B: Jpeg2000Backend + 'static,
{
    fs::create_dir_all(out).with_context(|| format!("Cannot create {}", out.display()))?;

    let (entries, error) = collect_entries(cache, include_inline, cancel.clone()).await;
    if let Some(e) = &error {
        warn!(error = %e, "Enumeration stopped early, thumbnailing what was read");
    }

    println!(
        "🖼️  Decoding {} thumbnails ({} workers, max {}px)",
        entries.len(),
        pool.workers(),
        pool.max_dimension()
    );

    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for outcome in pool.run(entries, cancel).await {
        let id = outcome.entry.id();
        match outcome.result {
            Ok(Some(image)) => {
                let path = out.join(format!("{}.png", id));
                match image.save_png(&path) {
                    Ok(()) => written += 1,
                    Err(e) => {
                        eprintln!("❌ {}: {}", id, e);
                        failed += 1;
                    }
                }
            }
            Ok(None) => skipped += 1,
            Err(e) => {
                eprintln!("❌ {}: {}", id, e);
                failed += 1;
            }
        }
    }

    println!(
        "✅ {} written, {} without a usable image, {} failed",
        written, skipped, failed
    );
    match error {
        Some(e) => Err(e).context("Cache enumeration stopped early"),
        None => Ok(()),
    }
}

/// Scan the cache for `id`.
async fn find_entry(cache: &Cache, id: Uuid, cancel: CancellationToken) -> Result<CacheEntry> {
    let mut rx = stream_entries(cache.index_path(), cancel);
    while let Some(result) = rx.recv().await {
        let entry = result?;
        if entry.id() == id {
            return Ok(entry);
        }
    }
    bail!("No entry {} in {}", id, cache.index_path().display())
}

async fn export(cache: &Cache, id: Uuid, out: &Path, cancel: CancellationToken) -> Result<()> {
    let entry = find_entry(cache, id, cancel).await?;
    let encoded = tokio::task::spawn_blocking(move || entry.load_encoded()).await??;

    fs::write(out, &encoded).with_context(|| format!("Cannot write {}", out.display()))?;
    println!("📦 Exported {} bytes to {}", encoded.len(), out.display());
    Ok(())
}

async fn render(cache: &Cache, id: Uuid, out: &Path, cancel: CancellationToken) -> Result<()> {
    let entry = find_entry(cache, id, cancel).await?;
    let Some(image) = load_full_image(decoder(), entry).await? else {
        bail!("Entry {} has no image", id);
    };

    image
        .save_png(out)
        .with_context(|| format!("Cannot write {}", out.display()))?;
    println!(
        "✅ Rendered {}x{} to {}",
        image.width(),
        image.height(),
        out.display()
    );
    Ok(())
}
