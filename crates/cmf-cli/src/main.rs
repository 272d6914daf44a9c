//! cmf: chunked-content manifest CLI
//!
//! Commands:
//!   put <file>        - chunk a file into the store and print its manifest id
//!   cat <id>          - stream a manifest's content to stdout or a file
//!   show <id>         - print a manifest's header and chunk list
//!   config show       - display the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use cmf_chunks::{chunk_file, chunk_ids, ChunkSizes};
use cmf_core::config::CmfConfig;
use cmf_core::{ObjectId, ObjectKind};
use cmf_manifest::{load_manifest, CrlfToLf, Header, ManifestArena, ManifestBuilder, ManifestStream};
use cmf_store::{FsStore, ObjectStore, StoreError};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cmf",
    version,
    about = "Chunked-content manifest store",
    long_about = "cmf: store large files as content-defined chunks plus a manifest, and stream them back"
)]
struct Cli {
    /// Path to cmf.toml configuration file
    #[arg(long, short = 'c', env = "CMF_CONFIG", default_value = "cmf.toml")]
    config: PathBuf,

    /// Object store root (overrides store.path)
    #[arg(long, env = "CMF_STORE", global = true)]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides log.level
    #[arg(long, env = "CMF_LOG", global = true)]
    log: Option<String>,

    /// Log format; overrides log.format
    #[arg(long, env = "CMF_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk a file, store the chunks and a manifest, print the manifest id
    Put {
        /// File to store
        file: PathBuf,
        /// Only compute the manifest id; write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Stream the object a manifest describes
    Cat {
        /// Manifest id (hex)
        id: String,
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Convert CRLF line endings to LF while streaming
        #[arg(long)]
        crlf_to_lf: bool,
    },

    /// Print a manifest's header and chunk list
    Show {
        /// Manifest id (hex)
        id: String,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CmfConfig::load(&cli.config)?;
    if let Some(store) = &cli.store {
        config.store.path = store.clone();
    }

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, format);

    if !cli.config.exists() {
        warn!(path = %cli.config.display(), "config file not found (using defaults)");
    }
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        store = %config.store.path.display(),
        "cmf starting"
    );

    match cli.command {
        Commands::Put { file, dry_run } => cmd_put(&config, &file, dry_run),
        Commands::Cat {
            id,
            output,
            crlf_to_lf,
        } => cmd_cat(&config, &id, output.as_deref(), crlf_to_lf),
        Commands::Show { id, json } => cmd_show(&config, &id, json),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

/// Install the tracing subscriber. Logs go to stderr so stdout stays clean
/// for object data and ids.
fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn open_store(config: &CmfConfig) -> Result<FsStore> {
    FsStore::from_config(&config.store)
        .with_context(|| format!("opening object store at {}", config.store.path.display()))
}

fn parse_id(config: &CmfConfig, hex_id: &str) -> Result<ObjectId> {
    ObjectId::from_hex(config.store.hash_algo, hex_id.trim())
        .with_context(|| format!("'{hex_id}' is not a {} object id", config.store.hash_algo))
}

fn chunk_sizes(config: &CmfConfig, path: &Path) -> Result<ChunkSizes> {
    match config.chunking.sizes() {
        Some((min, avg, max)) => ChunkSizes::new(min, avg, max).context("chunking config"),
        None => Ok(ChunkSizes::for_path(path)),
    }
}

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── `cmf put` ─────────────────────────────────────────────────────────────────

fn cmd_put(config: &CmfConfig, file: &Path, dry_run: bool) -> Result<()> {
    let algo = config.store.hash_algo;
    let sizes = chunk_sizes(config, file)?;
    let builder = ManifestBuilder::from_config(&config.manifest).context("manifest config")?;

    let (chunks, data) = chunk_file(file, sizes)?;
    let total = data.len() as u64;

    if dry_run {
        let ids = chunk_ids(algo, &data, &chunks);
        let id = builder.hash_only(algo, total, &ids)?;
        info!(%id, chunks = ids.len(), bytes = total, "dry run: nothing written");
        println!("{id}");
        return Ok(());
    }

    let store = open_store(config)?;
    let pb = make_progress_bar(chunks.len() as u64, "put");
    pb.set_message(file.display().to_string());

    let ids = chunks
        .par_iter()
        .map(|c| -> Result<ObjectId, StoreError> {
            let id = store.write_object(c.slice(&data), ObjectKind::Blob)?;
            pb.inc(1);
            Ok(id)
        })
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("storing chunks of {}", file.display()))?;
    pb.finish_and_clear();

    let id = builder
        .write(&store, total, &ids)
        .with_context(|| format!("writing manifest for {}", file.display()))?;

    info!(%id, chunks = ids.len(), bytes = total, "stored");
    eprintln!("  chunks:  {}", ids.len());
    eprintln!("  bytes:   {}", fmt_bytes(total));
    println!("{id}");
    Ok(())
}

// ── `cmf cat` ─────────────────────────────────────────────────────────────────

fn cmd_cat(config: &CmfConfig, hex_id: &str, output: Option<&Path>, crlf_to_lf: bool) -> Result<()> {
    let store = open_store(config)?;
    let id = parse_id(config, hex_id)?;
    let mut stream = ManifestStream::open_with(&store, id, config.manifest.lenient_entries)
        .with_context(|| format!("opening manifest {id}"))?;

    let mut sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let written = if crlf_to_lf {
        stream.copy_filtered(&mut CrlfToLf::new(), &mut sink)
    } else {
        stream.copy_to(&mut sink)
    }
    .with_context(|| format!("streaming manifest {id}"))?;
    sink.flush().context("flushing output")?;

    if written != stream.total_size() && !crlf_to_lf {
        warn!(%id, declared = stream.total_size(), written, "manifest size differs from content");
    }
    debug!(%id, written, "cat finished");
    stream.close();
    Ok(())
}

// ── `cmf show` ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChunkInfo {
    id: ObjectId,
    /// Stored size, `None` if the chunk is missing
    size: Option<u64>,
}

#[derive(Serialize)]
struct ShowOutput<'a> {
    id: ObjectId,
    #[serde(flatten)]
    header: &'a Header,
    chunks: Vec<ChunkInfo>,
}

fn cmd_show(config: &CmfConfig, hex_id: &str, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let id = parse_id(config, hex_id)?;

    let mut dir = ManifestArena::new();
    let handle = load_manifest(&store, &mut dir, id).with_context(|| format!("loading manifest {id}"))?;
    let record = dir.record(handle).context("manifest record missing after load")?;
    let header = record.header().context("manifest header missing after load")?;
    let refs = record
        .chunk_refs()
        .context("manifest buffer missing after load")?
        .lenient(config.manifest.lenient_entries);

    let chunks = refs
        .map(|entry| -> Result<ChunkInfo, cmf_manifest::FormatError> {
            let chunk = entry?;
            let size = store.type_and_size(&chunk).ok().map(|(_, size)| size);
            Ok(ChunkInfo { id: chunk, size })
        })
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("walking manifest {id}"))?;

    if json {
        let out = ShowOutput { id, header, chunks };
        println!("{}", serde_json::to_string_pretty(&out).context("serializing manifest")?);
        return Ok(());
    }

    println!("manifest: {id}");
    println!("  version: {}", header.version);
    println!("  size:    {} ({})", header.total_size, fmt_bytes(header.total_size));
    println!("  chunks:  {} declared, {} listed", header.chunk_count, chunks.len());
    for chunk in &chunks {
        match chunk.size {
            Some(size) => println!("  {}  {}", chunk.id, fmt_bytes(size)),
            None => println!("  {}  (missing)", chunk.id),
        }
    }
    Ok(())
}

// ── `cmf config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &CmfConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
