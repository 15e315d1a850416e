//! Handlers behind each `nsm` subcommand.

use anyhow::{bail, Context, Result};
use clap::Args;
use nsm::format;
use nsm::{ContainerBuilder, NsmConfig, Retriever, StorageLayout, TokenQuota, UnlimitedQuota};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Extensions picked up when compressing a directory.
const TEXT_EXTENSIONS: [&str; 7] = ["txt", "md", "py", "js", "html", "json", "log"];

pub fn load_config(path: Option<&Path>) -> Result<NsmConfig> {
    let config = match path {
        Some(path) => {
            dotenv::dotenv().ok();
            NsmConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?
                .with_env()?
        }
        None => NsmConfig::from_env()?,
    };
    Ok(config)
}

// ------------------------------------------------------------------
// 1. compress
// ------------------------------------------------------------------

#[derive(Args)]
pub struct CompressArgs {
    /// File or directory to compress
    pub input: PathBuf,
    /// Output container (defaults to <input>.nsm)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// License key; the build must fit within `build.license_tokens` (one token per started GiB)
    #[arg(long)]
    pub license: Option<String>,
    /// Store chunk text in frames of N chunks instead of inline
    #[arg(long, value_name = "N")]
    pub frames: Option<usize>,
    /// Also write a <output>.idx side index
    #[arg(long)]
    pub side_index: bool,
}

pub fn compress(args: CompressArgs, config: &NsmConfig) -> Result<()> {
    if !args.input.exists() {
        bail!("{} does not exist", args.input.display());
    }
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("nsm"));

    let mut builder = ContainerBuilder::new(config)?;
    if let Some(chunks_per_frame) = args.frames {
        builder = builder.with_layout(StorageLayout::Frames { chunks_per_frame });
    }
    if args.side_index {
        builder = builder.with_side_index(true);
    }
    if let Some(key) = &args.license {
        builder = builder.with_license(key);
    }

    let files = collect_files(&args.input);
    for file in &files {
        match builder.add_file(file) {
            Ok(ids) => info!(file = %file.display(), chunks = ids.len(), "added"),
            Err(err) => warn!(file = %file.display(), error = %err, "skipped"),
        }
    }
    if builder.store().is_empty() {
        bail!("no readable text found in {}", args.input.display());
    }

    let report = match args.license {
        Some(_) => builder.build(&output, &TokenQuota::new(config.build.license_tokens)),
        None => builder.build(&output, &UnlimitedQuota),
    }
    .with_context(|| format!("building {}", output.display()))?;

    println!("Created {}", report.path.display());
    println!("  files:       {}", files.len());
    println!("  chunks:      {}", report.chunks);
    if report.frames > 0 {
        println!("  frames:      {}", report.frames);
    }
    println!("  compression: {} ({:.1}% saved)", report.compression, (1.0 - report.ratio) * 100.0);
    println!("  size:        {:.1} KB", report.compressed_size as f64 / 1024.0);
    if let Some(side) = &report.side_index {
        println!("  side index:  {}", side.display());
    }
    Ok(())
}

/// The file itself, or every text file below a directory, in path order.
fn collect_files(input: &Path) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "cannot read directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let text = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if !text {
                warn!(file = %path.display(), "skipped: not a text file");
            }
            text
        })
        .collect();
    files.sort();
    files
}

// ------------------------------------------------------------------
// 2. search
// ------------------------------------------------------------------

#[derive(Args)]
pub struct SearchArgs {
    pub container: PathBuf,
    pub query: String,
    /// Number of results (defaults to `retrieval.top_k`)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
    /// Minimum similarity score
    #[arg(short, long, default_value_t = 0.5)]
    pub threshold: f32,
}

pub fn search(args: SearchArgs, config: &NsmConfig) -> Result<()> {
    let retriever = open(&args.container, config)?;
    let top_k = args.top_k.unwrap_or(config.retrieval.top_k);
    let hits = retriever.search_with_scores(&args.query, top_k, args.threshold);

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    println!("Results for '{}':\n", args.query);
    for hit in hits {
        println!("#{} [{:.3}] {} (chunk {})", hit.rank + 1, hit.score, hit.source, hit.id);
        println!("   {}", preview(&hit.text, 200));
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

// ------------------------------------------------------------------
// 3. extract
// ------------------------------------------------------------------

#[derive(Args)]
pub struct ExtractArgs {
    pub container: PathBuf,
    /// Destination directory (defaults to <container>_extracted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn extract(args: ExtractArgs, config: &NsmConfig) -> Result<()> {
    let retriever = open(&args.container, config)?;
    let dir = args.output.unwrap_or_else(|| {
        let stem = args
            .container
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "nsm".to_string());
        args.container.with_file_name(format!("{stem}_extracted"))
    });

    let written = retriever
        .extract_all(&dir)
        .with_context(|| format!("extracting into {}", dir.display()))?;
    println!("Extracted {} chunks into {}", written.len(), dir.display());
    Ok(())
}

// ------------------------------------------------------------------
// 4. info
// ------------------------------------------------------------------

#[derive(Args)]
pub struct InfoArgs {
    pub container: PathBuf,
}

pub fn info(args: InfoArgs) -> Result<()> {
    let container = format::read(&args.container)
        .with_context(|| format!("{} is not a valid container", args.container.display()))?;
    let meta = &container.metadata;

    println!("Container:   {}", args.container.display());
    println!("Version:     {}", container.header.version);
    println!("Created:     {}", meta.created_at.to_rfc3339());
    println!("Id:          {}", meta.container_id);
    println!("Data size:   {} bytes", container.header.payload_size);
    println!("Entries:     {}", meta.chunk_count);
    println!("Storage:     {}", meta.storage.as_str());
    println!("Algorithm:   {}", meta.compression);
    println!("Ratio:       {:.3}", meta.compression_ratio);
    println!("Model:       {} ({} dims)", meta.embedding_model, container.index.embedding_dim);
    if let Some(hash) = &meta.license_hash {
        println!("License:     {hash}");
    }
    for (key, value) in &meta.extra {
        println!("{key}: {value}");
    }
    Ok(())
}

fn open(path: &Path, config: &NsmConfig) -> Result<Retriever> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    Retriever::open(path, &config.retrieval).with_context(|| format!("opening {}", path.display()))
}
