use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use mmcorpus::corpus::ingest::{build_corpus, merge_corpora, IngestOptions};
use mmcorpus::index::{index_file_path, stats};
use mmcorpus::utils::{get_config_path, AppConfig};
use mmcorpus::{with_element, BuilderConfig, CorpusStore, DType, Element, IndexReader, Span, StoreOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mmcorpus")]
#[command(about = "Memory-mapped chunked token corpus store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a corpus from a JSON-lines file of token arrays
    Build {
        /// Input file, one JSON array per line
        input: PathBuf,

        /// Output prefix (writes <prefix>.bin and <prefix>.idx)
        prefix: PathBuf,

        /// Element type
        #[arg(long)]
        dtype: Option<DType>,

        /// Elements per chunk
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Padding value
        #[arg(long, allow_hyphen_values = true)]
        pad_id: Option<i64>,

        /// Reserve one neighbor chunk after every document
        #[arg(long)]
        retrieval_db: bool,

        /// Hide progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Merge finalized corpora, in order, into a new one
    Merge {
        /// Output prefix
        output: PathBuf,

        /// Shard prefixes
        #[arg(required = true)]
        shards: Vec<PathBuf>,

        /// Hide progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Show corpus statistics
    Stats {
        prefix: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print (part of) a document as a JSON array
    Get {
        prefix: PathBuf,

        /// Document id
        doc: usize,

        /// First element
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Number of elements (defaults to the rest of the document)
        #[arg(long)]
        length: Option<usize>,
    },
    /// Print a contiguous span of documents (start:stop)
    Range { prefix: PathBuf, span: Span },
    /// Print one chunk as a JSON array
    Chunk {
        prefix: PathBuf,

        /// Chunk id
        id: u64,

        /// Leave out the reserved neighbor block in retrieval-db corpora
        #[arg(long)]
        no_padding: bool,
    },
    /// Print a contiguous span of chunks (start:stop)
    Chunks {
        prefix: PathBuf,
        span: Span,

        /// Leave out the reserved neighbor block in retrieval-db corpora
        #[arg(long)]
        no_padding: bool,
    },
    /// Check the index against the data file
    Verify { prefix: PathBuf },
    /// Exit successfully if both corpus files exist
    Exists { prefix: PathBuf },
    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the user config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build {
            input,
            prefix,
            dtype,
            chunk_size,
            pad_id,
            retrieval_db,
            quiet,
        } => {
            let dtype = dtype.unwrap_or(config.dtype);
            let chunk_size = chunk_size.unwrap_or(config.chunk_size);
            let pad_id = pad_id.unwrap_or(config.pad_id);
            let options = IngestOptions {
                batch_size: config.ingest_batch_size,
                quiet,
            };
            let retrieval_db = retrieval_db || config.retrieval_db;

            let summary = with_element!(dtype, T => {
                let builder_config = BuilderConfig {
                    chunk_size,
                    pad_id: pad_value::<T>(pad_id)?,
                    retrieval_db,
                };
                build_corpus::<T>(&input, &prefix, builder_config, &options)?
            });

            if !quiet {
                println!(
                    "Built {} ({} documents, {} chunks, {} data bytes)",
                    prefix.display(),
                    summary.header.num_documents,
                    summary.header.num_chunks,
                    summary.data_bytes
                );
            }
        }
        Commands::Merge {
            output,
            shards,
            quiet,
        } => {
            let first = shards.first().context("No shards to merge")?;
            let dtype = IndexReader::open(&index_file_path(first))
                .with_context(|| format!("Failed to open shard {}", first.display()))?
                .dtype();
            let shard_refs: Vec<&Path> = shards.iter().map(PathBuf::as_path).collect();

            let summary = with_element!(dtype, T => merge_corpora::<T>(&output, &shard_refs, quiet)?);

            if !quiet {
                println!(
                    "Merged {} shards into {} ({} documents)",
                    shards.len(),
                    output.display(),
                    summary.header.num_documents
                );
            }
        }
        Commands::Stats { prefix, json } => {
            stats::show_stats(&prefix, json)?;
        }
        Commands::Get {
            prefix,
            doc,
            offset,
            length,
        } => {
            let store = open_store(&prefix, &config)?;
            with_element!(store.dtype(), T => print_json(store.get::<T>(doc, offset, length)?)?);
        }
        Commands::Range { prefix, span } => {
            let store = open_store(&prefix, &config)?;
            with_element!(store.dtype(), T => print_json(&store.get_range::<T>(span)?)?);
        }
        Commands::Chunk {
            prefix,
            id,
            no_padding,
        } => {
            let store = open_store(&prefix, &config)?;
            with_element!(store.dtype(), T => {
                let bytes = store.chunk_bytes(id, no_padding)?;
                let chunk: &[T] = bytemuck::try_cast_slice(bytes)
                    .map_err(|e| anyhow!("chunk {} is not a whole {} slice: {:?}", id, T::DTYPE, e))?;
                print_json(chunk)?
            });
        }
        Commands::Chunks {
            prefix,
            span,
            no_padding,
        } => {
            let store = open_store(&prefix, &config)?;
            with_element!(store.dtype(), T => print_json(&store.chunk_range::<T>(span, no_padding)?)?);
        }
        Commands::Verify { prefix } => {
            let store = open_store(&prefix, &config)?;
            let report = store.verify()?;
            println!(
                "OK: {} documents, {} chunks, {} elements",
                report.documents, report.chunks, report.elements
            );
        }
        Commands::Exists { prefix } => {
            if !CorpusStore::exists(&prefix) {
                println!("missing: {}", prefix.display());
                return Ok(ExitCode::FAILURE);
            }
            println!("exists: {}", prefix.display());
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = cli
                    .config
                    .or_else(get_config_path)
                    .context("No config directory on this platform")?;
                config.save_to(&path)?;
                println!("Saved to {}", path.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_store(prefix: &Path, config: &AppConfig) -> Result<CorpusStore> {
    let options = StoreOptions {
        skip_warmup: config.skip_warmup,
        cache_capacity: config.cache_capacity,
    };
    CorpusStore::open_with(prefix, options)
        .with_context(|| format!("Failed to open corpus {}", prefix.display()))
}

fn pad_value<T: Element>(pad_id: i64) -> Result<T> {
    T::from_i64(pad_id).ok_or_else(|| anyhow!("pad id {} does not fit in {}", pad_id, T::DTYPE))
}

fn print_json<S: serde::Serialize + ?Sized>(value: &S) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
