use crate::corpus::builder::{BuilderConfig, CorpusBuilder, FinalizeSummary};
use crate::index::reader::IndexReader;
use crate::index::types::{data_file_path, index_file_path, Element};
use crate::utils::progress::{byte_bar, spinner};
use anyhow::{Context, Result};
use bytemuck::Zeroable;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Settings for [`build_corpus`]
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Lines parsed per parallel batch
    pub batch_size: usize,
    /// Hide progress output
    pub quiet: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 4096,
            quiet: false,
        }
    }
}

/// Parse one input line: a JSON array of tokens. Blank lines yield `None`.
fn parse_line<T: Element>(line: &str, line_no: usize) -> Result<Option<Vec<T>>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let tokens = serde_json::from_str::<Vec<T>>(trimmed)
        .with_context(|| format!("Invalid token array on line {}", line_no))?;
    Ok(Some(tokens))
}

/// Build `<prefix>.bin`/`<prefix>.idx` from a JSON-lines file of token arrays.
///
/// Lines are parsed in parallel one batch at a time and appended in input order.
pub fn build_corpus<T: Element>(
    input: &Path,
    prefix: &Path,
    config: BuilderConfig<T>,
    options: &IngestOptions,
) -> Result<FinalizeSummary> {
    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let total_bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut reader = BufReader::with_capacity(1 << 20, file);

    let mut builder = CorpusBuilder::new(&data_file_path(prefix), config)?;
    let progress = byte_bar(total_bytes, "Reading documents...", options.quiet);

    let batch_size = options.batch_size.max(1);
    let mut batch: Vec<(usize, String)> = Vec::with_capacity(batch_size);
    let mut line_no = 0usize;

    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        if read > 0 {
            line_no += 1;
            progress.inc(read as u64);
            batch.push((line_no, line));
        }

        if batch.len() >= batch_size || (read == 0 && !batch.is_empty()) {
            let parsed: Vec<Option<Vec<T>>> = batch
                .par_iter()
                .map(|(no, line)| parse_line::<T>(line, *no))
                .collect::<Result<_>>()?;
            for tokens in parsed.into_iter().flatten() {
                builder.add_item(&tokens)?;
            }
            batch.clear();
        }

        if read == 0 {
            break;
        }
    }

    progress.finish_with_message(format!("Read {} documents", builder.len()));

    let finalize_spinner = spinner("Writing index...", options.quiet);
    let summary = builder.finalize(&index_file_path(prefix))?;
    finalize_spinner.finish_with_message("Index complete");

    Ok(summary)
}

/// Merge finalized shards, in order, into a new corpus at `output`.
///
/// Chunk size and mode are taken from the first shard; every other shard
/// must match them and the element type.
pub fn merge_corpora<T: Element>(output: &Path, shards: &[&Path], quiet: bool) -> Result<FinalizeSummary> {
    let first = shards.first().context("No shards to merge")?;
    let index = IndexReader::open(&index_file_path(first))
        .with_context(|| format!("Failed to open shard {}", first.display()))?;

    let config = BuilderConfig {
        chunk_size: index.chunk_size(),
        pad_id: <T as Zeroable>::zeroed(),
        retrieval_db: index.retrieval_db(),
    };
    drop(index);

    let mut builder = CorpusBuilder::<T>::new(&data_file_path(output), config)?;
    let progress = spinner("Merging shards...", quiet);
    for shard in shards {
        progress.set_message(format!("Merging {}", shard.display()));
        builder
            .merge_file(shard)
            .with_context(|| format!("Failed to merge shard {}", shard.display()))?;
    }
    progress.finish_with_message(format!("Merged {} shards", shards.len()));

    Ok(builder.finalize(&index_file_path(output))?)
}
