use crate::corpus::store::{CorpusStore, StoreOptions};
use crate::index::types::{data_file_path, index_file_path, DType};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

/// Summary of a finalized corpus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub dtype: DType,
    pub chunk_size: u64,
    pub retrieval_db: bool,
    pub num_documents: usize,
    pub num_chunks: u64,
    pub empty_documents: usize,
    pub total_elements: u64,
    pub min_size: u64,
    pub max_size: u64,
    pub mean_size: f64,
    pub index_bytes: u64,
    pub data_bytes: u64,
}

/// Gather statistics from an open store
pub fn collect_stats(store: &CorpusStore) -> CorpusStats {
    let mut total: u64 = 0;
    let mut min = u64::MAX;
    let mut max = 0;
    let mut empty = 0;

    for size in store.sizes().iter() {
        let size = size.max(0) as u64;
        total += size;
        min = min.min(size);
        max = max.max(size);
        if size == 0 {
            empty += 1;
        }
    }

    let num_documents = store.len();
    let mean = if num_documents == 0 {
        0.0
    } else {
        total as f64 / num_documents as f64
    };

    let file_len = |path: &Path| std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    CorpusStats {
        dtype: store.dtype(),
        chunk_size: store.chunk_size(),
        retrieval_db: store.retrieval_db(),
        num_documents,
        num_chunks: store.num_chunks(),
        empty_documents: empty,
        total_elements: total,
        min_size: if num_documents == 0 { 0 } else { min },
        max_size: max,
        mean_size: mean,
        index_bytes: file_len(&index_file_path(store.prefix())),
        data_bytes: file_len(&data_file_path(store.prefix())),
    }
}

/// Display corpus statistics
pub fn show_stats(prefix: &Path, json: bool) -> Result<()> {
    let store = CorpusStore::open_with(prefix, StoreOptions::default())?;
    let stats = collect_stats(&store);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Corpus Statistics");
    println!("=================");
    println!();
    println!("Prefix:           {}", prefix.display());
    println!("Element type:     {}", stats.dtype);
    println!("Chunk size:       {}", stats.chunk_size);
    println!("Retrieval db:     {}", stats.retrieval_db);
    println!("Documents:        {}", stats.num_documents);
    println!("Chunks:           {}", stats.num_chunks);
    println!("Empty documents:  {}", stats.empty_documents);
    println!("Total elements:   {}", stats.total_elements);

    if stats.num_documents > 0 {
        println!();
        println!("Document sizes:");
        println!("  min   {}", stats.min_size);
        println!("  max   {}", stats.max_size);
        println!("  mean  {:.1}", stats.mean_size);
    }

    println!();
    println!("Index size:       {}", format_size(stats.index_bytes));
    println!("Data size:        {}", format_size(stats.data_bytes));

    Ok(())
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::builder::{BuilderConfig, CorpusBuilder};
    use tempfile::tempdir;

    #[test]
    fn test_collect_stats() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("c");
        let mut builder = CorpusBuilder::<i32>::new(
            &data_file_path(&prefix),
            BuilderConfig {
                chunk_size: 4,
                pad_id: 0,
                retrieval_db: false,
            },
        )
        .unwrap();
        builder.add_item(&[1, 2, 3, 4, 5]).unwrap();
        builder.add_item(&[]).unwrap();
        builder.add_item(&[6]).unwrap();
        builder.finalize(&index_file_path(&prefix)).unwrap();

        let store = CorpusStore::open(&prefix).unwrap();
        let stats = collect_stats(&store);
        assert_eq!(stats.num_documents, 3);
        assert_eq!(stats.num_chunks, 4);
        assert_eq!(stats.empty_documents, 0);
        assert_eq!(stats.total_elements, 16);
        assert_eq!(stats.min_size, 4);
        assert_eq!(stats.max_size, 8);
        assert_eq!(stats.data_bytes, 64);
        assert_eq!(stats.index_bytes, 43 + 3 * 4 + 3 * 8 + 3 * 8 + 4 * 8);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
