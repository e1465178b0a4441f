//! # mmcorpus - Memory-Mapped Chunked Corpus Store
//!
//! mmcorpus stores a corpus of variable-length token documents as one flat
//! binary data file plus a compact index, and serves zero-copy views of
//! documents and fixed-size chunks straight out of memory-mapped files.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`index`] - Index file format, writer, reader and statistics
//! - [`corpus`] - Corpus builder, read-only store and bulk ingest
//! - [`error`] - Error type shared by every fallible operation
//! - [`utils`] - Little-endian encoding, progress bars and app config
//!
//! ## Quick Start
//!
//! ```ignore
//! use mmcorpus::{BuilderConfig, CorpusBuilder, CorpusStore};
//! use mmcorpus::index::{data_file_path, index_file_path};
//! use std::path::Path;
//!
//! let prefix = Path::new("/tmp/corpus");
//! let config = BuilderConfig { chunk_size: 64, pad_id: 0u16, retrieval_db: false };
//! let mut builder = CorpusBuilder::new(&data_file_path(prefix), config).unwrap();
//! builder.add_item(&[17, 42, 7]).unwrap();
//! builder.finalize(&index_file_path(prefix)).unwrap();
//!
//! let store = CorpusStore::open(prefix).unwrap();
//! let tokens: &[u16] = store.get_one(0).unwrap();
//! let chunk: &[u16] = store.chunk(0).unwrap();
//! ```
//!
//! ## File layout
//!
//! Documents are padded to a multiple of the chunk size, so every chunk is
//! a fixed-width slice of the data file. In retrieval-db mode one extra
//! chunk follows each document, letting a chunk view extend into the next
//! chunk's worth of data without crossing into another document.

#[cfg(target_endian = "big")]
compile_error!("mmcorpus files are little-endian and only supported on little-endian targets");

pub mod corpus;
pub mod error;
pub mod index;
pub mod utils;

pub use corpus::{BuilderConfig, CorpusBuilder, CorpusStore, FinalizeSummary, StoreOptions};
pub use error::{CorpusError, ErrorKind, Result};
pub use index::{DType, Element, IndexReader, IndexWriter, Span};
