use crate::error::{CorpusError, IoContext, Result};
use crate::index::types::*;
use crate::utils::{write_i32_le, write_i64_slice_le};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Arrays derived from document sizes, in on-disk order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedIndex {
    pub sizes: Vec<i32>,
    pub pointers: Vec<i64>,
    pub chunk_id_starts: Vec<i64>,
    pub chunk_addresses: Vec<i64>,
}

/// Writes the `.idx` file describing a data file's document and chunk layout
#[derive(Debug, Clone, Copy)]
pub struct IndexWriter {
    dtype: DType,
    retrieval_db: bool,
}

impl IndexWriter {
    pub fn new(dtype: DType, retrieval_db: bool) -> Self {
        Self {
            dtype,
            retrieval_db,
        }
    }

    /// Derive pointers, chunk id starts and chunk addresses from document sizes.
    ///
    /// Each document starts where the previous one ended; in retrieval-db mode
    /// one unaddressed chunk follows every document. Sizes must be multiples of
    /// `chunk_size`.
    pub fn compute(&self, sizes: &[u64], chunk_size: u64) -> Result<ComputedIndex> {
        if chunk_size == 0 {
            return Err(CorpusError::InvalidArgument(
                "chunk size must be positive".to_string(),
            ));
        }

        let dtype_size = self.dtype.size() as u64;
        let chunk_bytes = checked_mul(chunk_size, dtype_size)?;
        let reserved = if self.retrieval_db { chunk_bytes } else { 0 };

        let mut disk_sizes = Vec::with_capacity(sizes.len());
        let mut pointers = Vec::with_capacity(sizes.len());
        let mut chunk_id_starts = Vec::with_capacity(sizes.len());
        let mut chunk_addresses = Vec::new();

        let mut address: u64 = 0;
        let mut next_chunk: u64 = 0;

        for (doc_id, &size) in sizes.iter().enumerate() {
            if size % chunk_size != 0 {
                return Err(CorpusError::Misaligned {
                    doc_id,
                    size,
                    chunk_size,
                });
            }
            let disk_size = i32::try_from(size)
                .map_err(|_| CorpusError::out_of_bounds("document size", size, i32::MAX))?;

            disk_sizes.push(disk_size);
            pointers.push(to_i64(address)?);
            chunk_id_starts.push(to_i64(next_chunk)?);

            let doc_chunks = size / chunk_size;
            for _ in 0..doc_chunks {
                chunk_addresses.push(to_i64(address)?);
                address = checked_add(address, chunk_bytes)?;
            }
            address = checked_add(address, reserved)?;
            next_chunk += doc_chunks;
        }

        Ok(ComputedIndex {
            sizes: disk_sizes,
            pointers,
            chunk_id_starts,
            chunk_addresses,
        })
    }

    /// Write the complete index to `path`, replacing any existing file.
    ///
    /// Not crash-safe: an interrupted write leaves a truncated file that
    /// [`IndexHeader::parse_with_layout`] rejects.
    pub fn write(&self, path: &Path, sizes: &[u64], chunk_size: u64) -> Result<IndexHeader> {
        let computed = self.compute(sizes, chunk_size)?;

        let header = IndexHeader {
            dtype: self.dtype,
            num_documents: computed.sizes.len() as u64,
            chunk_size,
            num_chunks: computed.chunk_addresses.len() as u64,
            retrieval_db: self.retrieval_db,
        };

        let file = File::create(path).with_path(path)?;
        let mut out = BufWriter::with_capacity(65536, file);

        Self::write_arrays(&mut out, &header, &computed).with_path(path)?;

        log::info!(
            "wrote index {} ({} documents, {} chunks)",
            path.display(),
            header.num_documents,
            header.num_chunks
        );
        Ok(header)
    }

    fn write_arrays<W: Write>(
        out: &mut W,
        header: &IndexHeader,
        computed: &ComputedIndex,
    ) -> std::io::Result<()> {
        out.write_all(&header.to_bytes())?;
        for &size in &computed.sizes {
            write_i32_le(out, size)?;
        }
        write_i64_slice_le(out, &computed.pointers)?;
        write_i64_slice_le(out, &computed.chunk_id_starts)?;
        write_i64_slice_le(out, &computed.chunk_addresses)?;
        out.flush()
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| CorpusError::InvalidArgument(format!("offset {} exceeds i64 range", value)))
}

fn checked_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| CorpusError::InvalidArgument("corpus byte length overflows u64".to_string()))
}

fn checked_mul(a: u64, b: u64) -> Result<u64> {
    a.checked_mul(b)
        .ok_or_else(|| CorpusError::InvalidArgument("corpus byte length overflows u64".to_string()))
}
