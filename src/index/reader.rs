use crate::error::{CorpusError, IoContext, Result};
use crate::index::types::*;
use crate::index::writer::IndexWriter;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Block size used when reading a file through to warm the page cache
const WARMUP_BLOCK: usize = 100 * 1024 * 1024;

/// Totals reported by a successful [`IndexReader::verify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReport {
    pub documents: u64,
    pub chunks: u64,
    /// Sum of document sizes in elements
    pub elements: u64,
}

/// Memory-mapped, read-only view of an `.idx` file.
///
/// All arrays are decoded on access straight from the mapping; nothing is
/// copied at open time. The mapping is released when the reader is dropped.
pub struct IndexReader {
    path: PathBuf,
    mmap: Mmap,
    header: IndexHeader,
    layout: IndexLayout,
}

impl IndexReader {
    /// Open and validate an index file without warming it up
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, true)
    }

    /// Open and validate an index file, optionally reading it through first
    pub fn open_with(path: &Path, skip_warmup: bool) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        let mmap = unsafe { Mmap::map(&file).with_path(path)? };

        // On error the mapping is dropped here, before returning
        let (header, layout) = IndexHeader::parse_with_layout(&mmap)?;

        if !skip_warmup {
            log::info!("warming up index mmap file {}", path.display());
            warm_up(path)?;
        }

        log::debug!(
            "opened index {} ({} documents, {} chunks, dtype {})",
            path.display(),
            header.num_documents,
            header.num_chunks,
            header.dtype
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            layout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn dtype(&self) -> DType {
        self.header.dtype
    }

    pub fn dtype_size(&self) -> usize {
        self.header.dtype.size()
    }

    pub fn chunk_size(&self) -> u64 {
        self.header.chunk_size
    }

    pub fn num_chunks(&self) -> u64 {
        self.header.num_chunks
    }

    pub fn retrieval_db(&self) -> bool {
        self.header.retrieval_db
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.layout.sizes.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sizes(&self) -> LeArray<'_, i32> {
        LeArray::new(&self.mmap[self.layout.sizes.clone()])
    }

    pub fn pointers(&self) -> LeArray<'_, i64> {
        LeArray::new(&self.mmap[self.layout.pointers.clone()])
    }

    pub fn chunk_id_starts(&self) -> LeArray<'_, i64> {
        LeArray::new(&self.mmap[self.layout.chunk_id_starts.clone()])
    }

    pub fn chunk_addresses(&self) -> LeArray<'_, i64> {
        LeArray::new(&self.mmap[self.layout.chunk_addresses.clone()])
    }

    /// Byte pointer and size of a document
    pub fn document(&self, doc_id: usize) -> Result<DocumentEntry> {
        let len = self.len();
        let size = self
            .sizes()
            .get(doc_id)
            .ok_or_else(|| CorpusError::out_of_bounds("document", doc_id, len))?;
        let pointer = self
            .pointers()
            .get(doc_id)
            .ok_or_else(|| CorpusError::out_of_bounds("document", doc_id, len))?;

        Ok(DocumentEntry {
            pointer: non_negative(pointer, "pointer", doc_id)?,
            size: non_negative(size as i64, "size", doc_id)?,
        })
    }

    /// Byte address of a chunk
    pub fn chunk_address(&self, chunk_id: u64) -> Result<u64> {
        let address = usize::try_from(chunk_id)
            .ok()
            .and_then(|i| self.chunk_addresses().get(i))
            .ok_or_else(|| CorpusError::out_of_bounds("chunk", chunk_id, self.num_chunks()))?;
        non_negative(address, "chunk address", chunk_id as usize)
    }

    /// First chunk id of a document
    pub fn chunk_id_start(&self, doc_id: usize) -> Result<u64> {
        let start = self
            .chunk_id_starts()
            .get(doc_id)
            .ok_or_else(|| CorpusError::out_of_bounds("document", doc_id, self.len()))?;
        non_negative(start, "chunk id start", doc_id)
    }

    /// Chunk id covering element `offset` of a document.
    ///
    /// The caller guarantees `offset` is a multiple of the chunk size; it must
    /// fall inside the document.
    pub fn chunk_id_for(&self, doc_id: usize, offset: u64) -> Result<u64> {
        let size = self.document(doc_id)?.size;
        if offset >= size {
            return Err(CorpusError::out_of_bounds("offset", offset, size));
        }
        let start = self.chunk_id_start(doc_id)?;
        start.checked_add(offset / self.chunk_size()).ok_or_else(|| {
            CorpusError::Corrupt(format!("chunk id start {} of document {} overflows", start, doc_id))
        })
    }

    /// Check every array against what the writer derives from `sizes`
    pub fn verify(&self) -> Result<VerifyReport> {
        let sizes = self
            .sizes()
            .iter()
            .enumerate()
            .map(|(doc_id, size)| non_negative(size as i64, "size", doc_id))
            .collect::<Result<Vec<u64>>>()?;

        let expected = IndexWriter::new(self.dtype(), self.retrieval_db())
            .compute(&sizes, self.chunk_size())?;

        if expected.chunk_addresses.len() as u64 != self.num_chunks() {
            return Err(CorpusError::Corrupt(format!(
                "header declares {} chunks, sizes imply {}",
                self.num_chunks(),
                expected.chunk_addresses.len()
            )));
        }

        let pointers = self.pointers();
        let starts = self.chunk_id_starts();
        let addresses = self.chunk_addresses();

        (0..sizes.len()).into_par_iter().try_for_each(|i| {
            check_entry("pointer", i, pointers.get(i), expected.pointers[i])?;
            check_entry("chunk id start", i, starts.get(i), expected.chunk_id_starts[i])
        })?;

        (0..expected.chunk_addresses.len())
            .into_par_iter()
            .try_for_each(|i| {
                check_entry("chunk address", i, addresses.get(i), expected.chunk_addresses[i])
            })?;

        Ok(VerifyReport {
            documents: sizes.len() as u64,
            chunks: self.num_chunks(),
            elements: sizes.iter().sum(),
        })
    }
}

fn non_negative(value: i64, what: &str, index: usize) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| CorpusError::Corrupt(format!("negative {} {} at {}", what, value, index)))
}

fn check_entry(what: &str, index: usize, found: Option<i64>, expected: i64) -> Result<()> {
    match found {
        Some(value) if value == expected => Ok(()),
        Some(value) => Err(CorpusError::Corrupt(format!(
            "{} {} is {}, expected {}",
            what, index, value, expected
        ))),
        None => Err(CorpusError::Corrupt(format!("{} {} missing", what, index))),
    }
}

/// Read a file through once so later random access hits the page cache
pub(crate) fn warm_up(path: &Path) -> Result<()> {
    let mut file = File::open(path).with_path(path)?;
    let mut buf = vec![0u8; WARMUP_BLOCK.min(file_len(path)?.max(1))];
    loop {
        let n = file.read(&mut buf).with_path(path)?;
        if n == 0 {
            break;
        }
    }
    Ok(())
}

fn file_len(path: &Path) -> Result<usize> {
    let len = std::fs::metadata(path).with_path(path)?.len();
    Ok(usize::try_from(len).unwrap_or(usize::MAX))
}
