use crate::error::{CorpusError, IoContext, Result};
use crate::index::reader::{warm_up, IndexReader, VerifyReport};
use crate::index::types::*;
use lru::LruCache;
use memmap2::Mmap;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Options for [`CorpusStore::open_with`]
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Skip reading both files through once on open
    pub skip_warmup: bool,
    /// Entries kept in the document lookup cache (at least one)
    pub cache_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            skip_warmup: true,
            cache_capacity: 8,
        }
    }
}

/// Read-only corpus: an index plus the memory-mapped data file it describes.
///
/// Every accessor returns a view borrowed from the mapping. Views are typed by
/// an [`Element`] whose dtype must match the index; raw byte accessors serve
/// callers that only know the dtype at runtime.
pub struct CorpusStore {
    prefix: PathBuf,
    index: IndexReader,
    data: Mmap,
    cache: Mutex<LruCache<usize, DocumentEntry>>,
}

impl CorpusStore {
    /// Open `<prefix>.idx` and `<prefix>.bin` with default options
    pub fn open(prefix: &Path) -> Result<Self> {
        Self::open_with(prefix, StoreOptions::default())
    }

    pub fn open_with(prefix: &Path, options: StoreOptions) -> Result<Self> {
        let index = IndexReader::open_with(&index_file_path(prefix), options.skip_warmup)?;

        let data_path = data_file_path(prefix);
        if !options.skip_warmup {
            log::info!("warming up data mmap file {}", data_path.display());
            warm_up(&data_path)?;
        }
        let file = File::open(&data_path).with_path(&data_path)?;
        let data = unsafe { Mmap::map(&file).with_path(&data_path)? };

        let capacity = NonZeroUsize::new(options.cache_capacity).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            prefix: prefix.to_path_buf(),
            index,
            data,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// A corpus exists when both its index and data file are present
    pub fn exists(prefix: &Path) -> bool {
        index_file_path(prefix).exists() && data_file_path(prefix).exists()
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn index(&self) -> &IndexReader {
        &self.index
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dtype(&self) -> DType {
        self.index.dtype()
    }

    pub fn chunk_size(&self) -> u64 {
        self.index.chunk_size()
    }

    pub fn num_chunks(&self) -> u64 {
        self.index.num_chunks()
    }

    pub fn retrieval_db(&self) -> bool {
        self.index.retrieval_db()
    }

    pub fn sizes(&self) -> LeArray<'_, i32> {
        self.index.sizes()
    }

    /// Length of the data file in bytes
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Pointer and size of a document, through the bounded lookup cache
    pub fn entry(&self, doc_id: usize) -> Result<DocumentEntry> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = cache.get(&doc_id) {
            return Ok(*entry);
        }
        let entry = self.index.document(doc_id)?;
        cache.put(doc_id, entry);
        Ok(entry)
    }

    /// Whole document, padding included, reserved neighbor chunk excluded
    pub fn get_one<T: Element>(&self, doc_id: usize) -> Result<&[T]> {
        self.get(doc_id, 0, None)
    }

    /// `length` elements (default: the rest) starting `offset` elements into a document
    pub fn get<T: Element>(&self, doc_id: usize, offset: usize, length: Option<usize>) -> Result<&[T]> {
        self.check_dtype::<T>()?;
        cast(self.document_bytes(doc_id, offset, length)?)
    }

    /// Byte form of [`CorpusStore::get`]
    pub fn document_bytes(&self, doc_id: usize, offset: usize, length: Option<usize>) -> Result<&[u8]> {
        let entry = self.entry(doc_id)?;
        let size = to_usize(entry.size)?;
        if offset > size {
            return Err(CorpusError::out_of_bounds("offset", offset, size));
        }
        let length = length.unwrap_or(size - offset);
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= size)
            .ok_or_else(|| CorpusError::out_of_bounds("element", offset.saturating_add(length) - 1, size))?;

        let dtype_size = self.index.dtype_size();
        let start = offset
            .checked_mul(dtype_size)
            .and_then(|rel| to_usize(entry.pointer).ok()?.checked_add(rel))
            .ok_or_else(|| {
                CorpusError::Corrupt(format!("document {} pointer {} overflows", doc_id, entry.pointer))
            })?;
        self.data_slice(start, (end - offset) * dtype_size)
    }

    /// Documents in a contiguous span, each without its reserved neighbor chunk.
    ///
    /// The span is read as one region of the mapping and split in place.
    pub fn get_range<T: Element>(&self, span: impl Into<Span>) -> Result<Vec<&[T]>> {
        self.check_dtype::<T>()?;
        let range = span.into().resolve(self.len(), "document")?;
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let reserved = self.reserved_elements()?;
        let sizes = self.index.sizes();
        let mut strides = Vec::with_capacity(range.len());
        let mut total = 0usize;
        for doc_id in range.clone() {
            let size = sizes
                .get(doc_id)
                .ok_or_else(|| CorpusError::out_of_bounds("document", doc_id, self.len()))?;
            let size = usize::try_from(size)
                .map_err(|_| CorpusError::Corrupt(format!("negative size {} at {}", size, doc_id)))?;
            strides.push(size);
            total += size + reserved;
        }

        let first = self.index.document(range.start)?;
        let bytes = self.data_slice(to_usize(first.pointer)?, total * self.index.dtype_size())?;
        let all: &[T] = cast(bytes)?;

        let mut views = Vec::with_capacity(strides.len());
        let mut pos = 0;
        for size in strides {
            views.push(&all[pos..pos + size]);
            pos += size + reserved;
        }
        Ok(views)
    }

    /// One chunk; in retrieval-db mode the following chunk-sized block is included
    pub fn chunk<T: Element>(&self, chunk_id: u64) -> Result<&[T]> {
        self.check_dtype::<T>()?;
        cast(self.chunk_bytes(chunk_id, false)?)
    }

    /// Byte form of [`CorpusStore::chunk`]; `force_no_padding` drops the neighbor block
    pub fn chunk_bytes(&self, chunk_id: u64, force_no_padding: bool) -> Result<&[u8]> {
        let address = to_usize(self.index.chunk_address(chunk_id)?)?;
        let width = self.chunk_width(force_no_padding)?;
        self.data_slice(address, width * self.index.dtype_size())
    }

    /// Chunks in a contiguous span, each taken at its own address
    pub fn chunk_range<T: Element>(&self, span: impl Into<Span>, force_no_padding: bool) -> Result<Vec<&[T]>> {
        self.check_dtype::<T>()?;
        let num_chunks = to_usize(self.num_chunks())?;
        let range = span.into().resolve(num_chunks, "chunk")?;
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let dtype_size = self.index.dtype_size();
        let width = self.chunk_width(force_no_padding)?;
        let first = to_usize(self.index.chunk_address(range.start as u64)?)?;
        let last = to_usize(self.index.chunk_address(range.end as u64 - 1)?)?;
        if last < first {
            return Err(CorpusError::Corrupt(format!(
                "chunk addresses decrease between {} and {}",
                range.start,
                range.end - 1
            )));
        }

        let bytes = self.data_slice(first, last - first + width * dtype_size)?;
        let all: &[T] = cast(bytes)?;

        range
            .map(|chunk_id| {
                let address = to_usize(self.index.chunk_address(chunk_id as u64)?)?;
                let rel = address
                    .checked_sub(first)
                    .filter(|rel| rel % dtype_size == 0)
                    .ok_or_else(|| {
                        CorpusError::Corrupt(format!("chunk {} address {} out of order", chunk_id, address))
                    })?
                    / dtype_size;
                all.get(rel..rel + width).ok_or_else(|| {
                    CorpusError::Corrupt(format!("chunk {} address {} out of order", chunk_id, address))
                })
            })
            .collect()
    }

    /// Chunk id of element `offset` in a document; `offset` must be chunk aligned
    pub fn chunk_id_for(&self, doc_id: usize, offset: u64) -> Result<u64> {
        let chunk_size = self.chunk_size();
        if offset % chunk_size != 0 {
            return Err(CorpusError::UnalignedOffset { offset, chunk_size });
        }
        self.index.chunk_id_for(doc_id, offset)
    }

    /// Verify the index arrays and that the data file ends where the last document does
    pub fn verify(&self) -> Result<VerifyReport> {
        let report = self.index.verify()?;

        let expected_len = match self.len().checked_sub(1) {
            None => 0,
            Some(last) => {
                let entry = self.index.document(last)?;
                let elements = to_usize(entry.size)? + self.reserved_elements()?;
                to_usize(entry.pointer)? + elements * self.index.dtype_size()
            }
        };

        if self.data.len() < expected_len {
            return Err(CorpusError::Truncated {
                what: "data file",
                needed: expected_len as u64,
                found: self.data.len() as u64,
            });
        }
        if self.data.len() > expected_len {
            return Err(CorpusError::Corrupt(format!(
                "data file has {} bytes past the last document",
                self.data.len() - expected_len
            )));
        }
        Ok(report)
    }

    fn check_dtype<T: Element>(&self) -> Result<()> {
        if T::DTYPE != self.dtype() {
            return Err(CorpusError::DtypeMismatch {
                expected: self.dtype(),
                found: T::DTYPE,
            });
        }
        Ok(())
    }

    fn reserved_elements(&self) -> Result<usize> {
        if self.retrieval_db() {
            to_usize(self.chunk_size())
        } else {
            Ok(0)
        }
    }

    fn chunk_width(&self, force_no_padding: bool) -> Result<usize> {
        let chunk_size = to_usize(self.chunk_size())?;
        if self.retrieval_db() && !force_no_padding {
            Ok(chunk_size * 2)
        } else {
            Ok(chunk_size)
        }
    }

    fn data_slice(&self, start: usize, len: usize) -> Result<&[u8]> {
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| CorpusError::Truncated {
                what: "data file",
                needed: (start as u64).saturating_add(len as u64),
                found: self.data.len() as u64,
            })
    }
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| CorpusError::Corrupt(format!("offset {} exceeds address space", value)))
}

fn cast<T: Element>(bytes: &[u8]) -> Result<&[T]> {
    bytemuck::try_cast_slice(bytes)
        .map_err(|e| CorpusError::Corrupt(format!("data view cannot be typed: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::builder::{BuilderConfig, CorpusBuilder};
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn build(retrieval_db: bool, docs: &[&[i32]]) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("corpus");
        let config = BuilderConfig {
            chunk_size: 4,
            pad_id: 0,
            retrieval_db,
        };
        let mut builder = CorpusBuilder::<i32>::new(&data_file_path(&prefix), config).unwrap();
        for doc in docs {
            builder.add_item(doc).unwrap();
        }
        builder.finalize(&index_file_path(&prefix)).unwrap();
        (dir, prefix)
    }

    #[test]
    fn test_concrete_scenario() {
        let (_dir, prefix) = build(false, &[&[1, 2, 3, 4, 5], &[9, 9]]);
        let store = CorpusStore::open(&prefix).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.num_chunks(), 3);
        assert_eq!(store.index().chunk_id_starts().to_vec(), vec![0, 2]);
        assert_eq!(store.index().chunk_addresses().to_vec(), vec![0, 16, 32]);
        assert_eq!(store.get_one::<i32>(0).unwrap(), &[1, 2, 3, 4, 5, 0, 0, 0]);
        assert_eq!(store.chunk::<i32>(2).unwrap(), &[9, 9, 0, 0]);
    }

    #[test]
    fn test_get_offset_and_length() {
        let (_dir, prefix) = build(false, &[&[1, 2, 3, 4, 5], &[9, 9]]);
        let store = CorpusStore::open(&prefix).unwrap();

        assert_eq!(store.get::<i32>(0, 2, Some(3)).unwrap(), &[3, 4, 5]);
        assert_eq!(store.get::<i32>(0, 6, None).unwrap(), &[0, 0]);
        assert_eq!(store.get::<i32>(0, 8, None).unwrap(), &[] as &[i32]);

        assert_eq!(store.get::<i32>(0, 9, None).unwrap_err().kind(), ErrorKind::Bounds);
        assert_eq!(store.get::<i32>(0, 6, Some(3)).unwrap_err().kind(), ErrorKind::Bounds);
        assert_eq!(store.get::<i32>(2, 0, None).unwrap_err().kind(), ErrorKind::Bounds);
    }

    #[test]
    fn test_wrong_element_type() {
        let (_dir, prefix) = build(false, &[&[1]]);
        let store = CorpusStore::open(&prefix).unwrap();
        let err = store.get_one::<i64>(0).unwrap_err();
        assert!(matches!(
            err,
            CorpusError::DtypeMismatch {
                expected: DType::I32,
                found: DType::I64
            }
        ));
    }

    #[test]
    fn test_retrieval_db_views() {
        let (_dir, prefix) = build(true, &[&[1, 2, 3, 4, 5], &[9, 9]]);
        let store = CorpusStore::open(&prefix).unwrap();

        assert!(store.retrieval_db());
        assert_eq!(store.index().pointers().to_vec(), vec![0, 48]);
        assert_eq!(store.index().chunk_addresses().to_vec(), vec![0, 16, 48]);
        assert_eq!(store.get_one::<i32>(0).unwrap(), &[1, 2, 3, 4, 5, 0, 0, 0]);

        // Chunk views include the following block
        assert_eq!(store.chunk::<i32>(0).unwrap(), &[1, 2, 3, 4, 5, 0, 0, 0]);
        assert_eq!(store.chunk::<i32>(1).unwrap(), &[5, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(store.chunk::<i32>(2).unwrap(), &[9, 9, 0, 0, 0, 0, 0, 0]);

        let docs = store.get_range::<i32>(0..2).unwrap();
        assert_eq!(docs, vec![&[1, 2, 3, 4, 5, 0, 0, 0][..], &[9, 9, 0, 0][..]]);
    }

    #[test]
    fn test_get_range() {
        let (_dir, prefix) = build(false, &[&[1], &[2, 2, 2, 2, 2], &[3]]);
        let store = CorpusStore::open(&prefix).unwrap();

        let docs = store.get_range::<i32>(1..3).unwrap();
        assert_eq!(docs, vec![&[2, 2, 2, 2, 2, 0, 0, 0][..], &[3, 0, 0, 0][..]]);
        assert!(store.get_range::<i32>(2..2).unwrap().is_empty());

        let err = store.get_range::<i32>(Span::new(0, 3).step_by(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(store.get_range::<i32>(1..4).unwrap_err().kind(), ErrorKind::Bounds);
    }

    #[test]
    fn test_chunk_range_from_nonzero_start() {
        let (_dir, prefix) = build(true, &[&[1, 2, 3, 4, 5], &[9, 9]]);
        let store = CorpusStore::open(&prefix).unwrap();

        let chunks = store.chunk_range::<i32>(1..3, true).unwrap();
        assert_eq!(chunks, vec![&[5, 0, 0, 0][..], &[9, 9, 0, 0][..]]);

        let padded = store.chunk_range::<i32>(1..3, false).unwrap();
        assert_eq!(padded[0], store.chunk::<i32>(1).unwrap());
        assert_eq!(padded[1], store.chunk::<i32>(2).unwrap());

        let err = store.chunk_range::<i32>(Span::new(0, 3).step_by(3), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(store.chunk_range::<i32>(2..4, false).unwrap_err().kind(), ErrorKind::Bounds);
    }

    #[test]
    fn test_chunk_id_for_requires_alignment() {
        let (_dir, prefix) = build(false, &[&[1, 2, 3, 4, 5], &[9, 9]]);
        let store = CorpusStore::open(&prefix).unwrap();

        assert_eq!(store.chunk_id_for(0, 4).unwrap(), 1);
        assert_eq!(store.chunk_id_for(1, 0).unwrap(), 2);
        assert_eq!(store.chunk_id_for(0, 3).unwrap_err().kind(), ErrorKind::Alignment);
        assert_eq!(store.chunk_id_for(0, 8).unwrap_err().kind(), ErrorKind::Bounds);
        assert_eq!(
            store.chunk_id_for(1, u64::MAX - 3).unwrap_err().kind(),
            ErrorKind::Bounds
        );
    }

    #[test]
    fn test_cache_returns_same_entries() {
        let (_dir, prefix) = build(false, &[&[1], &[2], &[3]]);
        let options = StoreOptions {
            skip_warmup: false,
            cache_capacity: 1,
        };
        let store = CorpusStore::open_with(&prefix, options).unwrap();
        for _ in 0..3 {
            for doc_id in 0..3 {
                let entry = store.entry(doc_id).unwrap();
                assert_eq!(entry, store.index().document(doc_id).unwrap());
            }
        }
    }

    #[test]
    fn test_exists_and_missing_data() {
        let (_dir, prefix) = build(false, &[&[1]]);
        assert!(CorpusStore::exists(&prefix));

        fs::remove_file(data_file_path(&prefix)).unwrap();
        assert!(!CorpusStore::exists(&prefix));
        let err = CorpusStore::open(&prefix).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn test_verify_detects_short_data_file() {
        let (_dir, prefix) = build(false, &[&[1, 2, 3, 4, 5], &[9, 9]]);
        assert!(CorpusStore::open(&prefix).unwrap().verify().is_ok());

        let data = fs::read(data_file_path(&prefix)).unwrap();
        fs::write(data_file_path(&prefix), &data[..data.len() - 4]).unwrap();

        let store = CorpusStore::open(&prefix).unwrap();
        assert!(matches!(
            store.verify(),
            Err(CorpusError::Truncated { what: "data file", .. })
        ));
        assert!(matches!(
            store.chunk::<i32>(2),
            Err(CorpusError::Truncated { .. })
        ));
    }
}
