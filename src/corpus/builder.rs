use crate::error::{CorpusError, IoContext, Result};
use crate::index::reader::IndexReader;
use crate::index::types::*;
use crate::index::writer::IndexWriter;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Layout parameters of a corpus being built
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuilderConfig<T> {
    /// Elements per chunk
    pub chunk_size: u64,
    /// Value written into padding
    pub pad_id: T,
    /// Reserve one neighbor chunk after every document
    pub retrieval_db: bool,
}

/// What [`CorpusBuilder::finalize`] wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub header: IndexHeader,
    pub data_bytes: u64,
}

/// Append-only writer of a corpus data file.
///
/// Documents are padded to a chunk boundary as they are added and their sizes
/// kept in memory until [`finalize`](CorpusBuilder::finalize) writes the index.
/// `finalize` consumes the builder, so nothing can be appended afterwards.
pub struct CorpusBuilder<T: Element> {
    data_path: PathBuf,
    data_file: BufWriter<File>,
    config: BuilderConfig<T>,
    sizes: Vec<u64>,
    data_bytes: u64,
    padding: Vec<T>,
}

impl<T: Element> CorpusBuilder<T> {
    /// Create (or truncate) the data file at `data_path`
    pub fn new(data_path: &Path, config: BuilderConfig<T>) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(CorpusError::InvalidArgument(
                "chunk size must be positive".to_string(),
            ));
        }
        usize::try_from(config.chunk_size).map_err(|_| {
            CorpusError::InvalidArgument(format!("chunk size {} too large", config.chunk_size))
        })?;

        let file = File::create(data_path).with_path(data_path)?;
        log::debug!("created data file {}", data_path.display());

        Ok(Self {
            data_path: data_path.to_path_buf(),
            data_file: BufWriter::with_capacity(65536, file),
            config,
            sizes: Vec::new(),
            data_bytes: 0,
            padding: Vec::new(),
        })
    }

    pub fn config(&self) -> &BuilderConfig<T> {
        &self.config
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Number of documents added or merged so far
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Recorded (padded) document sizes
    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// Append one document and return its id.
    ///
    /// The tokens are padded with `pad_id` up to the next multiple of the chunk
    /// size strictly above their length, so an aligned or empty document gains
    /// one full chunk of padding. In retrieval-db mode one more chunk of
    /// `pad_id` follows. The recorded size covers the tokens and alignment
    /// padding only.
    pub fn add_item(&mut self, tokens: &[T]) -> Result<usize> {
        let chunk_size = self.config.chunk_size as usize;
        let alignment = chunk_size - tokens.len() % chunk_size;
        let padded = tokens.len() + alignment;
        let reserved = if self.config.retrieval_db { chunk_size } else { 0 };
        let fill = alignment + reserved;

        if self.padding.len() < fill {
            self.padding.resize(fill, self.config.pad_id);
        }

        self.data_file
            .write_all(bytemuck::cast_slice(tokens))
            .with_path(&self.data_path)?;
        self.data_file
            .write_all(bytemuck::cast_slice(&self.padding[..fill]))
            .with_path(&self.data_path)?;

        self.data_bytes += ((padded + reserved) * T::DTYPE.size()) as u64;
        self.sizes.push(padded as u64);
        Ok(self.sizes.len() - 1)
    }

    /// Append an already finalized corpus: its sizes and its data bytes verbatim
    pub fn merge_file(&mut self, other_prefix: &Path) -> Result<()> {
        let index = IndexReader::open(&index_file_path(other_prefix))?;

        if index.dtype() != T::DTYPE {
            return Err(CorpusError::DtypeMismatch {
                expected: T::DTYPE,
                found: index.dtype(),
            });
        }
        if index.chunk_size() != self.config.chunk_size {
            return Err(CorpusError::Incompatible(format!(
                "{} has chunk size {}, builder uses {}",
                other_prefix.display(),
                index.chunk_size(),
                self.config.chunk_size
            )));
        }
        if index.retrieval_db() != self.config.retrieval_db {
            return Err(CorpusError::Incompatible(format!(
                "{} has retrieval_db={}, builder uses {}",
                other_prefix.display(),
                index.retrieval_db(),
                self.config.retrieval_db
            )));
        }

        let mut sizes = Vec::with_capacity(index.len());
        for (doc_id, size) in index.sizes().iter().enumerate() {
            let size = u64::try_from(size).map_err(|_| {
                CorpusError::Corrupt(format!("negative size {} at {}", size, doc_id))
            })?;
            sizes.push(size);
        }

        let data_path = data_file_path(other_prefix);
        let mut source = File::open(&data_path).with_path(&data_path)?;
        let copied = io::copy(&mut source, &mut self.data_file).with_path(&data_path)?;

        log::info!(
            "merged {} ({} documents, {} bytes)",
            other_prefix.display(),
            sizes.len(),
            copied
        );

        self.data_bytes += copied;
        self.sizes.extend(sizes);
        Ok(())
    }

    /// Close the data file and write the index describing it
    pub fn finalize(mut self, index_path: &Path) -> Result<FinalizeSummary> {
        self.data_file.flush().with_path(&self.data_path)?;
        let file = self
            .data_file
            .into_inner()
            .map_err(|e| e.into_error())
            .with_path(&self.data_path)?;
        file.sync_all().with_path(&self.data_path)?;
        drop(file);

        let header = IndexWriter::new(T::DTYPE, self.config.retrieval_db).write(
            index_path,
            &self.sizes,
            self.config.chunk_size,
        )?;

        log::info!(
            "finalized corpus {} ({} documents, {} data bytes)",
            self.data_path.display(),
            header.num_documents,
            self.data_bytes
        );

        Ok(FinalizeSummary {
            header,
            data_bytes: self.data_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::tempdir;

    fn config(retrieval_db: bool) -> BuilderConfig<i32> {
        BuilderConfig {
            chunk_size: 4,
            pad_id: -1,
            retrieval_db,
        }
    }

    fn read_i32s(path: &Path) -> Vec<i32> {
        fs::read(path)
            .unwrap()
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes(b.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_add_item_pads_to_chunk() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("c.bin");
        let mut builder = CorpusBuilder::new(&data, config(false)).unwrap();

        assert_eq!(builder.add_item(&[1, 2, 3, 4, 5]).unwrap(), 0);
        assert_eq!(builder.add_item(&[6, 7, 8, 9]).unwrap(), 1);
        assert_eq!(builder.add_item(&[]).unwrap(), 2);
        assert_eq!(builder.sizes(), &[8, 8, 4]);

        let summary = builder.finalize(&dir.path().join("c.idx")).unwrap();
        assert_eq!(summary.data_bytes, 80);
        assert_eq!(summary.header.num_chunks, 5);
        assert_eq!(
            read_i32s(&data),
            vec![
                1, 2, 3, 4, 5, -1, -1, -1, 6, 7, 8, 9, -1, -1, -1, -1, -1, -1, -1, -1
            ]
        );
    }

    #[test]
    fn test_add_item_retrieval_db_reserves_chunk() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("c.bin");
        let mut builder = CorpusBuilder::new(&data, config(true)).unwrap();

        builder.add_item(&[1, 2]).unwrap();
        builder.add_item(&[3, 4, 5, 6]).unwrap();
        assert_eq!(builder.sizes(), &[4, 8]);

        let summary = builder.finalize(&dir.path().join("c.idx")).unwrap();
        assert_eq!(summary.data_bytes, 80);
        assert_eq!(
            read_i32s(&data),
            vec![
                1, 2, -1, -1, -1, -1, -1, -1, 3, 4, 5, 6, -1, -1, -1, -1, -1, -1, -1, -1
            ]
        );
    }

    #[test]
    fn test_aligned_and_empty_documents_gain_a_chunk() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("c.bin");
        let mut builder = CorpusBuilder::new(&data, config(false)).unwrap();

        builder.add_item(&[1, 2, 3, 4]).unwrap();
        builder.add_item(&[]).unwrap();
        assert_eq!(builder.sizes(), &[8, 4]);

        let summary = builder.finalize(&dir.path().join("c.idx")).unwrap();
        assert_eq!(summary.header.num_chunks, 3);
        assert_eq!(
            read_i32s(&data),
            vec![1, 2, 3, 4, -1, -1, -1, -1, -1, -1, -1, -1]
        );
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let dir = tempdir().unwrap();
        let cfg = BuilderConfig {
            chunk_size: 0,
            ..config(false)
        };
        let err = CorpusBuilder::new(&dir.path().join("c.bin"), cfg).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_merge_rejects_other_dtype() {
        let dir = tempdir().unwrap();
        let other = dir.path().join("other");
        let mut b = CorpusBuilder::<i64>::new(
            &data_file_path(&other),
            BuilderConfig {
                chunk_size: 4,
                pad_id: 0,
                retrieval_db: false,
            },
        )
        .unwrap();
        b.add_item(&[1, 2]).unwrap();
        b.finalize(&index_file_path(&other)).unwrap();

        let mut builder = CorpusBuilder::new(&dir.path().join("main.bin"), config(false)).unwrap();
        let err = builder.merge_file(&other).unwrap_err();
        assert!(matches!(
            err,
            CorpusError::DtypeMismatch {
                expected: DType::I32,
                found: DType::I64
            }
        ));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_merge_rejects_other_mode() {
        let dir = tempdir().unwrap();
        let other = dir.path().join("other");
        let mut b = CorpusBuilder::new(&data_file_path(&other), config(true)).unwrap();
        b.add_item(&[1]).unwrap();
        b.finalize(&index_file_path(&other)).unwrap();

        let mut builder = CorpusBuilder::new(&dir.path().join("main.bin"), config(false)).unwrap();
        let err = builder.merge_file(&other).unwrap_err();
        assert!(matches!(err, CorpusError::Incompatible(_)));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_merge_appends_sizes_and_bytes() {
        let dir = tempdir().unwrap();
        let other = dir.path().join("other");
        let mut b = CorpusBuilder::new(&data_file_path(&other), config(false)).unwrap();
        b.add_item(&[7, 7, 7, 7, 7]).unwrap();
        b.finalize(&index_file_path(&other)).unwrap();

        let data = dir.path().join("main.bin");
        let mut builder = CorpusBuilder::new(&data, config(false)).unwrap();
        builder.add_item(&[1]).unwrap();
        builder.merge_file(&other).unwrap();
        assert_eq!(builder.sizes(), &[4, 8]);

        let summary = builder.finalize(&dir.path().join("main.idx")).unwrap();
        assert_eq!(summary.data_bytes, 48);
        assert_eq!(
            read_i32s(&data),
            vec![1, -1, -1, -1, 7, 7, 7, 7, 7, -1, -1, -1]
        );
    }

    #[test]
    fn test_merge_missing_corpus_is_resource_error() {
        let dir = tempdir().unwrap();
        let mut builder = CorpusBuilder::new(&dir.path().join("main.bin"), config(false)).unwrap();
        let err = builder.merge_file(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }
}
