//! On-disk format of the corpus index (`.idx`) and the element types stored
//! in the companion data file (`.bin`).
//!
//! Layout (little-endian, no padding anywhere):
//!
//! ```text
//! magic          9 bytes   b"MMIDRET\0\0"
//! version        u64       INDEX_VERSION
//! dtype_code     u8        see DType
//! num_documents  u64
//! chunk_size     u64       elements per chunk
//! num_chunks     u64
//! retrieval_db   u8        0 | 1
//! sizes          num_documents x i32
//! pointers       num_documents x i64
//! chunk_id_start num_documents x i64
//! chunk_address  num_chunks    x i64
//! ```

use crate::error::{CorpusError, Result};
use crate::utils::{read_i32_le_at, read_i64_le_at, read_u64_le_at, read_u8_at};
use bytemuck::Pod;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Signature at the start of every index file
pub const INDEX_MAGIC: &[u8; 9] = b"MMIDRET\x00\x00";

/// The only index version this crate reads and writes
pub const INDEX_VERSION: u64 = 1;

/// Extension of the index file of a corpus prefix
pub const INDEX_EXTENSION: &str = "idx";

/// Extension of the data file of a corpus prefix
pub const DATA_EXTENSION: &str = "bin";

/// Element type of the data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DType {
    U8 = 1,
    I8 = 2,
    I16 = 3,
    I32 = 4,
    I64 = 5,
    F32 = 6,
    F64 = 7,
    U16 = 8,
}

impl DType {
    pub const ALL: [DType; 8] = [
        DType::U8,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::F32,
        DType::F64,
        DType::U16,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(DType::U8),
            2 => Ok(DType::I8),
            3 => Ok(DType::I16),
            4 => Ok(DType::I32),
            5 => Ok(DType::I64),
            6 => Ok(DType::F32),
            7 => Ok(DType::F64),
            8 => Ok(DType::U16),
            other => Err(CorpusError::UnknownDtype(other)),
        }
    }

    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::I16 | DType::U16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::U16 => "u16",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = CorpusError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        DType::ALL
            .into_iter()
            .find(|d| d.name() == lower)
            .ok_or_else(|| CorpusError::InvalidArgument(format!("unknown dtype '{}'", s)))
    }
}

/// A primitive that can be stored in a corpus data file
pub trait Element:
    Pod + PartialEq + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const DTYPE: DType;

    /// Convert a configured pad id, `None` if it is not representable
    fn from_i64(value: i64) -> Option<Self>;
}

macro_rules! impl_element_int {
    ($($t:ty => $d:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$d;

                fn from_i64(value: i64) -> Option<Self> {
                    <$t>::try_from(value).ok()
                }
            }
        )*
    };
}

macro_rules! impl_element_float {
    ($($t:ty => $d:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$d;

                fn from_i64(value: i64) -> Option<Self> {
                    Some(value as $t)
                }
            }
        )*
    };
}

impl_element_int!(u8 => U8, i8 => I8, i16 => I16, i32 => I32, i64 => I64, u16 => U16);
impl_element_float!(f32 => F32, f64 => F64);

/// Byte position and logical size of one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Byte offset of the first element in the data file
    pub pointer: u64,
    /// Element count, padding included, reserved neighbor chunk excluded
    pub size: u64,
}

/// Fixed-width little-endian integer stored in an index array
pub trait LeValue: Copy + fmt::Debug {
    const WIDTH: usize;

    fn read_at(bytes: &[u8], offset: usize) -> Option<Self>;
}

impl LeValue for i32 {
    const WIDTH: usize = 4;

    #[inline]
    fn read_at(bytes: &[u8], offset: usize) -> Option<Self> {
        read_i32_le_at(bytes, offset)
    }
}

impl LeValue for i64 {
    const WIDTH: usize = 8;

    #[inline]
    fn read_at(bytes: &[u8], offset: usize) -> Option<Self> {
        read_i64_le_at(bytes, offset)
    }
}

/// Zero-copy view over a packed little-endian array inside a mapped index.
///
/// The arrays follow a 43-byte header so they are generally misaligned; values
/// are decoded on access instead of casting the bytes to `&[T]`.
#[derive(Debug, Clone, Copy)]
pub struct LeArray<'a, T> {
    bytes: &'a [u8],
    _marker: PhantomData<T>,
}

impl<'a, T: LeValue> LeArray<'a, T> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len() % T::WIDTH, 0);
        Self {
            bytes,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / T::WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        T::read_at(self.bytes, index.checked_mul(T::WIDTH)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + use<'a, T> {
        self.bytes
            .chunks_exact(T::WIDTH)
            .filter_map(|value| T::read_at(value, 0))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Raw little-endian bytes backing the view
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Decoded fixed-size header of an index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub dtype: DType,
    pub num_documents: u64,
    pub chunk_size: u64,
    pub num_chunks: u64,
    pub retrieval_db: bool,
}

/// Byte ranges of the four arrays following the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    pub sizes: Range<usize>,
    pub pointers: Range<usize>,
    pub chunk_id_starts: Range<usize>,
    pub chunk_addresses: Range<usize>,
}

impl IndexLayout {
    /// Total file length implied by the header
    pub fn file_len(&self) -> usize {
        self.chunk_addresses.end
    }
}

impl IndexHeader {
    /// Size of header in bytes
    pub const SIZE: usize = 9 + 8 + 1 + 8 + 8 + 8 + 1; // 43 bytes

    const VERSION_OFFSET: usize = 9;
    const DTYPE_OFFSET: usize = 17;
    const NUM_DOCUMENTS_OFFSET: usize = 18;
    const CHUNK_SIZE_OFFSET: usize = 26;
    const NUM_CHUNKS_OFFSET: usize = 34;
    const RETRIEVAL_DB_OFFSET: usize = 42;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..Self::VERSION_OFFSET].copy_from_slice(INDEX_MAGIC);
        out[Self::VERSION_OFFSET..Self::DTYPE_OFFSET].copy_from_slice(&INDEX_VERSION.to_le_bytes());
        out[Self::DTYPE_OFFSET] = self.dtype.code();
        out[Self::NUM_DOCUMENTS_OFFSET..Self::CHUNK_SIZE_OFFSET]
            .copy_from_slice(&self.num_documents.to_le_bytes());
        out[Self::CHUNK_SIZE_OFFSET..Self::NUM_CHUNKS_OFFSET]
            .copy_from_slice(&self.chunk_size.to_le_bytes());
        out[Self::NUM_CHUNKS_OFFSET..Self::RETRIEVAL_DB_OFFSET]
            .copy_from_slice(&self.num_chunks.to_le_bytes());
        out[Self::RETRIEVAL_DB_OFFSET] = u8::from(self.retrieval_db);
        out
    }

    /// Parse and validate the header at the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < INDEX_MAGIC.len() || &bytes[..INDEX_MAGIC.len()] != INDEX_MAGIC {
            let found = bytes[..bytes.len().min(INDEX_MAGIC.len())].to_vec();
            return Err(CorpusError::BadMagic { found });
        }

        let truncated = || CorpusError::Truncated {
            what: "index header",
            needed: Self::SIZE as u64,
            found: bytes.len() as u64,
        };

        let version = read_u64_le_at(bytes, Self::VERSION_OFFSET).ok_or_else(truncated)?;
        if version != INDEX_VERSION {
            return Err(CorpusError::UnsupportedVersion {
                expected: INDEX_VERSION,
                found: version,
            });
        }

        let dtype_code = read_u8_at(bytes, Self::DTYPE_OFFSET).ok_or_else(truncated)?;
        let num_documents = read_u64_le_at(bytes, Self::NUM_DOCUMENTS_OFFSET).ok_or_else(truncated)?;
        let chunk_size = read_u64_le_at(bytes, Self::CHUNK_SIZE_OFFSET).ok_or_else(truncated)?;
        let num_chunks = read_u64_le_at(bytes, Self::NUM_CHUNKS_OFFSET).ok_or_else(truncated)?;
        let flag = read_u8_at(bytes, Self::RETRIEVAL_DB_OFFSET).ok_or_else(truncated)?;

        let dtype = DType::from_code(dtype_code)?;
        let retrieval_db = match flag {
            0 => false,
            1 => true,
            other => return Err(CorpusError::BadFlag(other)),
        };
        if chunk_size == 0 {
            return Err(CorpusError::Corrupt("chunk size is zero".to_string()));
        }

        Ok(Self {
            dtype,
            num_documents,
            chunk_size,
            num_chunks,
            retrieval_db,
        })
    }

    /// Compute the array layout, rejecting counts that overflow the address space
    pub fn layout(&self) -> Result<IndexLayout> {
        let overflow = || {
            CorpusError::Corrupt(format!(
                "array lengths overflow ({} documents, {} chunks)",
                self.num_documents, self.num_chunks
            ))
        };
        let docs = usize::try_from(self.num_documents).map_err(|_| overflow())?;
        let chunks = usize::try_from(self.num_chunks).map_err(|_| overflow())?;

        let sizes_len = docs.checked_mul(4).ok_or_else(overflow)?;
        let wide_len = docs.checked_mul(8).ok_or_else(overflow)?;
        let chunks_len = chunks.checked_mul(8).ok_or_else(overflow)?;

        let sizes_end = Self::SIZE.checked_add(sizes_len).ok_or_else(overflow)?;
        let pointers_end = sizes_end.checked_add(wide_len).ok_or_else(overflow)?;
        let chunk_ids_end = pointers_end.checked_add(wide_len).ok_or_else(overflow)?;
        let addresses_end = chunk_ids_end.checked_add(chunks_len).ok_or_else(overflow)?;

        Ok(IndexLayout {
            sizes: Self::SIZE..sizes_end,
            pointers: sizes_end..pointers_end,
            chunk_id_starts: pointers_end..chunk_ids_end,
            chunk_addresses: chunk_ids_end..addresses_end,
        })
    }

    /// Parse the header and check that `bytes` holds exactly the arrays it describes
    pub fn parse_with_layout(bytes: &[u8]) -> Result<(Self, IndexLayout)> {
        let header = Self::parse(bytes)?;
        let layout = header.layout()?;
        let expected = layout.file_len();
        if bytes.len() < expected {
            return Err(CorpusError::Truncated {
                what: "index",
                needed: expected as u64,
                found: bytes.len() as u64,
            });
        }
        if bytes.len() > expected {
            return Err(CorpusError::Corrupt(format!(
                "{} trailing bytes after chunk addresses",
                bytes.len() - expected
            )));
        }
        Ok((header, layout))
    }
}

/// A contiguous (step 1) span of ids; other steps are rejected on use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl Span {
    pub fn new(start: usize, stop: usize) -> Self {
        Self {
            start,
            stop,
            step: 1,
        }
    }

    pub fn step_by(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    /// Validate against a collection of `len` items
    pub(crate) fn resolve(&self, len: usize, what: &'static str) -> Result<Range<usize>> {
        if self.step != 1 {
            return Err(CorpusError::InvalidArgument(format!(
                "{} spans must be contiguous (step {})",
                what, self.step
            )));
        }
        if self.start > self.stop {
            return Err(CorpusError::InvalidArgument(format!(
                "{} span start {} is past stop {}",
                what, self.start, self.stop
            )));
        }
        if self.stop > len {
            return Err(CorpusError::out_of_bounds(what, self.stop - 1, len));
        }
        Ok(self.start..self.stop)
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

impl FromStr for Span {
    type Err = CorpusError;

    /// Parse `start:stop` or `start:stop:step`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CorpusError::InvalidArgument(format!("invalid span '{}'", s));
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(invalid());
        }
        let start = parts[0].trim().parse().map_err(|_| invalid())?;
        let stop = parts[1].trim().parse().map_err(|_| invalid())?;
        let step = match parts.get(2) {
            Some(step) => step.trim().parse().map_err(|_| invalid())?,
            None => 1,
        };
        Ok(Span { start, stop, step })
    }
}

fn with_extension(prefix: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// `<prefix>.idx`
pub fn index_file_path(prefix: &Path) -> PathBuf {
    with_extension(prefix, INDEX_EXTENSION)
}

/// `<prefix>.bin`
pub fn data_file_path(prefix: &Path) -> PathBuf {
    with_extension(prefix, DATA_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample_header() -> IndexHeader {
        IndexHeader {
            dtype: DType::I32,
            num_documents: 2,
            chunk_size: 4,
            num_chunks: 3,
            retrieval_db: false,
        }
    }

    #[test]
    fn test_dtype_codes_are_fixed() {
        let codes: Vec<u8> = DType::ALL.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        for dtype in DType::ALL {
            assert_eq!(DType::from_code(dtype.code()).unwrap(), dtype);
            assert_eq!(dtype.name().parse::<DType>().unwrap(), dtype);
        }
        assert!(matches!(DType::from_code(0), Err(CorpusError::UnknownDtype(0))));
        assert!(matches!(DType::from_code(9), Err(CorpusError::UnknownDtype(9))));
    }

    #[test]
    fn test_dtype_sizes() {
        assert_eq!(DType::U8.size(), 1);
        assert_eq!(DType::U16.size(), 2);
        assert_eq!(DType::F32.size(), 4);
        assert_eq!(DType::I64.size(), 8);
        assert_eq!(<u16 as Element>::DTYPE, DType::U16);
        assert_eq!(<f64 as Element>::DTYPE, DType::F64);
    }

    #[test]
    fn test_dtype_serde_names() {
        assert_eq!(serde_json::to_string(&DType::I32).unwrap(), "\"i32\"");
        let parsed: DType = serde_json::from_str("\"u16\"").unwrap();
        assert_eq!(parsed, DType::U16);
    }

    #[test]
    fn test_pad_conversion() {
        assert_eq!(<u8 as Element>::from_i64(255), Some(255u8));
        assert_eq!(<u8 as Element>::from_i64(-1), None);
        assert_eq!(<i16 as Element>::from_i64(70_000), None);
        assert_eq!(<f32 as Element>::from_i64(-3), Some(-3.0f32));
    }

    #[test]
    fn test_header_bytes() {
        let bytes = sample_header().to_bytes();
        assert_eq!(bytes.len(), 43);
        assert_eq!(&bytes[..9], INDEX_MAGIC);
        assert_eq!(u64::from_le_bytes(bytes[9..17].try_into().unwrap()), 1);
        assert_eq!(bytes[17], 4);
        assert_eq!(u64::from_le_bytes(bytes[18..26].try_into().unwrap()), 2);
        assert_eq!(u64::from_le_bytes(bytes[26..34].try_into().unwrap()), 4);
        assert_eq!(u64::from_le_bytes(bytes[34..42].try_into().unwrap()), 3);
        assert_eq!(bytes[42], 0);
        assert_eq!(IndexHeader::parse(&bytes).unwrap(), sample_header());
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = sample_header().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            IndexHeader::parse(&bytes),
            Err(CorpusError::BadMagic { .. })
        ));
        assert!(matches!(
            IndexHeader::parse(b"MMI"),
            Err(CorpusError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_header_rejects_version_and_flag() {
        let mut bytes = sample_header().to_bytes();
        bytes[9] = 2;
        assert!(matches!(
            IndexHeader::parse(&bytes),
            Err(CorpusError::UnsupportedVersion { found: 2, .. })
        ));

        let mut bytes = sample_header().to_bytes();
        bytes[42] = 7;
        assert!(matches!(IndexHeader::parse(&bytes), Err(CorpusError::BadFlag(7))));

        let mut bytes = sample_header().to_bytes();
        bytes[17] = 0;
        assert!(matches!(IndexHeader::parse(&bytes), Err(CorpusError::UnknownDtype(0))));
    }

    #[test]
    fn test_header_rejects_zero_chunk_size() {
        let header = IndexHeader {
            chunk_size: 0,
            ..sample_header()
        };
        let err = IndexHeader::parse(&header.to_bytes()).unwrap_err();
        assert!(matches!(err, CorpusError::Corrupt(_)));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_header_truncated() {
        let bytes = sample_header().to_bytes();
        assert!(matches!(
            IndexHeader::parse(&bytes[..30]),
            Err(CorpusError::Truncated { .. })
        ));
    }

    #[test]
    fn test_layout_offsets() {
        let layout = sample_header().layout().unwrap();
        assert_eq!(layout.sizes, 43..51);
        assert_eq!(layout.pointers, 51..67);
        assert_eq!(layout.chunk_id_starts, 67..83);
        assert_eq!(layout.chunk_addresses, 83..107);
        assert_eq!(layout.file_len(), 107);
    }

    #[test]
    fn test_layout_overflow_is_corrupt() {
        let header = IndexHeader {
            num_documents: u64::MAX / 2,
            ..sample_header()
        };
        assert!(matches!(header.layout(), Err(CorpusError::Corrupt(_))));
    }

    #[test]
    fn test_parse_with_layout_length_checks() {
        let mut bytes = sample_header().to_bytes().to_vec();
        bytes.resize(106, 0);
        assert!(matches!(
            IndexHeader::parse_with_layout(&bytes),
            Err(CorpusError::Truncated { needed: 107, found: 106, .. })
        ));
        bytes.resize(108, 0);
        assert!(matches!(
            IndexHeader::parse_with_layout(&bytes),
            Err(CorpusError::Corrupt(_))
        ));
        bytes.truncate(107);
        assert!(IndexHeader::parse_with_layout(&bytes).is_ok());
    }

    #[test]
    fn test_le_array() {
        let mut bytes = Vec::new();
        for v in [3i64, -1, 40] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        // Deliberately misaligned start
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);
        let view: LeArray<'_, i64> = LeArray::new(&shifted[1..]);
        assert_eq!(view.len(), 3);
        assert_eq!(view.get(1), Some(-1));
        assert_eq!(view.get(3), None);
        assert_eq!(view.to_vec(), vec![3, -1, 40]);
    }

    #[test]
    fn test_span_resolve() {
        assert_eq!(Span::new(1, 3).resolve(5, "document").unwrap(), 1..3);
        assert_eq!(Span::new(2, 2).resolve(2, "document").unwrap(), 2..2);
        assert!(matches!(
            Span::new(0, 4).step_by(2).resolve(5, "document"),
            Err(CorpusError::InvalidArgument(_))
        ));
        assert!(matches!(
            Span::new(3, 6).resolve(5, "document"),
            Err(CorpusError::OutOfBounds { .. })
        ));
        assert!(matches!(
            Span::new(3, 1).resolve(5, "document"),
            Err(CorpusError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_span_parse() {
        assert_eq!("2:5".parse::<Span>().unwrap(), Span::new(2, 5));
        assert_eq!("0:8:2".parse::<Span>().unwrap(), Span::new(0, 8).step_by(2));
        assert!("7".parse::<Span>().is_err());
        assert!("a:b".parse::<Span>().is_err());
    }

    #[test]
    fn test_prefix_paths() {
        let prefix = Path::new("/data/corpus.v1");
        assert_eq!(index_file_path(prefix), PathBuf::from("/data/corpus.v1.idx"));
        assert_eq!(data_file_path(prefix), PathBuf::from("/data/corpus.v1.bin"));
    }
}
