//! Corpus data files: building, merging and memory-mapped access.
//!
//! - [`builder`] - Append-only writer that pads documents and finalizes the index
//! - [`store`] - Read-only typed views over a finalized corpus
//! - [`ingest`] - Bulk builds from JSON-lines token files and shard merging

pub mod builder;
pub mod ingest;
pub mod store;

pub use builder::{BuilderConfig, CorpusBuilder, FinalizeSummary};
pub use store::{CorpusStore, StoreOptions};

/// Run `$body` with `$t` bound to the Rust element type of a runtime [`DType`](crate::DType)
#[macro_export]
macro_rules! with_element {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            $crate::DType::U8 => {
                type $t = u8;
                $body
            }
            $crate::DType::I8 => {
                type $t = i8;
                $body
            }
            $crate::DType::I16 => {
                type $t = i16;
                $body
            }
            $crate::DType::I32 => {
                type $t = i32;
                $body
            }
            $crate::DType::I64 => {
                type $t = i64;
                $body
            }
            $crate::DType::F32 => {
                type $t = f32;
                $body
            }
            $crate::DType::F64 => {
                type $t = f64;
                $body
            }
            $crate::DType::U16 => {
                type $t = u16;
                $body
            }
        }
    };
}
