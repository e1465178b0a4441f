pub mod reader;
pub mod stats;
pub mod types;
pub mod writer;

pub use reader::{IndexReader, VerifyReport};
pub use types::*;
pub use writer::IndexWriter;
