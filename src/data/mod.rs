//! Data storage modules.

pub mod storage;

pub use storage::{CsvWriter, ReadingWriter, SaveOutcome};
