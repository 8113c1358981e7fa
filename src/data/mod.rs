//! Dataset loading.

pub mod tsv_loader;

pub use tsv_loader::{DatasetSummary, LoadReport};
