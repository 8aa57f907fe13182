//! index-loader: batch loader and query client for benchmarking remote
//! vector indexes.

pub mod backend;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod results;
pub mod types;
mod upload;

pub use error::{LoaderError, Result};
pub use loader::{IndexLoader, LoaderState};
pub use types::{DatasetVector, IndexConfig, IndexParams, UploadFailure, UploadReport};
