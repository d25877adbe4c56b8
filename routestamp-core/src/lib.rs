// Routestamp Core Library
//
// Processes delivery run sheets against PDF shipping labels: ingest a
// spreadsheet, map it through a saved column template, match each label
// page to its order, and stamp the route/stop number onto the page.

pub mod annotator;
pub mod config;
pub mod error;
pub mod ingest;
pub mod matcher;
pub mod processor;
pub mod storage;
pub mod template;
pub mod types;

// Re-export main types and functions for easy use
pub use types::*;
pub use config::ProcessingConfig;
pub use error::PipelineError;
pub use ingest::TabularIngestor;
pub use matcher::{normalize_order_id, Lookup, OrderIdDetector, OrderIndex};
pub use processor::{content_hash, BatchProcessor, PdfInput};
pub use storage::{FileTemplateStore, TemplateStore};
pub use template::{propose, TemplateMapper};
