use thiserror::Error;

/// Pipeline error taxonomy.
///
/// Variants that invalidate the whole spreadsheet side (`Format`, `Encoding`,
/// `HeaderNotFound`, `UnresolvedColumn`) abort a batch before any PDF work
/// begins. `UnreadablePdf` is file-scoped and recorded in the match report
/// instead of aborting the batch. Row-scoped failures are not errors at all;
/// they travel as [`crate::types::RowError`] values. Ambiguity is an expected
/// outcome, never an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unrecognized or corrupt file '{filename}': {reason}")]
    Format { filename: String, reason: String },

    #[error("no configured text encoding decodes '{filename}' (tried: {tried:?})")]
    Encoding { filename: String, tried: Vec<String> },

    #[error("no qualifying header row in '{filename}' within the first {scanned} rows")]
    HeaderNotFound { filename: String, scanned: usize },

    #[error("required field '{field}' matches no column in '{table}' (available: {available:?})")]
    UnresolvedColumn {
        field: String,
        table: String,
        available: Vec<String>,
    },

    #[error("cannot read PDF '{filename}': {reason}")]
    UnreadablePdf { filename: String, reason: String },

    #[error("invalid order-id pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
