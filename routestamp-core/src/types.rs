use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The schema version stamped on every serialized match report.
/// Bump this when the output shape changes.
pub const SCHEMA_VERSION: &str = "0.1.0";

// ===== TABULAR SIDE =====

/// A parsed tabular upload with its header row resolved.
///
/// Rows before the detected header are already discarded; `rows` holds every
/// row after the header (blank rows included, so original row numbers stay
/// computable), and the header row itself is excluded from `rows`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTable {
    /// Where this table came from: the upload filename, plus the sheet name
    /// for workbooks (e.g. "orders.xlsx#Sheet1") or the archive entry path
    /// for zip uploads (e.g. "batch.zip/monday.csv").
    pub source: String,
    /// 0-based index of the detected header row in the original file.
    pub header_row: usize,
    /// Trimmed cell values of the header row, in column order.
    pub headers: Vec<String>,
    /// Data rows (raw cells, untrimmed), in original order.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// 1-based row number of data row `i` in the original file.
    pub fn file_row_number(&self, data_index: usize) -> usize {
        self.header_row + data_index + 2
    }
}

/// A named, reusable mapping from canonical fields to source column names.
///
/// Identity is the `name`. A template is a value: editing never mutates an
/// existing instance — `edited` produces a new version, so records already
/// produced from the old version are unaffected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    /// canonical field → source column header
    pub column_map: BTreeMap<String, String>,
    /// Canonical fields that must be non-empty in every record.
    pub required_fields: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn new(
        name: impl Into<String>,
        column_map: BTreeMap<String, String>,
        required_fields: BTreeSet<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            column_map,
            required_fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// New version of this template with a replacement column map.
    /// `created_at` is preserved; `updated_at` is refreshed.
    pub fn edited(
        &self,
        column_map: BTreeMap<String, String>,
        required_fields: BTreeSet<String>,
    ) -> Self {
        Self {
            name: self.name.clone(),
            column_map,
            required_fields,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

/// One spreadsheet row mapped onto the canonical schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// 1-based row number in the original file, for audit messages.
    pub row_index: usize,
    /// canonical field → cell value. Optional fields with no resolvable
    /// source column are absent entirely.
    pub fields: BTreeMap<String, String>,
    /// False when a required field was empty for this specific row.
    /// Invalid records are reported, never silently dropped, and are
    /// excluded from order matching.
    pub valid: bool,
}

/// A single row that failed mapping. Non-fatal: the rest of the batch
/// still processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    /// Which table the row came from (see [`RawTable::source`]).
    pub source: String,
    /// 1-based row number in the original file.
    pub row_index: usize,
    /// The canonical field that failed, when the failure is field-scoped.
    pub field: Option<String>,
    pub reason: String,
}

// ===== PDF SIDE =====

/// One page of an input label PDF, enriched with the detected order id.
/// Created during extraction, consumed once by the matcher, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelPage {
    /// 1-based page number within its file.
    pub page_number: u32,
    pub extracted_text: String,
    pub detected_order_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOutcome {
    Matched,
    Unmatched,
    Ambiguous,
}

/// The terminal decision for one label page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDecision {
    /// Filename of the PDF this page belongs to.
    pub file: String,
    /// 1-based page number within that file.
    pub page_number: u32,
    pub outcome: MatchOutcome,
    pub detected_order_id: Option<String>,
    pub matched_record: Option<CanonicalRecord>,
    /// Text composited onto the page. None for unmatched/ambiguous pages,
    /// and for matched records whose stamp field is empty (the page is left
    /// untouched rather than stamped with a placeholder).
    pub stamp_text: Option<String>,
}

/// A whole input PDF that could not be processed (corrupt, encrypted).
/// File-scoped: the rest of the batch still completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileError {
    pub filename: String,
    pub error: String,
}

/// SHA-256 of one input file, recorded for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDigest {
    pub filename: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchSummary {
    pub pages: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
}

/// The definitive audit trail for a batch: one decision per page, in
/// submission order (file order, then page order), plus file-level errors.
/// Contains no timestamps — identical inputs produce identical reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    pub schema_version: String,
    pub template: String,
    pub spreadsheet_sha256: String,
    pub pdf_digests: Vec<FileDigest>,
    pub decisions: Vec<MatchDecision>,
    pub file_errors: Vec<FileError>,
    pub summary: MatchSummary,
}

impl MatchReport {
    pub fn summarize(decisions: &[MatchDecision]) -> MatchSummary {
        let mut summary = MatchSummary {
            pages: decisions.len(),
            ..Default::default()
        };
        for d in decisions {
            match d.outcome {
                MatchOutcome::Matched => summary.matched += 1,
                MatchOutcome::Unmatched => summary.unmatched += 1,
                MatchOutcome::Ambiguous => summary.ambiguous += 1,
            }
        }
        summary
    }
}

/// One annotated output PDF. Filename matches the input it was produced from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedPdf {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Everything a batch run produced. Unreadable PDFs appear in
/// `report.file_errors`, never as silent omissions from `annotated_pdfs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub annotated_pdfs: Vec<AnnotatedPdf>,
    pub report: MatchReport,
    pub row_errors: Vec<RowError>,
}
