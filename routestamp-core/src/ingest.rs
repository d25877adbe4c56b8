//! Tabular ingestion: raw upload bytes → [`RawTable`]s.
//!
//! Accepts CSV, Excel workbooks (xls/xlsx), or a zip archive holding several
//! of either. CSV text is decoded by walking a configured encoding priority
//! list; the true header row is located by scanning from the top. The parse
//! is pure: no filesystem or network access.

use crate::config::{EncodingConfig, HeaderDetectionConfig};
use crate::error::PipelineError;
use crate::types::RawTable;
use calamine::{open_workbook_auto_from_rs, DataType, Reader};
use std::io::{Cursor, Read as IoRead};

/// What kind of tabular container a filename claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Csv,
    Workbook,
    Archive,
}

fn classify(filename: &str) -> Option<SourceKind> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".csv") {
        Some(SourceKind::Csv)
    } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
        Some(SourceKind::Workbook)
    } else if lower.ends_with(".zip") {
        Some(SourceKind::Archive)
    } else {
        None
    }
}

fn non_empty_cells(row: &[String]) -> usize {
    row.iter().filter(|c| !c.trim().is_empty()).count()
}

/// Does `row` have a non-empty cell in a column position that is also
/// non-empty in `header`? Used to reject title/caption rows, which have
/// no data underneath them.
fn confirms_header(header: &[String], row: &[String]) -> bool {
    header.iter().zip(row.iter()).any(|(h, c)| {
        !h.trim().is_empty() && !c.trim().is_empty()
    })
}

pub struct TabularIngestor {
    header: HeaderDetectionConfig,
    encoding: EncodingConfig,
}

impl TabularIngestor {
    pub fn new(header: HeaderDetectionConfig, encoding: EncodingConfig) -> Self {
        Self { header, encoding }
    }

    /// Parse an upload into one table per contained file.
    ///
    /// A CSV or workbook yields exactly one table (first sheet for
    /// workbooks); a zip archive yields one per recognized entry.
    pub fn ingest(&self, bytes: &[u8], filename: &str) -> Result<Vec<RawTable>, PipelineError> {
        match classify(filename) {
            Some(SourceKind::Csv) => Ok(vec![self.ingest_csv(bytes, filename)?]),
            Some(SourceKind::Workbook) => Ok(vec![self.ingest_workbook(bytes, filename)?]),
            Some(SourceKind::Archive) => self.ingest_archive(bytes, filename),
            None => Err(PipelineError::Format {
                filename: filename.to_string(),
                reason: "unsupported file type (expected .csv, .xls, .xlsx, or .zip)".to_string(),
            }),
        }
    }

    /// Decode CSV bytes with the first configured encoding that succeeds
    /// without producing replacement characters.
    fn decode(&self, bytes: &[u8], filename: &str) -> Result<String, PipelineError> {
        let mut tried = Vec::new();
        for label in &self.encoding.priority {
            tried.push(label.clone());
            let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) else {
                continue;
            };
            let (text, _, had_errors) = encoding.decode(bytes);
            if !had_errors {
                return Ok(text.into_owned());
            }
        }
        Err(PipelineError::Encoding {
            filename: filename.to_string(),
            tried,
        })
    }

    fn ingest_csv(&self, bytes: &[u8], source: &str) -> Result<RawTable, PipelineError> {
        let text = self.decode(bytes, source)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let rows = reader.records().map(|record| match record {
            Ok(r) => Ok(r.iter().map(str::to_string).collect::<Vec<_>>()),
            Err(e) => Err(PipelineError::Format {
                filename: source.to_string(),
                reason: format!("malformed CSV: {e}"),
            }),
        });
        self.assemble(rows, source)
    }

    fn ingest_workbook(&self, bytes: &[u8], filename: &str) -> Result<RawTable, PipelineError> {
        let cursor = Cursor::new(bytes.to_vec());
        let mut workbook =
            open_workbook_auto_from_rs(cursor).map_err(|e| PipelineError::Format {
                filename: filename.to_string(),
                reason: format!("could not open workbook: {e}"),
            })?;
        let sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::Format {
                filename: filename.to_string(),
                reason: "workbook has no sheets".to_string(),
            })?;
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| PipelineError::Format {
                filename: filename.to_string(),
                reason: format!("could not read sheet '{sheet}': {e}"),
            })?;
        let rows = range.rows().map(|row| {
            Ok(row
                .iter()
                .map(|cell| cell.as_string().unwrap_or_default())
                .collect::<Vec<_>>())
        });
        self.assemble(rows, &format!("{filename}#{sheet}"))
    }

    fn ingest_archive(&self, bytes: &[u8], filename: &str) -> Result<Vec<RawTable>, PipelineError> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| PipelineError::Format {
                filename: filename.to_string(),
                reason: format!("could not open zip archive: {e}"),
            })?;

        let mut tables = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| PipelineError::Format {
                filename: filename.to_string(),
                reason: format!("could not read archive entry {i}: {e}"),
            })?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let base = name.rsplit('/').next().unwrap_or(&name);
            if base.starts_with('.') || name.starts_with("__MACOSX") {
                continue;
            }
            // Nested archives and unrecognized entries are skipped.
            let Some(kind) = classify(base) else { continue };
            if kind == SourceKind::Archive {
                continue;
            }
            let mut entry_bytes = Vec::new();
            entry
                .read_to_end(&mut entry_bytes)
                .map_err(|e| PipelineError::Format {
                    filename: filename.to_string(),
                    reason: format!("could not extract '{name}': {e}"),
                })?;
            let entry_source = format!("{filename}/{name}");
            let table = match kind {
                SourceKind::Csv => self.ingest_csv(&entry_bytes, &entry_source)?,
                _ => self.ingest_workbook(&entry_bytes, &entry_source)?,
            };
            tables.push(table);
        }

        if tables.is_empty() {
            return Err(PipelineError::Format {
                filename: filename.to_string(),
                reason: "archive contains no CSV or workbook entries".to_string(),
            });
        }
        Ok(tables)
    }

    /// Consume rows from the top, locate the header, and keep everything
    /// after it. Rows before the header are dropped as they stream past.
    fn assemble(
        &self,
        rows: impl Iterator<Item = Result<Vec<String>, PipelineError>>,
        source: &str,
    ) -> Result<RawTable, PipelineError> {
        let min_cells = self.header.min_header_cells;
        let window = self.header.scan_window;

        let mut index = 0usize;
        let mut candidate: Option<Vec<String>> = None;
        let mut header: Option<(usize, Vec<String>)> = None;
        let mut data: Vec<Vec<String>> = Vec::new();

        for row in rows {
            let row = row?;

            if header.is_some() {
                data.push(row);
                index += 1;
                continue;
            }

            if let Some(cand) = candidate.take() {
                if confirms_header(&cand, &row) {
                    let headers = cand.iter().map(|c| c.trim().to_string()).collect();
                    header = Some((index - 1, headers));
                    data.push(row);
                    index += 1;
                    continue;
                }
            }

            if index >= window {
                return Err(PipelineError::HeaderNotFound {
                    filename: source.to_string(),
                    scanned: window,
                });
            }
            if non_empty_cells(&row) >= min_cells {
                candidate = Some(row);
            }
            index += 1;
        }

        match header {
            Some((header_row, headers)) => Ok(RawTable {
                source: source.to_string(),
                header_row,
                headers,
                rows: data,
            }),
            None => Err(PipelineError::HeaderNotFound {
                filename: source.to_string(),
                scanned: index.min(window),
            }),
        }
    }
}
