//! Writing batch results to disk. Output layout is a CLI concern; the core
//! library only ever returns bytes.

use anyhow::Result;
use routestamp_core::BatchResult;
use std::fs;
use std::path::{Path, PathBuf};

/// Default output directory next to the run sheet, timestamped so repeat
/// runs never clobber each other.
pub fn default_output_dir(sheet_path: &str) -> String {
    let stem = Path::new(sheet_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("batch");
    format!(
        "{}_stamped_{}",
        stem,
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    )
}

/// Write every annotated PDF, the match report, and any row errors into
/// `output_dir`. Returns the report path.
pub fn write_batch_result(result: &BatchResult, output_dir: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let dir = Path::new(output_dir);

    for pdf in &result.annotated_pdfs {
        // Inputs may come from different directories; only the base name
        // carries over.
        let base = Path::new(&pdf.filename)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| pdf.filename.clone());
        let path = dir.join(base);
        fs::write(&path, &pdf.bytes)?;
        println!("  💾 {}", path.display());
    }

    let report_path = dir.join("match_report.json");
    fs::write(&report_path, serde_json::to_string_pretty(&result.report)?)?;
    println!("  💾 {}", report_path.display());

    if !result.row_errors.is_empty() {
        let errors_path = dir.join("row_errors.json");
        fs::write(&errors_path, serde_json::to_string_pretty(&result.row_errors)?)?;
        println!("  💾 {}", errors_path.display());
    }

    Ok(report_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use routestamp_core::types::{AnnotatedPdf, MatchReport, MatchSummary};
    use routestamp_core::SCHEMA_VERSION;

    fn empty_result() -> BatchResult {
        BatchResult {
            annotated_pdfs: vec![AnnotatedPdf {
                filename: "in/labels.pdf".to_string(),
                bytes: b"%PDF-".to_vec(),
            }],
            report: MatchReport {
                schema_version: SCHEMA_VERSION.to_string(),
                template: "runsheet".to_string(),
                spreadsheet_sha256: "0".repeat(64),
                pdf_digests: vec![],
                decisions: vec![],
                file_errors: vec![],
                summary: MatchSummary::default(),
            },
            row_errors: vec![],
        }
    }

    #[test]
    fn writes_pdfs_and_report_flattening_paths() {
        let temp_dir = std::env::temp_dir().join("routestamp_test_output");
        std::fs::remove_dir_all(&temp_dir).ok();
        let dir = temp_dir.to_str().unwrap();

        let report_path = write_batch_result(&empty_result(), dir).unwrap();
        assert!(report_path.exists());
        assert!(temp_dir.join("labels.pdf").exists());
        assert!(!temp_dir.join("row_errors.json").exists());

        std::fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn default_output_dir_uses_sheet_stem() {
        let dir = default_output_dir("uploads/monday_run.csv");
        assert!(dir.starts_with("monday_run_stamped_"));
    }
}
