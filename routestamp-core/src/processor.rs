use crate::annotator::LabelAnnotator;
use crate::config::ProcessingConfig;
use crate::error::PipelineError;
use crate::ingest::TabularIngestor;
use crate::matcher::OrderIndex;
use crate::template::TemplateMapper;
use crate::types::*;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

/// Hex SHA-256 of raw input bytes, recorded in the match report so a batch
/// can be tied back to the exact files that produced it.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// One PDF submitted to a batch, already read into memory.
#[derive(Debug, Clone)]
pub struct PdfInput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Simple profiler that collects timings for pipeline steps
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl StepProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        self.timings.push((step_name.to_string(), elapsed));
        println!("⏱️  {}: {:.0}ms", step_name, elapsed.as_millis());

        result
    }

    pub fn print_summary(&self) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        println!("\n📊 Performance Summary:");
        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();

        for (step, duration) in &self.timings {
            let percentage = (duration.as_secs_f64() / total.as_secs_f64()) * 100.0;
            println!(
                "   {:.<35} {:.0}ms ({:.1}%)",
                step,
                duration.as_millis(),
                percentage
            );
        }
        println!("   {:.<35} {:.0}ms", "Total", total.as_millis());
    }
}

/// Coordinates a whole batch: spreadsheet → records → index → stamped PDFs.
///
/// Spreadsheet-side failures abort the run before any PDF is touched; an
/// unreadable PDF is recorded as a file error and the rest of the batch
/// continues. PDFs are processed in submission order so the report and the
/// output listing are deterministic.
pub struct BatchProcessor {
    config: ProcessingConfig,
    profiling: bool,
}

impl BatchProcessor {
    pub fn new(config: ProcessingConfig) -> Self {
        Self {
            config,
            profiling: false,
        }
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    pub fn run(
        &self,
        table_bytes: &[u8],
        table_filename: &str,
        template: &Template,
        pdfs: &[PdfInput],
    ) -> Result<BatchResult, PipelineError> {
        let start_time = Instant::now();
        let mut profiler = StepProfiler::new(self.profiling);

        println!("📄 Processing batch: {} + {} PDF(s)", table_filename, pdfs.len());

        // Stage 1: Ingest the spreadsheet upload
        let ingestor = TabularIngestor::new(
            self.config.header_detection.clone(),
            self.config.encoding.clone(),
        );
        let tables = profiler.time_step("1. Spreadsheet Ingestion", || {
            ingestor.ingest(table_bytes, table_filename)
        })?;

        // Stage 2: Template mapping
        let mapper = TemplateMapper;
        let (records, row_errors) = profiler.time_step("2. Template Mapping", || {
            let mut records = Vec::new();
            let mut row_errors = Vec::new();
            for table in &tables {
                let (mut recs, mut errs) = mapper.apply(table, template)?;
                records.append(&mut recs);
                row_errors.append(&mut errs);
            }
            Ok::<_, PipelineError>((records, row_errors))
        })?;
        println!(
            "📋 Mapped {} record(s) through template '{}'",
            records.len(),
            template.name
        );
        if !row_errors.is_empty() {
            println!("⚠️  {} row(s) failed validation", row_errors.len());
        }

        // Stage 3: Order index
        let index = profiler.time_step("3. Order Index", || {
            OrderIndex::build(&records, &self.config.matching.key_field)
        });
        println!("📋 Indexed {} distinct order id(s)", index.len());

        // Stage 4: Match and stamp each PDF, continuing past unreadable files
        let annotator = LabelAnnotator::new(
            &self.config.order_id,
            &self.config.matching,
            &self.config.stamp,
        )?;
        let mut annotated_pdfs = Vec::new();
        let mut decisions = Vec::new();
        let mut file_errors = Vec::new();
        for pdf in pdfs {
            let outcome = profiler.time_step(&format!("4. Stamp {}", pdf.filename), || {
                annotator.match_and_stamp(&pdf.bytes, &pdf.filename, &index, &records)
            });
            match outcome {
                Ok((bytes, mut file_decisions)) => {
                    decisions.append(&mut file_decisions);
                    annotated_pdfs.push(AnnotatedPdf {
                        filename: pdf.filename.clone(),
                        bytes,
                    });
                }
                Err(PipelineError::UnreadablePdf { filename, reason }) => {
                    println!("⚠️  Skipping unreadable PDF {}: {}", filename, reason);
                    file_errors.push(FileError {
                        filename,
                        error: reason,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        let summary = MatchReport::summarize(&decisions);
        println!(
            "🎯 {} matched / {} unmatched / {} ambiguous across {} page(s)",
            summary.matched, summary.unmatched, summary.ambiguous, summary.pages
        );

        let report = MatchReport {
            schema_version: SCHEMA_VERSION.to_string(),
            template: template.name.clone(),
            spreadsheet_sha256: content_hash(table_bytes),
            pdf_digests: pdfs
                .iter()
                .map(|p| FileDigest {
                    filename: p.filename.clone(),
                    sha256: content_hash(&p.bytes),
                })
                .collect(),
            decisions,
            file_errors,
            summary,
        };

        profiler.print_summary();
        println!(
            "⏱️  Total processing time: {:.3}s",
            start_time.elapsed().as_secs_f64()
        );

        Ok(BatchResult {
            annotated_pdfs,
            report,
            row_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_input_sensitive() {
        let a = content_hash(b"OrderID,Stop\n1001,7\n");
        let b = content_hash(b"OrderID,Stop\n1001,7\n");
        let c = content_hash(b"OrderID,Stop\n1001,8\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn disabled_profiler_passes_results_through() {
        let mut profiler = StepProfiler::new(false);
        let value = profiler.time_step("noop", || 42);
        assert_eq!(value, 42);
    }
}
