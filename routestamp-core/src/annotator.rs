//! Label matching and PDF stamping.
//!
//! For each page of an input PDF the annotator extracts the text layer,
//! detects an order identifier, looks it up in the batch's [`OrderIndex`],
//! and composites the matched record's stamp text onto the page as a text
//! overlay. The original page content is never modified; the overlay is an
//! extra content stream appended after the existing ones.

use crate::config::{MatchConfig, OrderIdConfig, StampConfig};
use crate::error::PipelineError;
use crate::matcher::{Lookup, OrderIdDetector, OrderIndex};
use crate::types::{CanonicalRecord, LabelPage, MatchDecision, MatchOutcome};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

const STAMP_FONT_KEY: &str = "Fstamp";

/// Pull a page attribute, following the Parent chain for inherited values.
fn inherited_attr<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    loop {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        let parent = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
}

fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Height of the page's MediaBox in points. US Letter when absent, which
/// only happens for malformed files.
fn page_height(doc: &Document, page_id: ObjectId) -> f32 {
    let media_box = inherited_attr(doc, page_id, b"MediaBox")
        .map(|obj| match obj {
            Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
            other => other,
        })
        .and_then(|obj| obj.as_array().ok());
    if let Some(arr) = media_box {
        if arr.len() == 4 {
            if let (Some(y0), Some(y1)) = (as_number(&arr[1]), as_number(&arr[3])) {
                return y1 - y0;
            }
        }
    }
    792.0
}

/// The page's effective Resources dictionary (direct or inherited),
/// with references resolved, cloned for editing.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited_attr(doc, page_id, b"Resources")
        .map(|obj| match obj {
            Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
            other => other,
        })
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

pub struct LabelAnnotator {
    detector: OrderIdDetector,
    matching: MatchConfig,
    stamp: StampConfig,
}

impl LabelAnnotator {
    pub fn new(
        order_id: &OrderIdConfig,
        matching: &MatchConfig,
        stamp: &StampConfig,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            detector: OrderIdDetector::new(&order_id.pattern)?,
            matching: matching.clone(),
            stamp: stamp.clone(),
        })
    }

    /// Split a PDF into per-page text with detected order ids.
    pub fn extract_pages(
        &self,
        doc: &Document,
        filename: &str,
    ) -> Result<Vec<(ObjectId, LabelPage)>, PipelineError> {
        if doc.is_encrypted() {
            return Err(PipelineError::UnreadablePdf {
                filename: filename.to_string(),
                reason: "document is encrypted".to_string(),
            });
        }
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(PipelineError::UnreadablePdf {
                filename: filename.to_string(),
                reason: "document has no pages".to_string(),
            });
        }
        let mut out = Vec::with_capacity(pages.len());
        for (page_number, page_id) in pages {
            // A page whose text layer cannot be decoded is still a page;
            // it just detects no order id.
            let extracted_text = doc.extract_text(&[page_number]).unwrap_or_default();
            let detected_order_id = self.detector.detect(&extracted_text);
            out.push((
                page_id,
                LabelPage {
                    page_number,
                    extracted_text,
                    detected_order_id,
                },
            ));
        }
        Ok(out)
    }

    /// Match every page of `bytes` against the index and stamp the matched
    /// ones. Returns the (possibly re-serialized) PDF and one decision per
    /// page in page order. When no page gets a stamp the input bytes are
    /// returned untouched.
    pub fn match_and_stamp(
        &self,
        bytes: &[u8],
        filename: &str,
        index: &OrderIndex,
        records: &[CanonicalRecord],
    ) -> Result<(Vec<u8>, Vec<MatchDecision>), PipelineError> {
        let mut doc = Document::load_mem(bytes).map_err(|e| PipelineError::UnreadablePdf {
            filename: filename.to_string(),
            reason: e.to_string(),
        })?;

        let mut decisions = Vec::new();
        let mut stamps: Vec<(ObjectId, String)> = Vec::new();

        for (page_id, page) in self.extract_pages(&doc, filename)? {
            let (outcome, matched_record, stamp_text) = match &page.detected_order_id {
                None => (MatchOutcome::Unmatched, None, None),
                Some(id) => match index.lookup(id) {
                    Lookup::Missing => (MatchOutcome::Unmatched, None, None),
                    Lookup::Ambiguous => (MatchOutcome::Ambiguous, None, None),
                    Lookup::Unique(pos) => {
                        let record = &records[pos];
                        // Matched but nothing to print: leave the page as-is
                        // rather than stamping a placeholder.
                        let text = record
                            .fields
                            .get(&self.matching.stamp_field)
                            .map(|v| v.trim())
                            .filter(|v| !v.is_empty())
                            .map(str::to_string);
                        (MatchOutcome::Matched, Some(record.clone()), text)
                    }
                },
            };
            if let Some(text) = &stamp_text {
                stamps.push((page_id, text.clone()));
            }
            decisions.push(MatchDecision {
                file: filename.to_string(),
                page_number: page.page_number,
                outcome,
                detected_order_id: page.detected_order_id,
                matched_record,
                stamp_text,
            });
        }

        if stamps.is_empty() {
            return Ok((bytes.to_vec(), decisions));
        }

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => self.stamp.font_family.as_str(),
        });
        for (page_id, text) in stamps {
            self.stamp_page(&mut doc, page_id, font_id, &text, filename)?;
        }

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| PipelineError::UnreadablePdf {
                filename: filename.to_string(),
                reason: format!("could not serialize annotated document: {e}"),
            })?;
        Ok((out, decisions))
    }

    fn stamp_page(
        &self,
        doc: &mut Document,
        page_id: ObjectId,
        font_id: ObjectId,
        text: &str,
        filename: &str,
    ) -> Result<(), PipelineError> {
        let s = &self.stamp;
        let x = s.x_position;
        // Configured as distance from the top edge; PDF origin is bottom-left.
        let y = page_height(doc, page_id) - s.y_position - s.font_size;
        let (r, g, b) = (
            s.text_color.r as f32 / 255.0,
            s.text_color.g as f32 / 255.0,
            s.text_color.b as f32 / 255.0,
        );

        let overlay = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![STAMP_FONT_KEY.into(), s.font_size.into()]),
                Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                Operation::new("Td", vec![x.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = overlay
            .encode()
            .map_err(|e| PipelineError::UnreadablePdf {
                filename: filename.to_string(),
                reason: format!("could not encode overlay stream: {e}"),
            })?;

        // Materialize the effective resources on the page itself so the
        // overlay font is visible without disturbing inherited entries.
        let mut resources = effective_resources(doc, page_id);
        let mut fonts = match resources.get(b"Font") {
            Ok(Object::Reference(id)) => doc.get_dictionary(*id).cloned().unwrap_or_default(),
            Ok(Object::Dictionary(d)) => d.clone(),
            _ => Dictionary::new(),
        };
        fonts.set(STAMP_FONT_KEY, Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        let overlay_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| PipelineError::UnreadablePdf {
                filename: filename.to_string(),
                reason: format!("page object is not a dictionary: {e}"),
            })?;
        page.set("Resources", Object::Dictionary(resources));

        let mut contents = match page.get(b"Contents") {
            Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
            Ok(Object::Array(existing)) => existing.clone(),
            _ => vec![],
        };
        contents.push(Object::Reference(overlay_id));
        page.set("Contents", Object::Array(contents));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchConfig, OrderIdConfig, StampConfig};
    use std::collections::BTreeMap;

    /// Minimal multi-page PDF with one line of text per page.
    fn label_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            // lopdf's extract_text only emits a line break on ET, so each
            // line needs its own BT..ET block to stay separate.
            let mut operations = Vec::new();
            for (i, line) in text.lines().enumerate() {
                operations.extend([
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), (720 - 14 * i as i64).into()]),
                    Operation::new("Tj", vec![Object::string_literal(line)]),
                    Operation::new("ET", vec![]),
                ]);
            }
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn record(order_id: &str, stop: &str) -> CanonicalRecord {
        let mut fields = BTreeMap::new();
        fields.insert("order_reference".to_string(), order_id.to_string());
        fields.insert("stop_number".to_string(), stop.to_string());
        CanonicalRecord {
            row_index: 2,
            fields,
            valid: true,
        }
    }

    fn annotator() -> LabelAnnotator {
        LabelAnnotator::new(
            &OrderIdConfig::default(),
            &MatchConfig::default(),
            &StampConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn matched_page_gets_stamped() {
        let pdf = label_pdf(&["Order #1001 - 12 Main St"]);
        let records = vec![record("1001", "7")];
        let index = OrderIndex::build(&records, "order_reference");

        let (out, decisions) = annotator()
            .match_and_stamp(&pdf, "labels.pdf", &index, &records)
            .unwrap();

        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].outcome, MatchOutcome::Matched);
        assert_eq!(decisions[0].detected_order_id.as_deref(), Some("#1001"));
        assert_eq!(decisions[0].stamp_text.as_deref(), Some("7"));
        assert_ne!(out, pdf);

        let stamped = Document::load_mem(&out).unwrap();
        assert_eq!(stamped.get_pages().len(), 1);
        let text = stamped.extract_text(&[1]).unwrap();
        assert!(text.contains('7'), "stamp text missing from {text:?}");
        assert!(text.contains("1001"), "original text lost from {text:?}");
    }

    #[test]
    fn lines_stay_separate_in_extracted_text() {
        // "12 Main St" directly after the id would merge into #100112 if
        // line breaks were lost during extraction.
        let pdf = label_pdf(&["Order #1001\n12 Main St"]);
        let records = vec![record("1001", "7")];
        let index = OrderIndex::build(&records, "order_reference");

        let (_, decisions) = annotator()
            .match_and_stamp(&pdf, "labels.pdf", &index, &records)
            .unwrap();
        assert_eq!(decisions[0].detected_order_id.as_deref(), Some("#1001"));
        assert_eq!(decisions[0].outcome, MatchOutcome::Matched);
    }

    #[test]
    fn unmatched_only_file_returns_input_bytes() {
        let pdf = label_pdf(&["no order number here"]);
        let records = vec![record("1001", "7")];
        let index = OrderIndex::build(&records, "order_reference");

        let (out, decisions) = annotator()
            .match_and_stamp(&pdf, "labels.pdf", &index, &records)
            .unwrap();
        assert_eq!(out, pdf);
        assert_eq!(decisions[0].outcome, MatchOutcome::Unmatched);
        assert!(decisions[0].detected_order_id.is_none());
    }

    #[test]
    fn ambiguous_id_is_not_stamped() {
        let pdf = label_pdf(&["Order 1001"]);
        let records = vec![record("1001", "7"), record("#1001", "8")];
        let index = OrderIndex::build(&records, "order_reference");

        let (out, decisions) = annotator()
            .match_and_stamp(&pdf, "labels.pdf", &index, &records)
            .unwrap();
        assert_eq!(out, pdf);
        assert_eq!(decisions[0].outcome, MatchOutcome::Ambiguous);
        assert!(decisions[0].stamp_text.is_none());
        assert!(decisions[0].matched_record.is_none());
    }

    #[test]
    fn matched_record_with_empty_stamp_field_stays_untouched() {
        let pdf = label_pdf(&["Order 1001"]);
        let records = vec![record("1001", "  ")];
        let index = OrderIndex::build(&records, "order_reference");

        let (out, decisions) = annotator()
            .match_and_stamp(&pdf, "labels.pdf", &index, &records)
            .unwrap();
        assert_eq!(out, pdf);
        assert_eq!(decisions[0].outcome, MatchOutcome::Matched);
        assert!(decisions[0].matched_record.is_some());
        assert!(decisions[0].stamp_text.is_none());
    }

    #[test]
    fn pages_decide_independently() {
        let pdf = label_pdf(&["Order 1001", "nothing", "Order 2002"]);
        let records = vec![record("1001", "7"), record("2002", "9")];
        let index = OrderIndex::build(&records, "order_reference");

        let (_, decisions) = annotator()
            .match_and_stamp(&pdf, "labels.pdf", &index, &records)
            .unwrap();
        let outcomes: Vec<_> = decisions.iter().map(|d| d.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                MatchOutcome::Matched,
                MatchOutcome::Unmatched,
                MatchOutcome::Matched
            ]
        );
        assert_eq!(decisions[2].page_number, 3);
        assert_eq!(decisions[2].stamp_text.as_deref(), Some("9"));
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let records = vec![record("1001", "7")];
        let index = OrderIndex::build(&records, "order_reference");
        let err = annotator()
            .match_and_stamp(b"not a pdf at all", "junk.pdf", &index, &records)
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnreadablePdf { .. }));
    }

    #[test]
    fn stamped_output_is_deterministic() {
        let pdf = label_pdf(&["Order 1001"]);
        let records = vec![record("1001", "7")];
        let index = OrderIndex::build(&records, "order_reference");
        let a = annotator();

        let (first, _) = a.match_and_stamp(&pdf, "labels.pdf", &index, &records).unwrap();
        let (second, _) = a.match_and_stamp(&pdf, "labels.pdf", &index, &records).unwrap();
        assert_eq!(first, second);
    }
}
