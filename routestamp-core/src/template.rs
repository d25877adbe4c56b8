//! Template mapping: raw table columns → canonical records.

use crate::error::PipelineError;
use crate::types::{CanonicalRecord, RawTable, RowError, Template};
use std::collections::BTreeMap;

/// Suggest a column-to-field mapping from a table's headers alone.
///
/// Returns the trimmed, non-empty headers in column order. Guessing which
/// header means what is left to the operator; the proposal just puts the
/// real column names in front of them.
pub fn propose(table: &RawTable) -> Vec<String> {
    table
        .headers
        .iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect()
}

pub struct TemplateMapper;

impl TemplateMapper {
    /// Resolve a canonical field's source column to a position in `headers`.
    /// Exact match wins; a case-insensitive match is accepted as a fallback.
    fn resolve_column(headers: &[String], source_column: &str) -> Option<usize> {
        if let Some(i) = headers.iter().position(|h| h == source_column) {
            return Some(i);
        }
        let wanted = source_column.to_lowercase();
        headers.iter().position(|h| h.to_lowercase() == wanted)
    }

    /// Apply a template to a table, producing one record per data row.
    ///
    /// A required field whose source column does not exist in the table at
    /// all is fatal for the whole table. A required field that resolves but
    /// is empty in a particular row invalidates only that row: the record is
    /// still emitted (with `valid = false`) alongside a [`RowError`], so the
    /// failure is visible in the audit trail. Blank rows are skipped.
    pub fn apply(
        &self,
        table: &RawTable,
        template: &Template,
    ) -> Result<(Vec<CanonicalRecord>, Vec<RowError>), PipelineError> {
        // field → column index, for fields whose column exists.
        let mut columns: BTreeMap<&str, usize> = BTreeMap::new();
        for (field, source_column) in &template.column_map {
            match Self::resolve_column(&table.headers, source_column) {
                Some(i) => {
                    columns.insert(field.as_str(), i);
                }
                None if template.required_fields.contains(field) => {
                    return Err(PipelineError::UnresolvedColumn {
                        field: field.clone(),
                        table: table.source.clone(),
                        available: table.headers.clone(),
                    });
                }
                // Optional field with no matching column: absent from
                // every record rather than present-and-empty.
                None => {}
            }
        }

        let mut records = Vec::new();
        let mut errors = Vec::new();

        for (i, row) in table.rows.iter().enumerate() {
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            let row_index = table.file_row_number(i);
            let mut fields = BTreeMap::new();
            let mut valid = true;

            for (field, &col) in &columns {
                let value = row.get(col).map(|c| c.trim()).unwrap_or_default();
                if value.is_empty() && template.required_fields.contains(*field) {
                    valid = false;
                    errors.push(RowError {
                        source: table.source.clone(),
                        row_index,
                        field: Some((*field).to_string()),
                        reason: format!("required field '{field}' is empty"),
                    });
                }
                fields.insert((*field).to_string(), value.to_string());
            }

            records.push(CanonicalRecord {
                row_index,
                fields,
                valid,
            });
        }

        Ok((records, errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            source: "runsheet.csv".to_string(),
            header_row: 0,
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn template(map: &[(&str, &str)], required: &[&str]) -> Template {
        Template::new(
            "test",
            map.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            required.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        )
    }

    #[test]
    fn propose_lists_non_empty_headers() {
        let t = table(&["OrderID", "  Driver ", "", "Stop"], &[]);
        assert_eq!(propose(&t), vec!["OrderID", "Driver", "Stop"]);
    }

    #[test]
    fn maps_rows_onto_canonical_fields() {
        let t = table(
            &["OrderID", "Driver", "Stop"],
            &[&["1001", "Alice", "1"], &["1002", "Bob", "2"]],
        );
        let tpl = template(
            &[("order_reference", "OrderID"), ("stop_number", "Stop")],
            &["order_reference"],
        );
        let (records, errors) = TemplateMapper.apply(&t, &tpl).unwrap();
        assert!(errors.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields["order_reference"], "1001");
        assert_eq!(records[1].fields["stop_number"], "2");
        assert_eq!(records[0].row_index, 2);
        assert!(records.iter().all(|r| r.valid));
    }

    #[test]
    fn column_resolution_falls_back_to_case_insensitive() {
        let t = table(&["orderid"], &[&["1001"]]);
        let tpl = template(&[("order_reference", "OrderID")], &["order_reference"]);
        let (records, _) = TemplateMapper.apply(&t, &tpl).unwrap();
        assert_eq!(records[0].fields["order_reference"], "1001");
    }

    #[test]
    fn exact_match_beats_case_insensitive() {
        let t = table(&["ORDERID", "OrderID"], &[&["wrong", "right"]]);
        let tpl = template(&[("order_reference", "OrderID")], &[]);
        let (records, _) = TemplateMapper.apply(&t, &tpl).unwrap();
        assert_eq!(records[0].fields["order_reference"], "right");
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let t = table(&["Driver"], &[&["Alice"]]);
        let tpl = template(&[("order_reference", "OrderID")], &["order_reference"]);
        let err = TemplateMapper.apply(&t, &tpl).unwrap_err();
        match &err {
            PipelineError::UnresolvedColumn { field, table, available } => {
                assert_eq!(field, "order_reference");
                assert_eq!(table, "runsheet.csv");
                assert_eq!(available, &vec!["Driver".to_string()]);
            }
            other => panic!("expected UnresolvedColumn, got {other:?}"),
        }
        // The rendered message carries enough context to fix the upload.
        assert!(err.to_string().contains("runsheet.csv"));
    }

    #[test]
    fn missing_optional_column_is_absent_not_empty() {
        let t = table(&["OrderID"], &[&["1001"]]);
        let tpl = template(
            &[("order_reference", "OrderID"), ("driver", "Driver")],
            &["order_reference"],
        );
        let (records, errors) = TemplateMapper.apply(&t, &tpl).unwrap();
        assert!(errors.is_empty());
        assert!(!records[0].fields.contains_key("driver"));
    }

    #[test]
    fn empty_required_cell_invalidates_only_that_row() {
        let t = table(
            &["OrderID", "Stop"],
            &[&["1001", "1"], &["", "2"], &["1003", "3"]],
        );
        let tpl = template(
            &[("order_reference", "OrderID"), ("stop_number", "Stop")],
            &["order_reference"],
        );
        let (records, errors) = TemplateMapper.apply(&t, &tpl).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].valid);
        assert!(!records[1].valid);
        assert!(records[2].valid);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row_index, 3);
        assert_eq!(errors[0].field.as_deref(), Some("order_reference"));
    }

    #[test]
    fn blank_rows_are_skipped_without_errors() {
        let t = table(
            &["OrderID"],
            &[&["1001"], &["  "], &[""], &["1002"]],
        );
        let tpl = template(&[("order_reference", "OrderID")], &["order_reference"]);
        let (records, errors) = TemplateMapper.apply(&t, &tpl).unwrap();
        assert!(errors.is_empty());
        assert_eq!(records.len(), 2);
        // Row numbers still reflect the original file positions.
        assert_eq!(records[1].row_index, 5);
    }

    #[test]
    fn short_rows_read_as_empty_cells() {
        let t = table(&["OrderID", "Stop"], &[&["1001"]]);
        let tpl = template(
            &[("order_reference", "OrderID"), ("stop_number", "Stop")],
            &["order_reference"],
        );
        let (records, errors) = TemplateMapper.apply(&t, &tpl).unwrap();
        assert!(errors.is_empty());
        assert_eq!(records[0].fields["stop_number"], "");
    }
}
