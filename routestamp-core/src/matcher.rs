//! Order-id detection and record lookup.

use crate::error::PipelineError;
use crate::types::CanonicalRecord;
use regex::Regex;
use std::collections::BTreeMap;

/// Canonicalize an order identifier for lookup: alphanumerics only,
/// lowercased. "#1001", "1001 " and "ORD-1001"-vs-"ord1001" all collapse
/// to the same key.
pub fn normalize_order_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Finds order identifiers in extracted page text.
#[derive(Debug)]
pub struct OrderIdDetector {
    pattern: Regex,
}

impl OrderIdDetector {
    pub fn new(pattern: &str) -> Result<Self, PipelineError> {
        let pattern = Regex::new(pattern).map_err(|e| PipelineError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { pattern })
    }

    /// First match in reading order. When the pattern defines a capture
    /// group, group 1 is the id; otherwise the whole match is.
    pub fn detect(&self, text: &str) -> Option<String> {
        let caps = self.pattern.captures(text)?;
        let m = caps.get(1).or_else(|| caps.get(0))?;
        Some(m.as_str().to_string())
    }
}

/// Result of looking an order id up in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// No record carries this id.
    Missing,
    /// Exactly one record (index into the record slice the index was
    /// built over).
    Unique(usize),
    /// Two or more records share the id. Deliberately unresolvable:
    /// guessing a stop number would misroute a parcel.
    Ambiguous,
}

/// Normalized order id → positions of the records that carry it.
///
/// Built once per batch from the mapped records; invalid records and
/// records with an empty key never enter the index.
pub struct OrderIndex {
    entries: BTreeMap<String, Vec<usize>>,
}

impl OrderIndex {
    pub fn build(records: &[CanonicalRecord], key_field: &str) -> Self {
        let mut entries: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, record) in records.iter().enumerate() {
            if !record.valid {
                continue;
            }
            let Some(raw) = record.fields.get(key_field) else {
                continue;
            };
            let key = normalize_order_id(raw);
            if key.is_empty() {
                continue;
            }
            entries.entry(key).or_default().push(i);
        }
        Self { entries }
    }

    pub fn lookup(&self, raw_id: &str) -> Lookup {
        match self.entries.get(&normalize_order_id(raw_id)) {
            None => Lookup::Missing,
            Some(positions) if positions.len() == 1 => Lookup::Unique(positions[0]),
            Some(_) => Lookup::Ambiguous,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
