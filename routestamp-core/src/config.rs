use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

// Default value functions for serde

fn default_min_header_cells() -> usize {
    2
}

fn default_scan_window() -> usize {
    10
}

fn default_encoding_priority() -> Vec<String> {
    vec![
        "utf-8".to_string(),
        "windows-1252".to_string(),
        "iso-8859-1".to_string(),
    ]
}

fn default_order_id_pattern() -> String {
    // Fixed-prefix or bare numeric order references, 4+ digits.
    // A capture group, when present, selects the id out of a wider match.
    r"#?\b\d{4,}\b".to_string()
}

fn default_key_field() -> String {
    "order_reference".to_string()
}

fn default_stamp_field() -> String {
    "stop_number".to_string()
}

fn default_font_family() -> String {
    "Helvetica-Bold".to_string()
}

fn default_font_size() -> f32 {
    48.0
}

fn default_position() -> f32 {
    50.0
}

/// Top-level processing configuration.
///
/// Every detection threshold the pipeline relies on lives here so tests and
/// operators can probe edge cases deterministically; nothing is hard-coded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub header_detection: HeaderDetectionConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub order_id: OrderIdConfig,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub stamp: StampConfig,
}

impl ProcessingConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ProcessingConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from an optional path, falling back to defaults on any failure.
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                println!("⚠️  Failed to load config from {p}: {e}, using defaults");
                Self::default()
            }),
            None => Self::default(),
        }
    }
}

/// Header-row detection thresholds.
///
/// A row qualifies as the header when it has at least `min_header_cells`
/// non-empty cells AND the row after it has a non-empty cell in one of the
/// same column positions (rejects title/caption rows). Scanning gives up
/// after `scan_window` rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderDetectionConfig {
    #[serde(default = "default_min_header_cells")]
    pub min_header_cells: usize,
    #[serde(default = "default_scan_window")]
    pub scan_window: usize,
}

impl Default for HeaderDetectionConfig {
    fn default() -> Self {
        Self {
            min_header_cells: default_min_header_cells(),
            scan_window: default_scan_window(),
        }
    }
}

/// Text encodings to try for CSV content, in priority order.
/// A decode that produces replacement characters counts as a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    #[serde(default = "default_encoding_priority")]
    pub priority: Vec<String>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            priority: default_encoding_priority(),
        }
    }
}

/// How order identifiers are detected in extracted page text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIdConfig {
    /// Regex applied to each page's extracted text; the first match in
    /// reading order wins. Capture group 1 is used when the pattern
    /// defines one, otherwise the whole match.
    #[serde(default = "default_order_id_pattern")]
    pub pattern: String,
}

impl Default for OrderIdConfig {
    fn default() -> Self {
        Self {
            pattern: default_order_id_pattern(),
        }
    }
}

/// Which canonical fields drive matching and stamping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Canonical field whose values are indexed as order identifiers.
    #[serde(default = "default_key_field")]
    pub key_field: String,
    /// Canonical field supplying the stamp text for matched pages
    /// (the route/stop label by default).
    #[serde(default = "default_stamp_field")]
    pub stamp_field: String,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            key_field: default_key_field(),
            stamp_field: default_stamp_field(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for TextColor {
    fn default() -> Self {
        // Red, the conventional route-number ink.
        Self { r: 255, g: 0, b: 0 }
    }
}

/// Placement and styling of the stamped route number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampConfig {
    /// Standard Type1 base font name (e.g. "Helvetica-Bold").
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Points from the left page edge.
    #[serde(default = "default_position")]
    pub x_position: f32,
    /// Points from the TOP page edge (increase to move the stamp down).
    #[serde(default = "default_position")]
    pub y_position: f32,
    #[serde(default)]
    pub text_color: TextColor,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            font_family: default_font_family(),
            font_size: default_font_size(),
            x_position: default_position(),
            y_position: default_position(),
            text_color: TextColor::default(),
        }
    }
}
