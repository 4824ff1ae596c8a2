//! Nearest-threshold classification of BME688 gas resistance readings.
//!
//! Thresholds come from a small CSV file:
//!
//! ```text
//! sample_num,gas_resistance,label
//! 1,12000.0,Clean_Air
//! 2,4500.5,Alcohol
//! ```

use core::fmt::Write;

use heapless::{String, Vec};

pub const MAX_THRESHOLDS: usize = 10;
pub const MAX_LABEL_LEN: usize = 31;
pub const UNKNOWN: &str = "Unknown";
pub const THRESHOLDS_FILE: &str = "GAS.CSV";
pub const CSV_HEADER: &str = "sample_num,gas_resistance,label\n";
pub const ROW_CAPACITY: usize = 96;

/// First whitespace-separated word of `raw`, cut to 31 bytes.
fn label_word(raw: &str) -> Option<String<MAX_LABEL_LEN>> {
    let word = raw.split_whitespace().next()?;
    let mut label = String::new();
    for c in word.chars() {
        if label.push(c).is_err() {
            break;
        }
    }
    Some(label)
}

/// One `sample_num,gas_resistance,label` row, newline terminated, with the
/// resistance to two decimals. The label is reduced to what `Threshold::parse`
/// keeps; `None` when nothing is left of it.
pub fn format_row(sample: u32, resistance: f32, label: &str) -> Option<String<ROW_CAPACITY>> {
    let label = label_word(label)?;
    let mut row = String::new();
    writeln!(row, "{},{:.2},{}", sample, resistance, label).ok()?;
    Some(row)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub sample: u32,
    /// Ω
    pub resistance: f32,
    pub label: String<MAX_LABEL_LEN>,
}

impl Threshold {
    /// Parses `sample_num,gas_resistance,label`. Returns `None` for
    /// malformed rows. The label is the first word of the last field, cut
    /// to 31 bytes.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().splitn(3, ',');
        let sample = fields.next()?.trim().parse().ok()?;
        let resistance = fields.next()?.trim().parse().ok()?;
        let label = label_word(fields.next()?)?;
        Some(Self {
            sample,
            resistance,
            label,
        })
    }
}

#[derive(Debug, Default)]
pub struct GasClassifier {
    thresholds: Vec<Threshold, MAX_THRESHOLDS>,
}

impl GasClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the CSV text, skipping the header line. Rows past the tenth
    /// and malformed rows are ignored. Returns the number of rows kept.
    pub fn load_csv(&mut self, text: &str) -> usize {
        self.thresholds.clear();
        for line in text.lines().skip(1) {
            if self.thresholds.is_full() {
                break;
            }
            if let Some(threshold) = Threshold::parse(line) {
                let _ = self.thresholds.push(threshold);
            }
        }
        self.thresholds.len()
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// Label of the threshold closest to `resistance`, or `"Unknown"` when
    /// no thresholds are loaded.
    pub fn classify(&self, resistance: f32) -> &str {
        self.thresholds
            .iter()
            .min_by(|a, b| {
                let da = libm::fabsf(a.resistance - resistance);
                let db = libm::fabsf(b.resistance - resistance);
                da.total_cmp(&db)
            })
            .map_or(UNKNOWN, |t| t.label.as_str())
    }
}
