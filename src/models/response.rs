use serde::{Deserialize, Serialize};
use tracing::warn;

use super::record::{clamp_confidence, MedicalRecord};

/// One page of search results as the backend returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub results: Vec<MedicalRecord>,
    /// Echo of the submitted text.
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u64,
}

impl SearchResponse {
    /// True when this page does not carry every match.
    pub fn is_truncated(&self) -> bool {
        (self.results.len() as u64) < self.total
    }

    /// Page-bound invariant: `len ≤ limit` and `offset + len ≤ total`.
    /// Violations are tolerated (the server owns the data), only reported.
    pub fn page_consistent(&self) -> bool {
        let shown = self.results.len() as u64;
        shown <= u64::from(self.limit) && self.offset + shown <= self.total
    }

    /// Repair out-of-range numeric fields in place: confidence clamped into
    /// `[0, 1]`, negative sizes floored to zero. Returns the number of
    /// repaired fields.
    pub fn normalize(&mut self) -> usize {
        let mut repairs = 0;
        for record in &mut self.results {
            let clamped = clamp_confidence(record.parsing_confidence);
            // NaN never compares equal, so test the raw value explicitly
            if clamped != record.parsing_confidence || record.parsing_confidence.is_nan() {
                warn!(
                    record_id = record.id,
                    raw = record.parsing_confidence,
                    "clamped out-of-range parsing confidence"
                );
                record.parsing_confidence = clamped;
                repairs += 1;
            }
            if record.file_size < 0 {
                warn!(
                    record_id = record.id,
                    raw = record.file_size,
                    "negative file size floored to zero"
                );
                record.file_size = 0;
                repairs += 1;
            }
        }
        repairs
    }
}
