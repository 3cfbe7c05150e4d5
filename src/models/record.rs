use serde::{Deserialize, Serialize};

use super::enums::FileKind;

/// Stable numeric identity assigned by the indexing backend.
pub type RecordId = i64;

/// One indexed document as the backend reports it.
///
/// Immutable once received — owned by the `SearchResponse` that carried it.
/// Numeric fields may arrive out of range from older index versions; they are
/// repaired by `SearchResponse::normalize`, never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: RecordId,
    pub patient_name: String,
    pub patient_id: String,
    pub file_type: FileKind,
    /// ISO 8601 timestamp without timezone, as the indexer emits it.
    /// Kept raw; parsing is a tolerant display concern.
    #[serde(default)]
    pub file_creation_date: Option<String>,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub parsing_confidence: f64,
}

impl MedicalRecord {
    /// Filename offered to the file-save flow:
    /// `{patient_name}_{patient_id}.{extension}`.
    pub fn suggested_filename(&self) -> String {
        format!(
            "{}_{}.{}",
            self.patient_name,
            self.patient_id,
            self.file_type.extension()
        )
    }

    /// Parsing confidence forced into the documented `[0, 1]` range.
    pub fn confidence_clamped(&self) -> f64 {
        clamp_confidence(self.parsing_confidence)
    }
}

/// Clamp a raw confidence value into `[0, 1]`; non-finite values become 0.
pub fn clamp_confidence(c: f64) -> f64 {
    if c.is_finite() {
        c.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
