use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{FileKind, SortDirection, SortKey};

/// Filter panel state. Lives on the controller between submissions and is
/// folded into every dispatched `SearchQuery`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub file_type: Option<FileKind>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub sort_by: SortKey,
    pub sort_direction: SortDirection,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            file_type: None,
            date_start: None,
            date_end: None,
            sort_by: SortKey::default(),
            sort_direction: SortDirection::default(),
        }
    }
}

/// One complete search: the text plus the filters it was issued with.
/// Compared by equality to skip redundant implicit re-submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub filters: SearchFilters,
}

impl SearchQuery {
    pub fn new(text: &str, filters: SearchFilters) -> Self {
        Self {
            text: text.to_string(),
            filters,
        }
    }

    /// Query-string pairs for `GET /api/search`.
    ///
    /// `q`, `limit`, `offset`, `sortBy` and `sortOrder` are always sent;
    /// the optional filters only when set. Dates use `YYYY-MM-DD`.
    pub fn to_params(&self, limit: u32, offset: u64) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", self.text.clone()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("sortBy", self.filters.sort_by.as_str().to_string()),
            ("sortOrder", self.filters.sort_direction.as_str().to_string()),
        ];
        if let Some(kind) = &self.filters.file_type {
            params.push(("fileType", kind.as_str().to_string()));
        }
        if let Some(start) = self.filters.date_start {
            params.push(("dateStart", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.filters.date_end {
            params.push(("dateEnd", end.format("%Y-%m-%d").to_string()));
        }
        params
    }
}
