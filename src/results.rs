//! Result presentation — pure projection of search state into screens.
//!
//! Everything here is a function of its inputs: no locks, no IO, no clock.
//! The session feeds it the accepted response plus the current preview
//! states and gets back exactly what a shell should draw.
//!
//! Key properties:
//! - grid rows are row-major chunks of at most `columns` tiles
//! - list rows never reference previews at all
//! - formatting never panics on hostile input; unparseable dates render
//!   as `Unknown`, non-positive sizes as `0.0 B`

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config;
use crate::models::{clamp_confidence, FileKind, MedicalRecord, RecordId, SearchResponse};
use crate::thumbnails::{PreviewImage, PreviewState};

/// Confidence cut-offs, inclusive at both boundaries.
pub mod thresholds {
    pub const HIGH: f64 = 0.90;
    pub const MEDIUM: f64 = 0.70;
}

// ═══════════════════════════════════════════════════════════
// Small presentation types
// ═══════════════════════════════════════════════════════════

/// How the result set is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

/// Parsing-confidence bucket for badge colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

/// What a grid tile shows in its preview area.
#[derive(Debug, Clone)]
pub enum PreviewDisplay {
    /// Fetch in flight; the shell draws a placeholder.
    Loading,
    /// Decoded thumbnail.
    Image(Arc<PreviewImage>),
    /// Fallback for documents without a usable thumbnail.
    DocumentIcon,
    /// Fallback for scanned-image folders.
    FolderIcon,
}

// ═══════════════════════════════════════════════════════════
// Formatting
// ═══════════════════════════════════════════════════════════

/// Human-readable size with one decimal, capped at GB.
///
/// Non-positive sizes collapse to `0.0 B`.
pub fn format_file_size(bytes: i64) -> String {
    if bytes <= 0 {
        return "0.0 B".to_string();
    }
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Parse the backend's loosely formatted timestamps.
///
/// The indexer emits ISO-ish strings with or without the `T` separator,
/// fractional seconds and a trailing `Z`; older rows carry a bare date.
fn parse_backend_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Display form of a record's creation date, `Unknown` when absent or
/// unparseable.
pub fn format_creation_date(raw: Option<&str>) -> String {
    raw.and_then(parse_backend_timestamp)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Bucket a raw confidence value; NaN and out-of-range clamp first.
pub fn confidence_tier(raw: f64) -> ConfidenceTier {
    let c = clamp_confidence(raw);
    if c >= thresholds::HIGH {
        ConfidenceTier::High
    } else if c >= thresholds::MEDIUM {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

/// Whole-number percent of a raw confidence value.
pub fn confidence_percent(raw: f64) -> u8 {
    (clamp_confidence(raw) * 100.0).round() as u8
}

/// Clamp a requested column count into the supported range.
pub fn clamp_grid_columns(columns: u8) -> u8 {
    columns.clamp(config::MIN_GRID_COLUMNS, config::MAX_GRID_COLUMNS)
}

/// Icon shown when no thumbnail is available for a record.
pub fn fallback_icon(kind: &FileKind) -> PreviewDisplay {
    match kind {
        FileKind::ImageFolder => PreviewDisplay::FolderIcon,
        FileKind::Pdf | FileKind::Docx => PreviewDisplay::DocumentIcon,
    }
}

// ═══════════════════════════════════════════════════════════
// Screen geometry
// ═══════════════════════════════════════════════════════════

/// One grid cell: the record plus everything pre-formatted for drawing.
#[derive(Debug, Clone)]
pub struct RecordTile {
    pub record: MedicalRecord,
    pub preview: PreviewDisplay,
    pub size_label: String,
    pub date_label: String,
    pub confidence_tier: ConfidenceTier,
    pub confidence_percent: u8,
}

/// One list row. Carries no preview, so it serializes cleanly.
#[derive(Debug, Clone, Serialize)]
pub struct RecordRow {
    pub record: MedicalRecord,
    pub size_label: String,
    pub date_label: String,
    pub confidence_tier: ConfidenceTier,
    pub confidence_percent: u8,
}

#[derive(Debug, Clone)]
pub struct GridView {
    pub columns: u8,
    pub rows: Vec<Vec<RecordTile>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListView {
    pub rows: Vec<RecordRow>,
}

/// The result area of the screen.
#[derive(Debug, Clone)]
pub enum ResultsView {
    /// The query matched nothing; echo it back for the empty-state copy.
    NoMatches { query: String },
    Grid(GridView),
    List(ListView),
}

/// Project an accepted response into the chosen layout.
///
/// `previews` holds the current preview state per visible record; ids not
/// yet tracked render as loading. List mode ignores the map entirely.
pub fn present(
    response: &SearchResponse,
    mode: ViewMode,
    columns: u8,
    previews: &HashMap<RecordId, PreviewState>,
) -> ResultsView {
    if response.results.is_empty() {
        return ResultsView::NoMatches {
            query: response.query.clone(),
        };
    }

    match mode {
        ViewMode::List => ResultsView::List(ListView {
            rows: response.results.iter().map(list_row).collect(),
        }),
        ViewMode::Grid => {
            let columns = clamp_grid_columns(columns);
            let tiles: Vec<RecordTile> = response
                .results
                .iter()
                .map(|record| grid_tile(record, previews))
                .collect();
            let rows = tiles
                .chunks(columns as usize)
                .map(|chunk| chunk.to_vec())
                .collect();
            ResultsView::Grid(GridView { columns, rows })
        }
    }
}

fn list_row(record: &MedicalRecord) -> RecordRow {
    RecordRow {
        size_label: format_file_size(record.file_size),
        date_label: format_creation_date(record.file_creation_date.as_deref()),
        confidence_tier: confidence_tier(record.parsing_confidence),
        confidence_percent: confidence_percent(record.parsing_confidence),
        record: record.clone(),
    }
}

fn grid_tile(record: &MedicalRecord, previews: &HashMap<RecordId, PreviewState>) -> RecordTile {
    let preview = match previews.get(&record.id) {
        Some(PreviewState::Ready(image)) => PreviewDisplay::Image(Arc::clone(image)),
        Some(PreviewState::Failed) => fallback_icon(&record.file_type),
        Some(PreviewState::Pending) | None => PreviewDisplay::Loading,
    };
    RecordTile {
        preview,
        size_label: format_file_size(record.file_size),
        date_label: format_creation_date(record.file_creation_date.as_deref()),
        confidence_tier: confidence_tier(record.parsing_confidence),
        confidence_percent: confidence_percent(record.parsing_confidence),
        record: record.clone(),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(id: RecordId, kind: FileKind) -> MedicalRecord {
        MedicalRecord {
            id,
            patient_name: format!("Patient {id}"),
            patient_id: format!("P-{id:04}"),
            file_type: kind,
            file_creation_date: Some("2024-03-01T10:30:45".to_string()),
            file_size: 1536,
            parsing_confidence: 0.95,
        }
    }

    fn make_response(records: Vec<MedicalRecord>) -> SearchResponse {
        SearchResponse {
            total: records.len() as u64,
            results: records,
            query: "kim".to_string(),
            limit: 50,
            offset: 0,
        }
    }

    fn ready_preview() -> PreviewState {
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([10, 20, 30, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        PreviewState::Ready(Arc::new(PreviewImage::decode(&buf.into_inner()).unwrap()))
    }

    // ── Formatting ──────────────────────────────────────────

    #[test]
    fn file_size_steps_through_units() {
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1023), "1023.0 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_file_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn file_size_caps_at_gigabytes() {
        assert_eq!(format_file_size(2 * 1024_i64.pow(4)), "2048.0 GB");
    }

    #[test]
    fn non_positive_sizes_collapse_to_zero() {
        assert_eq!(format_file_size(0), "0.0 B");
        assert_eq!(format_file_size(-5), "0.0 B");
    }

    #[test]
    fn creation_date_accepts_backend_variants() {
        assert_eq!(
            format_creation_date(Some("2024-03-01T10:30:45")),
            "2024-03-01 10:30"
        );
        assert_eq!(
            format_creation_date(Some("2024-03-01 10:30:45.123456")),
            "2024-03-01 10:30"
        );
        assert_eq!(
            format_creation_date(Some("2024-03-01T10:30:45Z")),
            "2024-03-01 10:30"
        );
        assert_eq!(format_creation_date(Some("2024-03-01")), "2024-03-01 00:00");
    }

    #[test]
    fn creation_date_falls_back_to_unknown() {
        assert_eq!(format_creation_date(None), "Unknown");
        assert_eq!(format_creation_date(Some("")), "Unknown");
        assert_eq!(format_creation_date(Some("not a date")), "Unknown");
        assert_eq!(format_creation_date(Some("03/01/2024")), "Unknown");
    }

    #[test]
    fn confidence_tiers_are_inclusive_at_boundaries() {
        assert_eq!(confidence_tier(0.95), ConfidenceTier::High);
        assert_eq!(confidence_tier(0.90), ConfidenceTier::High);
        assert_eq!(confidence_tier(0.89), ConfidenceTier::Medium);
        assert_eq!(confidence_tier(0.70), ConfidenceTier::Medium);
        assert_eq!(confidence_tier(0.69), ConfidenceTier::Low);
        assert_eq!(confidence_tier(0.0), ConfidenceTier::Low);
    }

    #[test]
    fn confidence_handles_hostile_values() {
        assert_eq!(confidence_tier(f64::NAN), ConfidenceTier::Low);
        assert_eq!(confidence_tier(1.5), ConfidenceTier::High);
        assert_eq!(confidence_tier(-0.2), ConfidenceTier::Low);
        assert_eq!(confidence_percent(f64::NAN), 0);
        assert_eq!(confidence_percent(1.5), 100);
    }

    #[test]
    fn confidence_percent_rounds() {
        assert_eq!(confidence_percent(0.856), 86);
        assert_eq!(confidence_percent(0.0), 0);
        assert_eq!(confidence_percent(1.0), 100);
    }

    #[test]
    fn grid_columns_clamp_to_supported_range() {
        assert_eq!(clamp_grid_columns(0), 2);
        assert_eq!(clamp_grid_columns(1), 2);
        assert_eq!(clamp_grid_columns(4), 4);
        assert_eq!(clamp_grid_columns(6), 6);
        assert_eq!(clamp_grid_columns(9), 6);
    }

    #[test]
    fn fallback_icon_tracks_file_kind() {
        assert!(matches!(
            fallback_icon(&FileKind::ImageFolder),
            PreviewDisplay::FolderIcon
        ));
        assert!(matches!(
            fallback_icon(&FileKind::Pdf),
            PreviewDisplay::DocumentIcon
        ));
        assert!(matches!(
            fallback_icon(&FileKind::Docx),
            PreviewDisplay::DocumentIcon
        ));
    }

    // ── Geometry ────────────────────────────────────────────

    #[test]
    fn empty_results_become_no_matches_with_query_echo() {
        let view = present(
            &make_response(vec![]),
            ViewMode::Grid,
            4,
            &HashMap::new(),
        );
        let ResultsView::NoMatches { query } = view else {
            panic!("expected no-matches view");
        };
        assert_eq!(query, "kim");
    }

    #[test]
    fn grid_rows_are_row_major_chunks() {
        let records = (1..=5).map(|id| make_record(id, FileKind::Pdf)).collect();
        let view = present(&make_response(records), ViewMode::Grid, 2, &HashMap::new());
        let ResultsView::Grid(grid) = view else {
            panic!("expected grid view");
        };
        assert_eq!(grid.columns, 2);
        let shape: Vec<usize> = grid.rows.iter().map(Vec::len).collect();
        assert_eq!(shape, vec![2, 2, 1]);
        assert_eq!(grid.rows[0][0].record.id, 1);
        assert_eq!(grid.rows[2][0].record.id, 5);
    }

    #[test]
    fn grid_clamps_requested_columns() {
        let records = (1..=3).map(|id| make_record(id, FileKind::Pdf)).collect();
        let view = present(&make_response(records), ViewMode::Grid, 99, &HashMap::new());
        let ResultsView::Grid(grid) = view else {
            panic!("expected grid view");
        };
        assert_eq!(grid.columns, 6);
    }

    #[test]
    fn grid_tiles_project_preview_states() {
        let records = vec![
            make_record(7, FileKind::Pdf),
            make_record(8, FileKind::Pdf),
            make_record(9, FileKind::ImageFolder),
            make_record(10, FileKind::Docx),
        ];
        let mut previews = HashMap::new();
        previews.insert(7, ready_preview());
        previews.insert(8, PreviewState::Pending);
        previews.insert(9, PreviewState::Failed);
        // 10 is not tracked at all.

        let view = present(&make_response(records), ViewMode::Grid, 4, &previews);
        let ResultsView::Grid(grid) = view else {
            panic!("expected grid view");
        };
        let row = &grid.rows[0];
        assert!(matches!(row[0].preview, PreviewDisplay::Image(_)));
        assert!(matches!(row[1].preview, PreviewDisplay::Loading));
        assert!(matches!(row[2].preview, PreviewDisplay::FolderIcon));
        assert!(matches!(row[3].preview, PreviewDisplay::Loading));
    }

    #[test]
    fn tiles_carry_preformatted_labels() {
        let records = vec![make_record(1, FileKind::Pdf)];
        let view = present(&make_response(records), ViewMode::Grid, 4, &HashMap::new());
        let ResultsView::Grid(grid) = view else {
            panic!("expected grid view");
        };
        let tile = &grid.rows[0][0];
        assert_eq!(tile.size_label, "1.5 KB");
        assert_eq!(tile.date_label, "2024-03-01 10:30");
        assert_eq!(tile.confidence_tier, ConfidenceTier::High);
        assert_eq!(tile.confidence_percent, 95);
    }

    #[test]
    fn list_rows_ignore_previews_entirely() {
        let records = vec![make_record(1, FileKind::Pdf), make_record(2, FileKind::Docx)];
        let mut previews = HashMap::new();
        previews.insert(1, PreviewState::Failed);

        let view = present(&make_response(records), ViewMode::List, 4, &previews);
        let ResultsView::List(list) = view else {
            panic!("expected list view");
        };
        assert_eq!(list.rows.len(), 2);
        assert_eq!(list.rows[0].record.id, 1);
        assert_eq!(list.rows[0].size_label, "1.5 KB");
        assert_eq!(list.rows[1].confidence_percent, 95);
    }
}
