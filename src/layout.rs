//! Table detection over raw positioned runs: rows from Y-proximity, cells
//! from x-gap segmentation, and table blocks from runs of aligned rows.

use std::cmp::Ordering;

use crate::assemble;
use crate::content::TextItem;
use crate::document::Document;
use crate::model::Object;

const CELL_GAP_RATIO: f64 = 1.5;
const COLUMN_ALIGNMENT_RATIO: f64 = 0.03;
const MIN_TABLE_ROWS: usize = 3;
const MIN_TABLE_COLUMNS: usize = 2;
const HEADER_SIZE_DELTA: f64 = 0.5;
const DEFAULT_PAGE_WIDTH: f64 = 612.0;

/// A detected table block. `y_top`/`y_bottom` bound the device-space band the
/// Markdown renderer replaces with a pipe table.
#[derive(Debug, Clone)]
pub struct Table {
    pub y_top: f64,
    pub y_bottom: f64,
    pub rows: Vec<Vec<String>>,
    pub has_header: bool,
}

impl Table {
    pub(crate) fn contains_y(&self, y: f64) -> bool {
        y >= self.y_bottom - f64::EPSILON && y <= self.y_top + f64::EPSILON
    }
}

#[derive(Debug)]
struct Cell {
    x: f64,
    text: String,
}

#[derive(Debug)]
struct Row {
    y: f64,
    font_size: f64,
    any_bold: bool,
    cells: Vec<Cell>,
}

pub(crate) fn page_width(doc: &Document, index: usize) -> f64 {
    let media_box = doc
        .page(index)
        .and_then(Object::as_dict)
        .and_then(|dict| dict.get("MediaBox"))
        .map(|b| doc.resolve(b));
    let Some(Object::Array(coords)) = media_box else {
        return DEFAULT_PAGE_WIDTH;
    };
    let values: Vec<f64> = coords.iter().filter_map(Object::as_f64).collect();
    if values.len() < 4 {
        return DEFAULT_PAGE_WIDTH;
    }
    let width = (values[2] - values[0]).abs();
    if width > 0.0 {
        width
    } else {
        DEFAULT_PAGE_WIDTH
    }
}

pub(crate) fn detect_tables(items: &[TextItem], page_width: f64) -> Vec<Table> {
    let rows = build_rows(items);
    let tolerance = COLUMN_ALIGNMENT_RATIO * page_width;

    let mut out = Vec::new();
    let mut start = 0usize;
    while start < rows.len() {
        let columns = rows[start].cells.len();
        if columns < MIN_TABLE_COLUMNS {
            start += 1;
            continue;
        }
        let mut end = start + 1;
        while end < rows.len() && rows_align(&rows[start], &rows[end], tolerance) {
            end += 1;
        }
        if end - start >= MIN_TABLE_ROWS {
            out.push(build_table(&rows[start..end]));
            start = end;
        } else {
            start += 1;
        }
    }
    out
}

fn build_rows(items: &[TextItem]) -> Vec<Row> {
    let mut sorted: Vec<&TextItem> = items.iter().collect();
    sorted.sort_by(|a, b| b.y.partial_cmp(&a.y).unwrap_or(Ordering::Equal));

    let mut clusters: Vec<Vec<&TextItem>> = Vec::new();
    for item in sorted {
        let starts_new_row = match clusters.last().and_then(|row| row.last()) {
            Some(prev) => {
                let font_size = if prev.font_size > 0.0 {
                    prev.font_size
                } else {
                    12.0
                };
                (item.y - prev.y).abs() > 0.5 * font_size
            }
            None => true,
        };
        if starts_new_row {
            clusters.push(Vec::new());
        }
        clusters.last_mut().expect("row exists").push(item);
    }

    clusters
        .into_iter()
        .map(|mut row_items| {
            row_items.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
            build_row(&row_items)
        })
        .collect()
}

fn build_row(row_items: &[&TextItem]) -> Row {
    let y = row_items.first().map(|item| item.y).unwrap_or(0.0);
    let font_size = row_items
        .first()
        .map(|item| item.font_size)
        .filter(|size| *size > 0.0)
        .unwrap_or(12.0);
    let any_bold = row_items
        .iter()
        .any(|item| assemble::looks_bold(&item.base_font));

    let mut cells: Vec<Cell> = Vec::new();
    let mut prev: Option<&TextItem> = None;
    for item in row_items {
        let new_cell = match prev {
            Some(prev) => item.x - (prev.x + prev.width) > CELL_GAP_RATIO * font_size,
            None => true,
        };
        if new_cell {
            cells.push(Cell {
                x: item.x,
                text: item.text.clone(),
            });
        } else if let (Some(cell), Some(prev)) = (cells.last_mut(), prev) {
            let x_gap = item.x - (prev.x + prev.width);
            let pos_gap = item.x - prev.x;
            let wants_space = assemble::should_insert_space(
                x_gap,
                pos_gap,
                prev.text.chars().count(),
                font_size,
                prev.has_metric_width,
            );
            if wants_space && !cell.text.is_empty() {
                cell.text.push(' ');
            }
            cell.text.push_str(&item.text);
        }
        prev = Some(item);
    }
    Row {
        y,
        font_size,
        any_bold,
        cells,
    }
}

fn rows_align(reference: &Row, candidate: &Row, tolerance: f64) -> bool {
    if reference.cells.len() != candidate.cells.len() {
        return false;
    }
    reference
        .cells
        .iter()
        .zip(candidate.cells.iter())
        .all(|(a, b)| (a.x - b.x).abs() <= tolerance)
}

fn build_table(rows: &[Row]) -> Table {
    let y_top = rows.first().map(|row| row.y).unwrap_or(0.0);
    let y_bottom = rows.last().map(|row| row.y).unwrap_or(0.0);
    let has_header = match (rows.first(), rows.get(1)) {
        (Some(first), Some(second)) => {
            first.any_bold || (first.font_size - second.font_size).abs() > HEADER_SIZE_DELTA
        }
        _ => false,
    };
    Table {
        y_top: y_top.max(y_bottom),
        y_bottom: y_top.min(y_bottom),
        rows: rows
            .iter()
            .map(|row| row.cells.iter().map(|cell| cell.text.clone()).collect())
            .collect(),
        has_header,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str, x: f64, y: f64, width: f64) -> TextItem {
        TextItem {
            text: text.to_string(),
            x,
            y,
            font_size: 10.0,
            base_font: "Helvetica".to_string(),
            width,
            text_object: 1,
            has_metric_width: true,
        }
    }

    fn grid(rows: usize) -> Vec<TextItem> {
        let mut items = Vec::new();
        for row in 0..rows {
            let y = 700.0 - row as f64 * 14.0;
            items.push(item(&format!("r{}a", row), 50.0, y, 30.0));
            items.push(item(&format!("r{}b", row), 200.0, y, 30.0));
            items.push(item(&format!("r{}c", row), 350.0, y, 30.0));
        }
        items
    }

    #[test]
    fn three_aligned_rows_form_a_table() {
        let tables = detect_tables(&grid(3), 612.0);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 3);
        assert_eq!(tables[0].rows[0], vec!["r0a", "r0b", "r0c"]);
        assert!(tables[0].y_top > tables[0].y_bottom);
    }

    #[test]
    fn two_rows_are_not_enough() {
        assert!(detect_tables(&grid(2), 612.0).is_empty());
    }

    #[test]
    fn misaligned_columns_break_the_block() {
        let mut items = grid(2);
        let y = 700.0 - 2.0 * 14.0;
        items.push(item("r2a", 50.0, y, 30.0));
        // 3% of 612 is ~18.4; an offset of 60 breaks alignment.
        items.push(item("r2b", 260.0, y, 30.0));
        items.push(item("r2c", 350.0, y, 30.0));
        assert!(detect_tables(&items, 612.0).is_empty());
    }

    #[test]
    fn bold_first_row_marks_a_header() {
        let mut items = grid(3);
        items[0].base_font = "Helvetica-Bold".to_string();
        let tables = detect_tables(&items, 612.0);
        assert!(tables[0].has_header);
    }

    #[test]
    fn size_delta_marks_a_header() {
        let mut items = grid(3);
        items[0].font_size = 11.0;
        items[1].font_size = 11.0;
        items[2].font_size = 11.0;
        let tables = detect_tables(&items, 612.0);
        assert!(tables[0].has_header);
    }

    #[test]
    fn close_items_merge_into_one_cell() {
        let mut items = Vec::new();
        for row in 0..3 {
            let y = 700.0 - row as f64 * 14.0;
            items.push(item("Line", 50.0, y, 24.0));
            items.push(item("item", 78.0, y, 22.0));
            items.push(item("9.99", 300.0, y, 26.0));
        }
        let tables = detect_tables(&items, 612.0);
        assert_eq!(tables[0].rows[0], vec!["Line item", "9.99"]);
    }
}
