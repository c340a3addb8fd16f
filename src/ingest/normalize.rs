//! Report normalization: one downloaded workbook in, trading records out.
//!
//! The reports are machine-exported spreadsheets with a preamble of title
//! rows, a fixed marker row announcing the data block, a header row, the
//! data itself, and a totals footer. Nothing here does I/O; callers hand in
//! the raw bytes and the file name.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::dates::date_in_name;
use crate::models::{ParseError, TradingRecord};

/// Marker cell that announces the start of the data block.
pub const DATA_BLOCK_ANCHOR: &str = "Метрическая тонна";

/// Known header misspellings in the source files, corrected in the leading
/// token only. Additive: new corrections are new rows here.
const HEADER_CORRECTIONS: [(&str, &str); 2] =
    [("обьем", "объем"), ("предыдуего", "предыдущего")];

/// Cleaned header names the data block must carry.
const REQUIRED_COLUMNS: [&str; 6] = [
    "код инструмента",
    "наименование инструмента",
    "базис поставки",
    "объем договоров в единицах измерения",
    "объем договоров, руб.",
    "количество договоров, шт.",
];

/// Decode one report and normalize it into trading records.
pub fn normalize(file_name: &str, raw: &[u8]) -> Result<Vec<TradingRecord>, ParseError> {
    let grid = decode_grid(raw)?;
    normalize_rows(file_name, &grid)
}

/// First worksheet as a plain row/column grid, no header assumption.
fn decode_grid(raw: &[u8]) -> Result<Vec<Vec<String>>, ParseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(raw.to_vec()))
        .map_err(|e| ParseError::Workbook(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ParseError::Workbook("workbook has no sheets".to_string()))?
        .map_err(|e| ParseError::Workbook(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize a decoded grid. Split from byte decoding so the transform is
/// testable without fabricating workbook bytes.
pub fn normalize_rows(
    file_name: &str,
    grid: &[Vec<String>],
) -> Result<Vec<TradingRecord>, ParseError> {
    let date = date_in_name(file_name)
        .ok_or_else(|| ParseError::NoDateInFilename(file_name.to_string()))?;

    let anchor = grid
        .iter()
        .position(|row| row.iter().any(|cell| cell.contains(DATA_BLOCK_ANCHOR)))
        .ok_or(ParseError::AnchorNotFound)?;

    let columns = match grid.get(anchor + 1) {
        Some(header) => header_columns(header),
        None => Vec::new(),
    };

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|&&required| !columns.iter().any(|(name, _)| name.as_str() == required))
        .map(|&required| required.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ParseError::MissingColumns { missing });
    }

    let index_of = |name: &str| -> usize {
        columns
            .iter()
            .find(|(column, _)| column.as_str() == name)
            .map(|(_, index)| *index)
            .expect("required column present")
    };

    let id_col = index_of("код инструмента");
    let name_col = index_of("наименование инструмента");
    let basis_col = index_of("базис поставки");
    let volume_col = index_of("объем договоров в единицах измерения");
    let total_col = index_of("объем договоров, руб.");
    let count_col = index_of("количество договоров, шт.");

    let mut records = Vec::new();
    for row in grid.iter().skip(anchor + 2) {
        // Non-numeric counts cover both empty cells and the totals footer.
        let count = numeric_cell(row.get(count_col));
        if count <= 0.0 {
            continue;
        }

        let code = row.get(id_col).map(|c| c.trim()).unwrap_or_default();
        if code.is_empty() {
            continue;
        }

        records.push(TradingRecord {
            exchange_product_id: code.to_string(),
            exchange_product_name: text_cell(row.get(name_col)),
            oil_id: code.chars().take(4).collect(),
            delivery_basis_id: code.chars().skip(4).take(3).collect(),
            delivery_basis_name: text_cell(row.get(basis_col)),
            delivery_type_id: code.chars().last().map(String::from).unwrap_or_default(),
            volume: numeric_cell(row.get(volume_col)),
            total: numeric_cell(row.get(total_col)),
            count: count as i64,
            date,
        });
    }

    Ok(records)
}

/// Cleaned `(name, index)` pairs for usable header cells; placeholder
/// columns are dropped. First occurrence wins on duplicate names.
fn header_columns(header: &[String]) -> Vec<(String, usize)> {
    let mut columns: Vec<(String, usize)> = Vec::with_capacity(header.len());
    for (index, cell) in header.iter().enumerate() {
        let name = clean_header_cell(cell);
        if name.is_empty() || name.starts_with("unnamed") || name.contains("nan") {
            continue;
        }
        if columns.iter().any(|(existing, _)| *existing == name) {
            continue;
        }
        columns.push((name, index));
    }
    columns
}

/// Trim, lower-case, collapse internal whitespace, and fix known
/// misspellings of the leading token.
fn clean_header_cell(raw: &str) -> String {
    let unfolded = raw.replace('\n', " ");
    let lowered = unfolded.trim().to_lowercase();

    let mut tokens = lowered.split_whitespace();
    let Some(first) = tokens.next() else {
        return String::new();
    };

    let corrected = HEADER_CORRECTIONS
        .iter()
        .find(|(wrong, _)| *wrong == first)
        .map(|(_, right)| *right)
        .unwrap_or(first);

    std::iter::once(corrected)
        .chain(tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

fn numeric_cell(cell: Option<&String>) -> f64 {
    cell.and_then(|raw| raw.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn text_cell(cell: Option<&String>) -> String {
    cell.map(|raw| raw.trim().to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const FILE: &str = "oil_xls_20230101162000.xls";

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    /// A realistic report skeleton: preamble, unit marker, wrapped and
    /// misspelled headers, data, and a totals footer.
    fn report() -> Vec<Vec<String>> {
        grid(&[
            &["Бюллетень по итогам торгов", "", "", "", "", ""],
            &["Дата торгов: 01.01.2023", "", "", "", "", ""],
            &["Единица измерения: Метрическая тонна", "", "", "", "", ""],
            &[
                "Код\nИнструмента",
                "Наименование\nИнструмента",
                "Базис\nпоставки",
                "Объем\nДоговоров\nв единицах\nизмерения",
                "Обьем\nДоговоров,\nруб.",
                "Количество\nДоговоров,\nшт.",
            ],
            &[
                "A100ANK060F",
                "Бензин (АИ-100-К5), станция Анисовка",
                "ст. Анисовка",
                "60",
                "4800000",
                "2",
            ],
            &[
                "A100NVY060F",
                "Бензин (АИ-100-К5), станция Новоярославская",
                "ст. Новоярославская",
                "120",
                "9600000",
                "0",
            ],
            &[
                "A592ACH005A",
                "Бензин (АИ-92-К5), Ачинский НПЗ",
                "Ачинский НПЗ",
                "not-a-number",
                "",
                "3",
            ],
            &["Итого:", "", "", "180", "14400000", "По секции"],
        ])
    }

    #[test]
    fn normalizes_data_rows_and_derives_ids() {
        let records = normalize_rows(FILE, &report()).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.exchange_product_id, "A100ANK060F");
        assert_eq!(first.oil_id, "A100");
        assert_eq!(first.delivery_basis_id, "ANK");
        assert_eq!(first.delivery_type_id, "F");
        assert_eq!(first.volume, 60.0);
        assert_eq!(first.total, 4_800_000.0);
        assert_eq!(first.count, 2);
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
    }

    #[test]
    fn zero_count_rows_are_dropped() {
        let records = normalize_rows(FILE, &report()).unwrap();
        assert!(records
            .iter()
            .all(|record| record.exchange_product_id != "A100NVY060F"));
    }

    #[test]
    fn non_numeric_cells_coerce_to_zero() {
        let records = normalize_rows(FILE, &report()).unwrap();
        let third = records
            .iter()
            .find(|record| record.exchange_product_id == "A592ACH005A")
            .unwrap();
        assert_eq!(third.volume, 0.0);
        assert_eq!(third.total, 0.0);
        assert_eq!(third.count, 3);
    }

    #[test]
    fn totals_footer_is_dropped() {
        let records = normalize_rows(FILE, &report()).unwrap();
        assert!(records
            .iter()
            .all(|record| !record.exchange_product_id.starts_with("Итого")));
    }

    #[test]
    fn header_cleaning_collapses_newlines_and_fixes_misspellings() {
        assert_eq!(
            clean_header_cell("Обьем\nДоговоров,\nруб."),
            "объем договоров, руб."
        );
        assert_eq!(clean_header_cell("  Код\nИнструмента  "), "код инструмента");
        assert_eq!(clean_header_cell("предыдуего дня"), "предыдущего дня");
        assert_eq!(clean_header_cell(""), "");
    }

    #[test]
    fn missing_anchor_is_classified() {
        let rows = grid(&[&["Бюллетень"], &["Код", "Наименование"]]);
        assert!(matches!(
            normalize_rows(FILE, &rows),
            Err(ParseError::AnchorNotFound)
        ));
    }

    #[test]
    fn missing_columns_are_reported_by_name() {
        let rows = grid(&[
            &["Единица измерения: Метрическая тонна", ""],
            &["Код\nИнструмента", "Наименование\nИнструмента"],
            &["A100ANK060F", "Бензин"],
        ]);
        match normalize_rows(FILE, &rows) {
            Err(ParseError::MissingColumns { missing }) => {
                assert!(missing.contains(&"базис поставки".to_string()));
                assert!(!missing.contains(&"код инструмента".to_string()));
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn anchor_with_no_following_rows_reports_all_columns_missing() {
        let rows = grid(&[&["Единица измерения: Метрическая тонна"]]);
        match normalize_rows(FILE, &rows) {
            Err(ParseError::MissingColumns { missing }) => {
                assert_eq!(missing.len(), REQUIRED_COLUMNS.len());
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn file_name_without_date_is_a_hard_failure() {
        assert!(matches!(
            normalize_rows("no_date.xls", &report()),
            Err(ParseError::NoDateInFilename(_))
        ));
    }

    #[test]
    fn garbage_bytes_fail_as_workbook_error() {
        assert!(matches!(
            normalize(FILE, b"this is not a spreadsheet"),
            Err(ParseError::Workbook(_))
        ));
    }
}
