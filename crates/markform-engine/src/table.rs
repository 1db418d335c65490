//! Pipe-table codec for `table` fields.
//!
//! ```text
//! | Name | Age |
//! | --- | --- |
//! | Ada | 36 |
//! | Bob | %SKIP% (unknown) |
//! ```
//!
//! Cells are split on unescaped `|` and trimmed, then coerced by the declared
//! column type. A cell that fails coercion keeps its raw text as a string so
//! the validator can point at it; decoding never fails because of cell
//! contents, only because of table shape.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::{Column, ColumnType, FieldResponse, FieldValue, ResponseState, TableRow};
use crate::parsing::{ParseError, ParseErrorKind};

pub const SKIP_CELL: &str = "%SKIP%";
pub const ABORT_CELL: &str = "%ABORT%";

static SENTINEL_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%(SKIP|ABORT)%(?:\s*\((.*)\))?$").unwrap());

static SEPARATOR_CELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^:?-+:?$").unwrap());

/// Header labels and decoded rows of a table body.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTable {
    pub header: Vec<String>,
    pub rows: Vec<TableRow>,
}

/// Splits a table line into trimmed, unescaped cells.
pub fn split_row(line: &str) -> Vec<String> {
    let line = line.trim();
    let body = line.strip_prefix('|').unwrap_or(line);

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        cells.push(current.trim().to_string());
    }
    cells
}

pub fn is_separator(cells: &[String]) -> bool {
    !cells.is_empty() && cells.iter().all(|c| SEPARATOR_CELL.is_match(c))
}

pub fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Parses an already split and trimmed cell against a column type.
pub fn decode_cell(raw: &str, ty: ColumnType) -> FieldResponse {
    if raw.is_empty() {
        return FieldResponse::empty();
    }
    if let Some(caps) = SENTINEL_CELL.captures(raw) {
        let reason = caps.get(2).map(|m| m.as_str().trim().to_string());
        return match &caps[1] {
            "SKIP" => FieldResponse::skipped(reason),
            _ => FieldResponse::aborted(reason),
        };
    }
    FieldResponse::answered(coerce(raw, ty).unwrap_or_else(|| FieldValue::String(raw.to_string())))
}

/// Typed value for `raw`, or `None` when it does not fit the column type.
pub fn coerce(raw: &str, ty: ColumnType) -> Option<FieldValue> {
    match ty {
        ColumnType::String => Some(FieldValue::String(raw.to_string())),
        ColumnType::Url => Some(FieldValue::Url(raw.to_string())),
        ColumnType::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(FieldValue::Number),
        ColumnType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(FieldValue::Date),
        ColumnType::Year => raw.parse::<i32>().ok().map(FieldValue::Year),
    }
}

/// Whether a cell value has the variant its column type calls for.
pub fn cell_matches(value: &FieldValue, ty: ColumnType) -> bool {
    matches!(
        (value, ty),
        (FieldValue::String(_), ColumnType::String)
            | (FieldValue::Number(_), ColumnType::Number)
            | (FieldValue::Url(_), ColumnType::Url)
            | (FieldValue::Date(_), ColumnType::Date)
            | (FieldValue::Year(_), ColumnType::Year)
    )
}

pub fn encode_cell(cell: &FieldResponse) -> String {
    let sentinel = match cell.state {
        ResponseState::Empty => return String::new(),
        ResponseState::Answered => {
            return cell
                .value
                .as_ref()
                .and_then(FieldValue::scalar_text)
                .map(|text| escape_cell(&text))
                .unwrap_or_default();
        }
        ResponseState::Skipped => SKIP_CELL,
        ResponseState::Aborted => ABORT_CELL,
    };
    match &cell.reason {
        Some(reason) => format!("{sentinel} ({})", escape_cell(reason)),
        None => sentinel.to_string(),
    }
}

fn encode_line(cells: impl IntoIterator<Item = String>) -> String {
    let cells: Vec<String> = cells.into_iter().collect();
    format!("| {} |", cells.join(" | "))
}

/// Header, separator and one line per row.
pub fn encode(columns: &[Column], rows: &[TableRow]) -> Vec<String> {
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(encode_line(columns.iter().map(|c| escape_cell(&c.label))));
    lines.push(encode_line(columns.iter().map(|_| "---".to_string())));
    for row in rows {
        lines.push(encode_line(row.cells.iter().map(encode_cell)));
    }
    lines
}

/// Decodes table lines (with their 1-based line numbers) against `columns`.
pub fn decode(lines: &[(usize, &str)], columns: &[Column]) -> Result<DecodedTable, ParseError> {
    let Some(((header_line, header), rest)) = lines.split_first() else {
        return Ok(DecodedTable {
            header: Vec::new(),
            rows: Vec::new(),
        });
    };

    let header = split_row(header);
    if header.len() != columns.len() {
        return Err(ParseError::new(
            *header_line,
            ParseErrorKind::HeaderMismatch {
                found: header.len(),
                expected: columns.len(),
            },
        ));
    }

    let Some(((separator_line, separator), data)) = rest.split_first() else {
        return Err(ParseError::new(*header_line, ParseErrorKind::MissingSeparator));
    };
    if !is_separator(&split_row(separator)) {
        return Err(ParseError::new(*separator_line, ParseErrorKind::MissingSeparator));
    }

    let rows = data
        .iter()
        .map(|(line, text)| {
            let raw = split_row(text);
            if raw.len() != columns.len() {
                return Err(ParseError::new(
                    *line,
                    ParseErrorKind::RowWidth {
                        found: raw.len(),
                        expected: columns.len(),
                    },
                ));
            }
            let cells = raw
                .iter()
                .zip(columns)
                .map(|(cell, column)| decode_cell(cell, column.ty))
                .collect();
            Ok(TableRow::new(cells))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecodedTable { header, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("name", "Name", ColumnType::String),
            Column::new("age", "Age", ColumnType::Number),
        ]
    }

    #[rstest]
    #[case("| a | b |", &["a", "b"])]
    #[case("| a | b", &["a", "b"])]
    #[case("|  | b |", &["", "b"])]
    #[case(r"| a \| b | c |", &["a | b", "c"])]
    #[case(r"| a\b | c |", &[r"a\b", "c"])]
    #[case(r"| a\\| b |", &[r"a\| b"])]
    fn splits_rows(#[case] line: &str, #[case] expected: &[&str]) {
        assert_eq!(split_row(line), expected);
    }

    #[rstest]
    #[case("", ResponseState::Empty, None)]
    #[case("%SKIP%", ResponseState::Skipped, None)]
    #[case("%SKIP% (not applicable)", ResponseState::Skipped, Some("not applicable"))]
    #[case("%ABORT% (gave up)", ResponseState::Aborted, Some("gave up"))]
    fn decodes_sentinels(
        #[case] raw: &str,
        #[case] state: ResponseState,
        #[case] reason: Option<&str>,
    ) {
        let cell = decode_cell(raw, ColumnType::String);
        assert_eq!(cell.state, state);
        assert_eq!(cell.reason.as_deref(), reason);
        assert_eq!(cell.value, None);
    }

    #[test]
    fn failed_coercion_keeps_raw_text() {
        let cell = decode_cell("thirty", ColumnType::Number);
        assert_eq!(
            cell.value,
            Some(FieldValue::String("thirty".to_string()))
        );
        assert!(!cell_matches(cell.value.as_ref().unwrap(), ColumnType::Number));
    }

    #[test]
    fn decodes_typed_rows() {
        let lines = [
            (3, "| Name | Age |"),
            (4, "| :--- | ---: |"),
            (5, "| Ada | 36 |"),
            (6, "| Bob | %SKIP% (unknown) |"),
        ];
        let table = decode(&lines, &columns()).unwrap();
        assert_eq!(table.header, vec!["Name", "Age"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[0].cells[1].value,
            Some(FieldValue::Number(36.0))
        );
        assert_eq!(table.rows[1].cells[1].state, ResponseState::Skipped);
    }

    #[test]
    fn header_width_must_match() {
        let lines = [(1, "| Name |"), (2, "| --- |")];
        let err = decode(&lines, &columns()).unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(
            err.kind,
            ParseErrorKind::HeaderMismatch {
                found: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn row_width_must_match() {
        let lines = [(1, "| Name | Age |"), (2, "| --- | --- |"), (3, "| Ada |")];
        let err = decode(&lines, &columns()).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.kind, ParseErrorKind::RowWidth { .. }));
    }

    #[test]
    fn separator_is_required() {
        let lines = [(1, "| Name | Age |"), (2, "| Ada | 36 |")];
        let err = decode(&lines, &columns()).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingSeparator);
    }

    #[test]
    fn encodes_header_for_zero_rows() {
        assert_eq!(
            encode(&columns(), &[]),
            vec!["| Name | Age |", "| --- | --- |"]
        );
    }

    #[test]
    fn encodes_cells_with_escapes_and_reasons() {
        let row = TableRow::new(vec![
            FieldResponse::answered(FieldValue::String("a | b".to_string())),
            FieldResponse::skipped(Some("n/a".to_string())),
        ]);
        let lines = encode(&columns(), &[row, TableRow::new(vec![FieldResponse::empty(); 2])]);
        assert_eq!(lines[2], r"| a \| b | %SKIP% (n/a) |");
        assert_eq!(lines[3], "|  |  |");
    }
}
