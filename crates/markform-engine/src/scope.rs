//! Compact references to a field, an option, a table column or a table cell.
//!
//! ```text
//! name               field
//! outlook.bullish    option of a selection field
//! team.age           column of a table field
//! team.age[2]        cell in row 2 (0-based) of that column
//! ```
//!
//! `a.b` is ambiguous on its own; the kind of field `a` decides whether `b`
//! names an option or a column.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::models::{FieldKind, FieldValue, Form};

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_-]+)(?:\.([A-Za-z0-9_-]+)(?:\[([^\]]*)\])?)?$").unwrap()
});

/// Ids a reference can name: ASCII letters, digits, `_` and `-`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeRef {
    Field {
        field_id: String,
    },
    Option {
        field_id: String,
        option_id: String,
    },
    Column {
        field_id: String,
        column_id: String,
    },
    Cell {
        field_id: String,
        column_id: String,
        row: usize,
    },
}

impl ScopeRef {
    pub fn field(field_id: impl Into<String>) -> Self {
        ScopeRef::Field {
            field_id: field_id.into(),
        }
    }

    pub fn field_id(&self) -> &str {
        match self {
            ScopeRef::Field { field_id }
            | ScopeRef::Option { field_id, .. }
            | ScopeRef::Column { field_id, .. }
            | ScopeRef::Cell { field_id, .. } => field_id,
        }
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeRef::Field { field_id } => write!(f, "{field_id}"),
            ScopeRef::Option {
                field_id,
                option_id,
            } => write!(f, "{field_id}.{option_id}"),
            ScopeRef::Column {
                field_id,
                column_id,
            } => write!(f, "{field_id}.{column_id}"),
            ScopeRef::Cell {
                field_id,
                column_id,
                row,
            } => write!(f, "{field_id}.{column_id}[{row}]"),
        }
    }
}

impl Serialize for ScopeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How strictly a cell row index is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Bounds {
    /// Only against the declared `maxRows`, if any.
    #[default]
    Schema,
    /// Against the rows the table holds right now.
    CurrentRows,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefError {
    #[error("malformed reference `{0}`")]
    Malformed(String),
    #[error("negative row index in `{0}`")]
    NegativeIndex(String),
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("field `{field}` has no option `{option}`")]
    UnknownOption { field: String, option: String },
    #[error("table `{field}` has no column `{column}`")]
    UnknownColumn { field: String, column: String },
    #[error("field `{0}` has no options or columns to refer to")]
    NoSubScope(String),
    #[error("`{0}` is not a table, row indices are not allowed")]
    NotATable(String),
    #[error("row {row} of `{field}` is out of bounds ({rows} rows)")]
    RowOutOfBounds {
        field: String,
        row: usize,
        rows: usize,
    },
}

/// Field part of a reference string, without resolving anything.
pub fn field_part(reference: &str) -> &str {
    reference
        .split(['.', '['])
        .next()
        .unwrap_or(reference)
}

/// Parses `reference` and checks it against `form`.
pub fn resolve_ref(reference: &str, form: &Form, bounds: Bounds) -> Result<ScopeRef, RefError> {
    let malformed = || RefError::Malformed(reference.to_string());
    let caps = REFERENCE.captures(reference).ok_or_else(malformed)?;

    let field_id = &caps[1];
    let field = form
        .field(field_id)
        .ok_or_else(|| RefError::UnknownField(field_id.to_string()))?;

    let Some(sub) = caps.get(2).map(|m| m.as_str()) else {
        return Ok(ScopeRef::field(field_id));
    };

    let row = match caps.get(3).map(|m| m.as_str()) {
        None => None,
        Some(index) if index.starts_with('-') && index[1..].chars().all(|c| c.is_ascii_digit()) => {
            return Err(RefError::NegativeIndex(reference.to_string()));
        }
        Some(index) if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) => {
            Some(index.parse::<usize>().map_err(|_| malformed())?)
        }
        Some(_) => return Err(malformed()),
    };

    match &field.kind {
        FieldKind::Table(spec) => {
            if spec.column(sub).is_none() {
                return Err(RefError::UnknownColumn {
                    field: field_id.to_string(),
                    column: sub.to_string(),
                });
            }
            let Some(row) = row else {
                return Ok(ScopeRef::Column {
                    field_id: field_id.to_string(),
                    column_id: sub.to_string(),
                });
            };
            let limit = match bounds {
                Bounds::Schema => spec.max_rows,
                Bounds::CurrentRows => Some(match &field.response.value {
                    Some(FieldValue::Table(rows)) => rows.len(),
                    _ => 0,
                }),
            };
            if let Some(rows) = limit
                && row >= rows
            {
                return Err(RefError::RowOutOfBounds {
                    field: field_id.to_string(),
                    row,
                    rows,
                });
            }
            Ok(ScopeRef::Cell {
                field_id: field_id.to_string(),
                column_id: sub.to_string(),
                row,
            })
        }
        FieldKind::Checkboxes(_) | FieldKind::SingleSelect(_) | FieldKind::MultiSelect(_) => {
            if row.is_some() {
                return Err(RefError::NotATable(field_id.to_string()));
            }
            let known = field
                .options()
                .is_some_and(|options| options.iter().any(|o| o.id == sub));
            if !known {
                return Err(RefError::UnknownOption {
                    field: field_id.to_string(),
                    option: sub.to_string(),
                });
            }
            Ok(ScopeRef::Option {
                field_id: field_id.to_string(),
                option_id: sub.to_string(),
            })
        }
        _ => Err(RefError::NoSubScope(field_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Column, ColumnType, Field, FieldGroup, FieldResponse, SelectOption, SelectSpec,
        StringConstraints, TableRow, TableSpec,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn form() -> Form {
        let mut group = FieldGroup::new("g");
        group.fields.push(Field::new(
            "name",
            "Name",
            FieldKind::String(StringConstraints::default()),
        ));
        group.fields.push(Field::new(
            "ratings",
            "Ratings",
            FieldKind::SingleSelect(SelectSpec {
                options: vec![
                    SelectOption::new("bullish", "Bullish"),
                    SelectOption::new("bearish", "Bearish"),
                ],
            }),
        ));
        let mut table = Field::new(
            "team",
            "Team",
            FieldKind::Table(TableSpec {
                columns: vec![
                    Column::new("name", "Name", ColumnType::String),
                    Column::new("bullish", "Bullish", ColumnType::Number),
                ],
                min_rows: 0,
                max_rows: Some(5),
            }),
        );
        table.response = FieldResponse::answered(FieldValue::Table(vec![TableRow::new(vec![
            FieldResponse::empty(),
            FieldResponse::empty(),
        ])]));
        group.fields.push(table);
        let mut form = Form::new("f");
        form.groups.push(group);
        form
    }

    #[test]
    fn same_suffix_resolves_by_field_kind() {
        let form = form();
        assert_eq!(
            resolve_ref("ratings.bullish", &form, Bounds::Schema),
            Ok(ScopeRef::Option {
                field_id: "ratings".to_string(),
                option_id: "bullish".to_string(),
            })
        );
        assert_eq!(
            resolve_ref("team.bullish", &form, Bounds::Schema),
            Ok(ScopeRef::Column {
                field_id: "team".to_string(),
                column_id: "bullish".to_string(),
            })
        );
    }

    #[rstest]
    #[case("name")]
    #[case("ratings.bearish")]
    #[case("team.name")]
    #[case("team.name[0]")]
    fn display_is_the_inverse(#[case] reference: &str) {
        let resolved = resolve_ref(reference, &form(), Bounds::CurrentRows).unwrap();
        assert_eq!(resolved.to_string(), reference);
    }

    #[rstest]
    #[case("", RefError::Malformed(String::new()))]
    #[case("a..b", RefError::Malformed("a..b".to_string()))]
    #[case("team.name[x]", RefError::Malformed("team.name[x]".to_string()))]
    #[case("team.name[]", RefError::Malformed("team.name[]".to_string()))]
    #[case("team.name[-1]", RefError::NegativeIndex("team.name[-1]".to_string()))]
    #[case("ghost", RefError::UnknownField("ghost".to_string()))]
    #[case("name.x", RefError::NoSubScope("name".to_string()))]
    #[case("ratings.bullish[0]", RefError::NotATable("ratings".to_string()))]
    #[case(
        "ratings.flat",
        RefError::UnknownOption { field: "ratings".to_string(), option: "flat".to_string() }
    )]
    #[case(
        "team.age",
        RefError::UnknownColumn { field: "team".to_string(), column: "age".to_string() }
    )]
    fn rejects_bad_references(#[case] reference: &str, #[case] expected: RefError) {
        assert_eq!(resolve_ref(reference, &form(), Bounds::Schema), Err(expected));
    }

    #[test]
    fn row_bounds_depend_on_mode() {
        let form = form();
        assert!(resolve_ref("team.name[3]", &form, Bounds::Schema).is_ok());
        assert_eq!(
            resolve_ref("team.name[3]", &form, Bounds::CurrentRows),
            Err(RefError::RowOutOfBounds {
                field: "team".to_string(),
                row: 3,
                rows: 1,
            })
        );
        assert!(matches!(
            resolve_ref("team.name[5]", &form, Bounds::Schema),
            Err(RefError::RowOutOfBounds { rows: 5, .. })
        ));
    }

    #[test]
    fn serializes_as_string() {
        let reference = ScopeRef::Cell {
            field_id: "team".to_string(),
            column_id: "name".to_string(),
            row: 2,
        };
        assert_eq!(
            serde_json::to_string(&reference).unwrap(),
            r#""team.name[2]""#
        );
    }

    #[test]
    fn field_part_stops_at_separators() {
        assert_eq!(field_part("team.name[2]"), "team");
        assert_eq!(field_part("name"), "name");
    }
}
