//! Plain JSON view of the values in a form, keyed by field id.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::models::{FieldResponse, FieldValue, Form, NoteState, ResponseState, TableSpec};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedField {
    pub state: ResponseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Text of the note explaining a skip or abort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Every field's state and value.
///
/// Table rows become objects keyed by column id; skipped or aborted cells
/// become `{"state": ..., "reason": ...}`.
pub fn export_values(form: &Form) -> BTreeMap<String, ExportedField> {
    form.fields()
        .map(|field| {
            let state = field.response.state;
            let value = match (&field.response.value, field.table()) {
                (Some(FieldValue::Table(rows)), Some(spec)) => Some(table_json(rows, spec)),
                (Some(value), _) => Some(value_json(value)),
                (None, _) => None,
            };
            let reason = NoteState::mirroring(state).and_then(|mirror| {
                form.notes
                    .iter()
                    .find(|n| n.target == field.id && n.state == Some(mirror) && !n.text.is_empty())
                    .map(|n| n.text.clone())
            });
            (
                field.id.clone(),
                ExportedField {
                    state,
                    value,
                    reason,
                },
            )
        })
        .collect()
}

fn value_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::String(s) | FieldValue::Url(s) | FieldValue::SingleSelect(s) => json!(s),
        FieldValue::Number(n) => json!(n),
        FieldValue::StringList(items) | FieldValue::UrlList(items) | FieldValue::MultiSelect(items) => {
            json!(items)
        }
        FieldValue::Checkboxes(states) => json!(states),
        FieldValue::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
        FieldValue::Year(y) => json!(y),
        // only reached without a table spec
        FieldValue::Table(rows) => Value::Array(
            rows.iter()
                .map(|row| Value::Array(row.cells.iter().map(cell_json).collect()))
                .collect(),
        ),
    }
}

fn cell_json(cell: &FieldResponse) -> Value {
    match (cell.state, &cell.value) {
        (ResponseState::Answered, Some(value)) => value_json(value),
        (ResponseState::Skipped | ResponseState::Aborted, _) => match &cell.reason {
            Some(reason) => json!({ "state": cell.state, "reason": reason }),
            None => json!({ "state": cell.state }),
        },
        _ => Value::Null,
    }
}

fn table_json(rows: &[crate::models::TableRow], spec: &TableSpec) -> Value {
    rows.iter()
        .map(|row| {
            spec.columns
                .iter()
                .zip(&row.cells)
                .map(|(column, cell)| (column.id.clone(), cell_json(cell)))
                .collect::<serde_json::Map<_, _>>()
        })
        .map(Value::Object)
        .collect()
}
