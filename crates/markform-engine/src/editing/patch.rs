use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{CheckboxState, Form, KindTag, NoteState, Role};
use crate::scope::RefError;

/// One edit to a form. Serialized as a JSON object tagged by `op`:
///
/// ```json
/// {"op": "set_string", "field_id": "name", "value": "Ada"}
/// {"op": "skip_field", "field_id": "age", "role": "agent", "reason": "not public"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Patch {
    SetString {
        field_id: String,
        value: String,
    },
    SetNumber {
        field_id: String,
        value: f64,
    },
    SetStringList {
        field_id: String,
        value: Vec<String>,
    },
    /// Merged into the current states; options not named keep theirs.
    SetCheckboxes {
        field_id: String,
        value: BTreeMap<String, CheckboxState>,
    },
    SetSingleSelect {
        field_id: String,
        value: Option<String>,
    },
    SetMultiSelect {
        field_id: String,
        value: Vec<String>,
    },
    SetUrl {
        field_id: String,
        value: String,
    },
    SetUrlList {
        field_id: String,
        value: Vec<String>,
    },
    /// `YYYY-MM-DD`.
    SetDate {
        field_id: String,
        value: String,
    },
    SetYear {
        field_id: String,
        value: i32,
    },
    /// Replaces every row; each row maps column ids to cells.
    SetTable {
        field_id: String,
        value: Vec<BTreeMap<String, CellInput>>,
    },
    ClearField {
        field_id: String,
    },
    SkipField {
        field_id: String,
        role: Role,
        #[serde(default)]
        reason: Option<String>,
    },
    AbortField {
        field_id: String,
        #[serde(default)]
        role: Role,
        #[serde(default)]
        reason: Option<String>,
    },
    AddNote {
        /// Chosen automatically when absent.
        #[serde(default)]
        id: Option<String>,
        #[serde(rename = "ref")]
        target: String,
        #[serde(default)]
        role: Role,
        #[serde(default)]
        state: Option<NoteState>,
        text: String,
    },
    RemoveNote {
        note_id: String,
    },
}

impl Patch {
    pub fn op(&self) -> &'static str {
        match self {
            Patch::SetString { .. } => "set_string",
            Patch::SetNumber { .. } => "set_number",
            Patch::SetStringList { .. } => "set_string_list",
            Patch::SetCheckboxes { .. } => "set_checkboxes",
            Patch::SetSingleSelect { .. } => "set_single_select",
            Patch::SetMultiSelect { .. } => "set_multi_select",
            Patch::SetUrl { .. } => "set_url",
            Patch::SetUrlList { .. } => "set_url_list",
            Patch::SetDate { .. } => "set_date",
            Patch::SetYear { .. } => "set_year",
            Patch::SetTable { .. } => "set_table",
            Patch::ClearField { .. } => "clear_field",
            Patch::SkipField { .. } => "skip_field",
            Patch::AbortField { .. } => "abort_field",
            Patch::AddNote { .. } => "add_note",
            Patch::RemoveNote { .. } => "remove_note",
        }
    }

    /// The field a field-level patch targets.
    pub fn field_id(&self) -> Option<&str> {
        match self {
            Patch::SetString { field_id, .. }
            | Patch::SetNumber { field_id, .. }
            | Patch::SetStringList { field_id, .. }
            | Patch::SetCheckboxes { field_id, .. }
            | Patch::SetSingleSelect { field_id, .. }
            | Patch::SetMultiSelect { field_id, .. }
            | Patch::SetUrl { field_id, .. }
            | Patch::SetUrlList { field_id, .. }
            | Patch::SetDate { field_id, .. }
            | Patch::SetYear { field_id, .. }
            | Patch::SetTable { field_id, .. }
            | Patch::ClearField { field_id }
            | Patch::SkipField { field_id, .. }
            | Patch::AbortField { field_id, .. } => Some(field_id),
            Patch::AddNote { .. } | Patch::RemoveNote { .. } => None,
        }
    }

    /// Field kind a `set_*` patch is meant for.
    pub fn expected_kind(&self) -> Option<KindTag> {
        let kind = match self {
            Patch::SetString { .. } => KindTag::String,
            Patch::SetNumber { .. } => KindTag::Number,
            Patch::SetStringList { .. } => KindTag::StringList,
            Patch::SetCheckboxes { .. } => KindTag::Checkboxes,
            Patch::SetSingleSelect { .. } => KindTag::SingleSelect,
            Patch::SetMultiSelect { .. } => KindTag::MultiSelect,
            Patch::SetUrl { .. } => KindTag::Url,
            Patch::SetUrlList { .. } => KindTag::UrlList,
            Patch::SetDate { .. } => KindTag::Date,
            Patch::SetYear { .. } => KindTag::Year,
            Patch::SetTable { .. } => KindTag::Table,
            Patch::ClearField { .. }
            | Patch::SkipField { .. }
            | Patch::AbortField { .. }
            | Patch::AddNote { .. }
            | Patch::RemoveNote { .. } => return None,
        };
        Some(kind)
    }
}

/// A table cell in a `set_table` patch: `null`, a number or text.
///
/// Text goes through the same decoding as a cell read from a document, so
/// `"%SKIP% (reason)"` skips the cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellInput {
    Null,
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchRejection {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("`{op}` does not apply to {kind} field `{field}`")]
    KindMismatch {
        op: &'static str,
        field: String,
        kind: KindTag,
    },
    #[error("`{option}` is not an option of `{field}`")]
    UnknownOption { field: String, option: String },
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("required field `{0}` cannot be skipped")]
    RequiredSkip(String),
    #[error("table `{field}` takes {expected} rows, got {rows}")]
    RowCount {
        field: String,
        rows: usize,
        expected: String,
    },
    #[error("note id `{0}` is already used")]
    DuplicateNoteId(String),
    #[error("no note with id `{0}`")]
    UnknownNote(String),
    #[error("note text {0}")]
    InvalidNoteText(&'static str),
    #[error(transparent)]
    Ref(#[from] RefError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    Applied,
    Rejected(PatchRejection),
}

impl PatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied)
    }
}

/// The form after a batch, plus one outcome per patch in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResult {
    pub form: Form,
    pub outcomes: Vec<PatchOutcome>,
}

impl ApplyResult {
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    /// `(patch index, rejection)` pairs.
    pub fn rejections(&self) -> impl Iterator<Item = (usize, &PatchRejection)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| match o {
                PatchOutcome::Rejected(r) => Some((i, r)),
                PatchOutcome::Applied => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_tagged_json() {
        let patches: Vec<Patch> = serde_json::from_str(
            r#"[
                {"op": "set_string", "field_id": "name", "value": "Ada"},
                {"op": "set_single_select", "field_id": "s", "value": null},
                {"op": "skip_field", "field_id": "age", "role": "user"},
                {"op": "add_note", "ref": "team.age[0]", "text": "estimate"},
                {"op": "set_table", "field_id": "t", "value": [{"name": "Ada", "age": 36, "note": null}]}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            patches[0],
            Patch::SetString {
                field_id: "name".to_string(),
                value: "Ada".to_string()
            }
        );
        assert_eq!(
            patches[2],
            Patch::SkipField {
                field_id: "age".to_string(),
                role: Role::User,
                reason: None
            }
        );
        let Patch::AddNote { id, target, role, .. } = &patches[3] else {
            panic!("expected add_note");
        };
        assert_eq!((id, target.as_str(), *role), (&None, "team.age[0]", Role::Agent));
        let Patch::SetTable { value, .. } = &patches[4] else {
            panic!("expected set_table");
        };
        assert_eq!(value[0]["age"], CellInput::Number(36.0));
        assert_eq!(value[0]["note"], CellInput::Null);
        assert_eq!(value[0]["name"], CellInput::Text("Ada".to_string()));
    }

    #[test]
    fn serializes_with_op_tag() {
        let json = serde_json::to_value(Patch::ClearField {
            field_id: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"op": "clear_field", "field_id": "x"}));
    }

    #[test]
    fn op_names_match_serde_tags() {
        let patch = Patch::SetUrlList {
            field_id: "u".to_string(),
            value: vec![],
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["op"], patch.op());
    }
}
