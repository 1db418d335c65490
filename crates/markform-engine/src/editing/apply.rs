use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::{
    CheckboxState, ColumnType, Field, FieldKind, FieldResponse, FieldValue, Form, Note,
    NoteState, ResponseState, Role, TableRow, TableSpec, format_number,
};
use crate::parsing::fence::CodeFence;
use crate::scope::{Bounds, field_part, resolve_ref};
use crate::table::decode_cell;

use super::patch::{ApplyResult, CellInput, Patch, PatchOutcome, PatchRejection};

/// Text that the parser would read as markup inside a note body.
static DIRECTIVE_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%|%\}|<!--\s*/?f:|<!--\s*[#.][A-Za-z0-9_-]").unwrap());

/// Applies `patches` in order.
///
/// Each patch sees the result of the patches applied before it. A rejected
/// patch leaves the form untouched and the batch carries on.
pub fn apply_patches(form: &Form, patches: &[Patch]) -> ApplyResult {
    let mut current = form.clone();
    let mut outcomes = Vec::with_capacity(patches.len());

    for (index, patch) in patches.iter().enumerate() {
        let mut next = current.clone();
        match apply_one(&mut next, patch) {
            Ok(()) => {
                current = next;
                outcomes.push(PatchOutcome::Applied);
            }
            Err(rejection) => {
                log::debug!("patch {index} ({}) rejected: {rejection}", patch.op());
                outcomes.push(PatchOutcome::Rejected(rejection));
            }
        }
    }

    log::debug!(
        "applied {}/{} patches to `{}`",
        outcomes.iter().filter(|o| o.is_applied()).count(),
        patches.len(),
        current.id
    );
    ApplyResult {
        form: current,
        outcomes,
    }
}

fn apply_one(form: &mut Form, patch: &Patch) -> Result<(), PatchRejection> {
    match patch {
        Patch::AddNote {
            id,
            target,
            role,
            state,
            text,
        } => add_note(form, id.as_deref(), target, *role, *state, text),
        Patch::RemoveNote { note_id } => {
            let at = form
                .notes
                .iter()
                .position(|n| &n.id == note_id)
                .ok_or_else(|| PatchRejection::UnknownNote(note_id.clone()))?;
            form.notes.remove(at);
            Ok(())
        }
        Patch::SkipField {
            field_id,
            role,
            reason,
        } => {
            let field = lookup(form, field_id)?;
            if field.required {
                return Err(PatchRejection::RequiredSkip(field_id.clone()));
            }
            let text = reason.as_deref().map(note_text).transpose()?;
            transition(form, field_id, FieldResponse::skipped(None))?;
            upsert_note(form, field_id, *role, NoteState::Skipped, text.unwrap_or_default());
            Ok(())
        }
        Patch::AbortField {
            field_id,
            role,
            reason,
        } => {
            lookup(form, field_id)?;
            let text = reason.as_deref().map(note_text).transpose()?;
            transition(form, field_id, FieldResponse::aborted(None))?;
            if let Some(text) = text {
                upsert_note(form, field_id, *role, NoteState::Aborted, text);
            }
            Ok(())
        }
        Patch::ClearField { field_id } => {
            lookup(form, field_id)?;
            transition(form, field_id, FieldResponse::empty())
        }
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
        | Patch::SetTable { field_id, .. } => {
            let field = lookup(form, field_id)?;
            if let Some(expected) = patch.expected_kind()
                && expected != field.kind_tag()
            {
                return Err(PatchRejection::KindMismatch {
                    op: patch.op(),
                    field: field_id.to_string(),
                    kind: field.kind_tag(),
                });
            }
            let response = typed_response(field, patch)?;
            transition(form, field_id, response)
        }
    }
}

fn lookup<'f>(form: &'f Form, field_id: &str) -> Result<&'f Field, PatchRejection> {
    form.field(field_id)
        .ok_or_else(|| PatchRejection::UnknownField(field_id.to_string()))
}

/// Replaces a field's response and drops notes that mirrored the old state.
fn transition(form: &mut Form, field_id: &str, response: FieldResponse) -> Result<(), PatchRejection> {
    let field = form
        .field_mut(field_id)
        .ok_or_else(|| PatchRejection::UnknownField(field_id.to_string()))?;
    let previous = field.response.state;
    let next = response.state;
    field.response = response;

    if previous != next
        && let Some(stale) = NoteState::mirroring(previous)
    {
        let before = form.notes.len();
        form.notes
            .retain(|n| !(n.state == Some(stale) && field_part(&n.target) == field_id));
        let removed = before - form.notes.len();
        if removed > 0 {
            log::debug!("`{field_id}` left {previous}, removed {removed} {stale} note(s)");
        }
    }
    Ok(())
}

fn upsert_note(form: &mut Form, field_id: &str, role: Role, state: NoteState, text: String) {
    if let Some(note) = form
        .notes
        .iter_mut()
        .find(|n| n.target == field_id && n.state == Some(state))
    {
        note.role = role;
        note.text = text;
        return;
    }
    let id = form.next_note_id();
    form.insert_note(Note {
        id,
        target: field_id.to_string(),
        role,
        state: Some(state),
        text,
    });
}

fn add_note(
    form: &mut Form,
    id: Option<&str>,
    target: &str,
    role: Role,
    state: Option<NoteState>,
    text: &str,
) -> Result<(), PatchRejection> {
    resolve_ref(target, form, Bounds::CurrentRows)?;
    let text = note_text(text)?;
    let id = match id {
        Some(id) if form.note(id).is_some() => {
            return Err(PatchRejection::DuplicateNoteId(id.to_string()));
        }
        Some(id) => id.to_string(),
        None => form.next_note_id(),
    };
    form.insert_note(Note {
        id,
        target: target.to_string(),
        role,
        state,
        text,
    });
    Ok(())
}

/// Trimmed note text, refused when it would not survive serialization.
fn note_text(text: &str) -> Result<String, PatchRejection> {
    let text = unix_newlines(text);
    let text = text.trim();
    if DIRECTIVE_LIKE.is_match(text) {
        return Err(PatchRejection::InvalidNoteText("contains directive syntax"));
    }
    let mut open: Option<CodeFence> = None;
    for line in text.lines() {
        open = match open {
            Some(fence) if fence.closes(line) => None,
            Some(fence) => Some(fence),
            None => CodeFence::open(line),
        };
    }
    if open.is_some() {
        return Err(PatchRejection::InvalidNoteText("has an unclosed code fence"));
    }
    Ok(text.to_string())
}

/// Stored text uses `\n` line breaks only, matching what the parser reads back.
fn unix_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn invalid(field: &Field, reason: impl Into<String>) -> PatchRejection {
    PatchRejection::InvalidValue {
        field: field.id.clone(),
        reason: reason.into(),
    }
}

fn unknown_option(field: &Field, option: &str) -> PatchRejection {
    PatchRejection::UnknownOption {
        field: field.id.clone(),
        option: option.to_string(),
    }
}

fn is_option(field: &Field, option: &str) -> bool {
    field
        .options()
        .is_some_and(|options| options.iter().any(|o| o.id == option))
}

/// Trims list items and drops blank ones; an item may not span lines.
fn list_items(field: &Field, items: &[String]) -> Result<Vec<String>, PatchRejection> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let item = unix_newlines(item);
        let item = item.trim();
        if item.contains('\n') {
            return Err(invalid(field, "list items must be single lines"));
        }
        if !item.is_empty() {
            out.push(item.to_string());
        }
    }
    Ok(out)
}

fn answered_unless_empty(value: FieldValue, empty: bool) -> FieldResponse {
    if empty {
        FieldResponse::empty()
    } else {
        FieldResponse::answered(value)
    }
}

/// Response a `set_*` patch produces. The kind has already been checked.
///
/// Shape problems are rejected here; constraint violations such as lengths
/// or ranges are left for the validator.
fn typed_response(field: &Field, patch: &Patch) -> Result<FieldResponse, PatchRejection> {
    let response = match (patch, &field.kind) {
        (Patch::SetString { value, .. }, _) => {
            FieldResponse::answered(FieldValue::String(unix_newlines(value)))
        }
        (Patch::SetNumber { value, .. }, _) => {
            if !value.is_finite() {
                return Err(invalid(field, "numbers must be finite"));
            }
            FieldResponse::answered(FieldValue::Number(*value))
        }
        (Patch::SetStringList { value, .. }, _) => {
            let items = list_items(field, value)?;
            let empty = items.is_empty();
            answered_unless_empty(FieldValue::StringList(items), empty)
        }
        (Patch::SetUrlList { value, .. }, _) => {
            let items = list_items(field, value)?;
            let empty = items.is_empty();
            answered_unless_empty(FieldValue::UrlList(items), empty)
        }
        (Patch::SetUrl { value, .. }, _) => {
            let value = unix_newlines(value);
            let value = value.trim();
            if value.contains('\n') {
                return Err(invalid(field, "a url must be a single line"));
            }
            FieldResponse::answered(FieldValue::Url(value.to_string()))
        }
        (Patch::SetDate { value, .. }, _) => {
            let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                .map_err(|_| invalid(field, format!("`{value}` is not a YYYY-MM-DD date")))?;
            FieldResponse::answered(FieldValue::Date(date))
        }
        (Patch::SetYear { value, .. }, _) => FieldResponse::answered(FieldValue::Year(*value)),
        (Patch::SetCheckboxes { value, .. }, FieldKind::Checkboxes(spec)) => {
            let mut states: BTreeMap<String, CheckboxState> = match &field.response.value {
                Some(FieldValue::Checkboxes(current)) => current.clone(),
                _ => BTreeMap::new(),
            };
            let initial = CheckboxState::initial(spec.mode);
            for option in &spec.options {
                states.entry(option.id.clone()).or_insert(initial);
            }
            for (option, state) in value {
                if !is_option(field, option) {
                    return Err(unknown_option(field, option));
                }
                if !state.allowed_in(spec.mode) {
                    return Err(invalid(
                        field,
                        format!("`{option}` cannot be {state:?} in {} mode", spec.mode.as_str()),
                    ));
                }
                states.insert(option.clone(), *state);
            }
            let untouched = states.values().all(|s| *s == initial);
            answered_unless_empty(FieldValue::Checkboxes(states), untouched)
        }
        (Patch::SetSingleSelect { value, .. }, _) => match value {
            None => FieldResponse::empty(),
            Some(option) if is_option(field, option) => {
                FieldResponse::answered(FieldValue::SingleSelect(option.clone()))
            }
            Some(option) => return Err(unknown_option(field, option)),
        },
        (Patch::SetMultiSelect { value, .. }, FieldKind::MultiSelect(spec)) => {
            if let Some(option) = value.iter().find(|o| !is_option(field, o)) {
                return Err(unknown_option(field, option));
            }
            let selected: Vec<String> = spec
                .options
                .iter()
                .filter(|o| value.contains(&o.id))
                .map(|o| o.id.clone())
                .collect();
            let empty = selected.is_empty();
            answered_unless_empty(FieldValue::MultiSelect(selected), empty)
        }
        (Patch::SetTable { value, .. }, FieldKind::Table(spec)) => table_response(field, spec, value)?,
        _ => {
            return Err(PatchRejection::KindMismatch {
                op: patch.op(),
                field: field.id.clone(),
                kind: field.kind_tag(),
            });
        }
    };
    Ok(response)
}

fn table_response(
    field: &Field,
    spec: &TableSpec,
    rows: &[BTreeMap<String, CellInput>],
) -> Result<FieldResponse, PatchRejection> {
    let min = spec.effective_min_rows(field.required);
    let in_range = rows.len() >= min && spec.max_rows.is_none_or(|max| rows.len() <= max);
    if !in_range {
        let expected = match spec.max_rows {
            Some(max) => format!("{min}..={max}"),
            None => format!("at least {min}"),
        };
        return Err(PatchRejection::RowCount {
            field: field.id.clone(),
            rows: rows.len(),
            expected,
        });
    }

    let mut decoded = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        if let Some(unknown) = row.keys().find(|k| spec.column(k).is_none()) {
            return Err(invalid(field, format!("row {index} has unknown column `{unknown}`")));
        }
        let mut cells = Vec::with_capacity(spec.columns.len());
        for column in &spec.columns {
            let text = match row.get(&column.id) {
                None | Some(CellInput::Null) => String::new(),
                Some(CellInput::Number(n)) => format_number(*n),
                Some(CellInput::Text(text)) => unix_newlines(text).trim().to_string(),
            };
            if text.contains('\n') {
                return Err(invalid(
                    field,
                    format!("cell `{}` in row {index} spans lines", column.id),
                ));
            }
            let cell = decode_cell(&text, column.ty);
            if cell.state == ResponseState::Answered
                && let Some(FieldValue::String(raw)) = &cell.value
                && column.ty != ColumnType::String
            {
                return Err(invalid(
                    field,
                    format!("`{raw}` is not a {} for `{}` in row {index}", column.ty, column.id),
                ));
            }
            cells.push(cell);
        }
        decoded.push(TableRow::new(cells));
    }

    let empty = decoded.is_empty();
    Ok(answered_unless_empty(FieldValue::Table(decoded), empty))
}
