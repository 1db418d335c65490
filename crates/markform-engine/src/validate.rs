//! Form validation.
//!
//! [`validate`] never fails; it returns every problem it finds as a
//! [`ValidationIssue`] with a stable [`ErrorCode`], in document order:
//! duplicate ids first, then fields, then notes.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::{
    CheckboxState, Field, FieldKind, FieldValue, Form, ListConstraints, ResponseState, TableSpec,
    format_number,
};
use crate::scope::{Bounds, RefError, ScopeRef, resolve_ref};
use crate::table::cell_matches;

static COLUMN_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DuplicateId,
    DuplicateNoteId,
    RequiredMissing,
    RequiredSkipped,
    MinLength,
    MaxLength,
    PatternMismatch,
    InvalidPattern,
    NumberOutOfRange,
    NotInteger,
    ItemCount,
    DuplicateItems,
    InvalidUrl,
    DateOutOfRange,
    YearOutOfRange,
    SelectionCount,
    UnknownOption,
    CheckboxState,
    TableRowCount,
    RequiredTableMinRows,
    RowWidthMismatch,
    CellTypeMismatch,
    InvalidColumnId,
    UnresolvedNoteRef,
    CellRefOutOfBounds,
    TypeMismatch,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::DuplicateId => "duplicate_id",
            ErrorCode::DuplicateNoteId => "duplicate_note_id",
            ErrorCode::RequiredMissing => "required_missing",
            ErrorCode::RequiredSkipped => "required_skipped",
            ErrorCode::MinLength => "min_length",
            ErrorCode::MaxLength => "max_length",
            ErrorCode::PatternMismatch => "pattern_mismatch",
            ErrorCode::InvalidPattern => "invalid_pattern",
            ErrorCode::NumberOutOfRange => "number_out_of_range",
            ErrorCode::NotInteger => "not_integer",
            ErrorCode::ItemCount => "item_count",
            ErrorCode::DuplicateItems => "duplicate_items",
            ErrorCode::InvalidUrl => "invalid_url",
            ErrorCode::DateOutOfRange => "date_out_of_range",
            ErrorCode::YearOutOfRange => "year_out_of_range",
            ErrorCode::SelectionCount => "selection_count",
            ErrorCode::UnknownOption => "unknown_option",
            ErrorCode::CheckboxState => "checkbox_state",
            ErrorCode::TableRowCount => "table_row_count",
            ErrorCode::RequiredTableMinRows => "required_table_min_rows",
            ErrorCode::RowWidthMismatch => "row_width_mismatch",
            ErrorCode::CellTypeMismatch => "cell_type_mismatch",
            ErrorCode::InvalidColumnId => "invalid_column_id",
            ErrorCode::UnresolvedNoteRef => "unresolved_note_ref",
            ErrorCode::CellRefOutOfBounds => "cell_ref_out_of_bounds",
            ErrorCode::TypeMismatch => "type_mismatch",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub code: ErrorCode,
    /// Field id, scope reference or note id the issue is about.
    pub target: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(code: ErrorCode, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            target: target.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.target, self.code, self.message)
    }
}

pub fn validate(form: &Form) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    // form, group and field ids share one namespace
    let mut seen = HashSet::from([form.id.as_str()]);
    for group in form.groups.iter().filter(|g| !g.implicit) {
        if !seen.insert(group.id.as_str()) {
            issues.push(ValidationIssue::new(
                ErrorCode::DuplicateId,
                &group.id,
                format!("group id `{}` is used more than once", group.id),
            ));
        }
    }
    for field in form.fields() {
        if !seen.insert(field.id.as_str()) {
            issues.push(ValidationIssue::new(
                ErrorCode::DuplicateId,
                &field.id,
                format!("field id `{}` is used more than once", field.id),
            ));
        }
    }
    let mut seen = HashSet::new();
    for note in &form.notes {
        if !seen.insert(note.id.as_str()) {
            issues.push(ValidationIssue::new(
                ErrorCode::DuplicateNoteId,
                &note.id,
                format!("note id `{}` is used more than once", note.id),
            ));
        }
    }

    for field in form.fields() {
        issues.extend(required_errors(field));
        issues.extend(field_errors(field));
    }

    for note in &form.notes {
        match resolve_ref(&note.target, form, Bounds::CurrentRows) {
            Ok(_) => {}
            Err(RefError::RowOutOfBounds { .. }) => issues.push(ValidationIssue::new(
                ErrorCode::CellRefOutOfBounds,
                &note.id,
                format!("note refers to missing table row `{}`", note.target),
            )),
            Err(e) => issues.push(ValidationIssue::new(
                ErrorCode::UnresolvedNoteRef,
                &note.id,
                e.to_string(),
            )),
        }
    }

    issues
}

/// `required_missing` / `required_skipped` for one field.
pub fn required_errors(field: &Field) -> Option<ValidationIssue> {
    if !field.required {
        return None;
    }
    match field.response.state {
        ResponseState::Empty => Some(ValidationIssue::new(
            ErrorCode::RequiredMissing,
            &field.id,
            format!("`{}` is required", field.label),
        )),
        ResponseState::Skipped => Some(ValidationIssue::new(
            ErrorCode::RequiredSkipped,
            &field.id,
            format!("`{}` is required and cannot be skipped", field.label),
        )),
        ResponseState::Answered | ResponseState::Aborted => None,
    }
}

/// Schema and value problems of one field, excluding required-ness.
pub fn field_errors(field: &Field) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    schema_errors(field, &mut out);
    if let (ResponseState::Answered, Some(value)) = (field.response.state, &field.response.value) {
        value_errors(field, value, &mut out);
    }
    out
}

fn schema_errors(field: &Field, out: &mut Vec<ValidationIssue>) {
    match &field.kind {
        FieldKind::String(c) => {
            if let Some(pattern) = &c.pattern
                && let Err(e) = Regex::new(pattern)
            {
                out.push(ValidationIssue::new(
                    ErrorCode::InvalidPattern,
                    &field.id,
                    format!("pattern `{pattern}` does not compile: {e}"),
                ));
            }
        }
        FieldKind::Table(spec) => {
            for column in &spec.columns {
                if !COLUMN_ID.is_match(&column.id) {
                    out.push(ValidationIssue::new(
                        ErrorCode::InvalidColumnId,
                        format!("{}.{}", field.id, column.id),
                        format!(
                            "column id `{}` must start with a lowercase letter and use only a-z, 0-9 and _",
                            column.id
                        ),
                    ));
                }
            }
            if field.required && spec.max_rows == Some(0) {
                out.push(ValidationIssue::new(
                    ErrorCode::RequiredTableMinRows,
                    &field.id,
                    "a required table must allow at least one row",
                ));
            }
        }
        _ => {}
    }
}

fn value_errors(field: &Field, value: &FieldValue, out: &mut Vec<ValidationIssue>) {
    if let (FieldKind::Table(spec), FieldValue::Table(rows)) = (&field.kind, value) {
        table_errors(field, spec, rows, out);
        return;
    }

    let id = field.id.as_str();
    let mut push = |code, message: String| out.push(ValidationIssue::new(code, id, message));

    match (&field.kind, value) {
        (FieldKind::String(c), FieldValue::String(s)) => {
            let len = s.chars().count();
            if let Some(min) = c.min_length
                && len < min
            {
                push(ErrorCode::MinLength, format!("needs at least {min} characters, has {len}"));
            }
            if let Some(max) = c.max_length
                && len > max
            {
                push(ErrorCode::MaxLength, format!("allows at most {max} characters, has {len}"));
            }
            if let Some(pattern) = &c.pattern
                && let Ok(re) = Regex::new(pattern)
                && !re.is_match(s)
            {
                push(ErrorCode::PatternMismatch, format!("does not match `{pattern}`"));
            }
        }
        (FieldKind::Number(c), FieldValue::Number(n)) => {
            if c.integer && n.fract() != 0.0 {
                push(ErrorCode::NotInteger, format!("{} is not an integer", format_number(*n)));
            }
            let below = c.min.is_some_and(|min| *n < min);
            let above = c.max.is_some_and(|max| *n > max);
            if below || above {
                push(
                    ErrorCode::NumberOutOfRange,
                    format!("{} is outside {}", format_number(*n), range(c.min, c.max)),
                );
            }
        }
        (FieldKind::StringList(c), FieldValue::StringList(items)) => {
            list_errors(c, items, &mut push);
            for item in items {
                let len = item.chars().count();
                if let Some(min) = c.item_min_length
                    && len < min
                {
                    push(ErrorCode::MinLength, format!("item `{item}` is shorter than {min}"));
                }
                if let Some(max) = c.item_max_length
                    && len > max
                {
                    push(ErrorCode::MaxLength, format!("item `{item}` is longer than {max}"));
                }
            }
        }
        (FieldKind::UrlList(c), FieldValue::UrlList(items)) => {
            list_errors(c, items, &mut push);
            for item in items {
                if !is_valid_url(item) {
                    push(ErrorCode::InvalidUrl, format!("`{item}` is not a valid URL"));
                }
            }
        }
        (FieldKind::Url, FieldValue::Url(u)) => {
            if !is_valid_url(u) {
                push(ErrorCode::InvalidUrl, format!("`{u}` is not a valid URL"));
            }
        }
        (FieldKind::Date(c), FieldValue::Date(d)) => {
            if c.min.is_some_and(|min| *d < min) || c.max.is_some_and(|max| *d > max) {
                push(
                    ErrorCode::DateOutOfRange,
                    format!("{d} is outside {}", range(c.min, c.max)),
                );
            }
        }
        (FieldKind::Year(c), FieldValue::Year(y)) => {
            if c.min.is_some_and(|min| *y < min) || c.max.is_some_and(|max| *y > max) {
                push(
                    ErrorCode::YearOutOfRange,
                    format!("{y} is outside {}", range(c.min, c.max)),
                );
            }
        }
        (FieldKind::Checkboxes(spec), FieldValue::Checkboxes(states)) => {
            for (option, state) in states {
                if !spec.options.iter().any(|o| &o.id == option) {
                    push(ErrorCode::UnknownOption, format!("`{option}` is not an option"));
                } else if !state.allowed_in(spec.mode) {
                    push(
                        ErrorCode::CheckboxState,
                        format!(
                            "`[{}]` is not allowed for `{option}` in {} mode",
                            state.mark(),
                            spec.mode.as_str()
                        ),
                    );
                }
            }
        }
        (FieldKind::SingleSelect(spec), FieldValue::SingleSelect(selected)) => {
            if !spec.options.iter().any(|o| &o.id == selected) {
                push(ErrorCode::UnknownOption, format!("`{selected}` is not an option"));
            }
        }
        (FieldKind::MultiSelect(spec), FieldValue::MultiSelect(selected)) => {
            for option in selected {
                if !spec.options.iter().any(|o| &o.id == option) {
                    push(ErrorCode::UnknownOption, format!("`{option}` is not an option"));
                }
            }
            let n = selected.len();
            let few = spec.min_selections.is_some_and(|min| n < min);
            let many = spec.max_selections.is_some_and(|max| n > max);
            if few || many {
                push(
                    ErrorCode::SelectionCount,
                    format!(
                        "{n} selected, expected {}",
                        range(spec.min_selections, spec.max_selections)
                    ),
                );
            }
        }
        (kind, value) => push(
            ErrorCode::TypeMismatch,
            format!(
                "{} field holds a {} value",
                kind.tag(),
                value_kind_name(value)
            ),
        ),
    }
}

fn table_errors(
    field: &Field,
    spec: &TableSpec,
    rows: &[crate::models::TableRow],
    out: &mut Vec<ValidationIssue>,
) {
    let min = spec.effective_min_rows(field.required);
    let n = rows.len();
    if n < min || spec.max_rows.is_some_and(|max| n > max) {
        out.push(ValidationIssue::new(
            ErrorCode::TableRowCount,
            &field.id,
            format!("{n} rows, expected {}", range(Some(min), spec.max_rows)),
        ));
    }

    for (i, row) in rows.iter().enumerate() {
        if row.cells.len() != spec.columns.len() {
            out.push(ValidationIssue::new(
                ErrorCode::RowWidthMismatch,
                &field.id,
                format!(
                    "row {i} has {} cells, expected {}",
                    row.cells.len(),
                    spec.columns.len()
                ),
            ));
            continue;
        }
        for (cell, column) in row.cells.iter().zip(&spec.columns) {
            let Some(value) = cell.value.as_ref().filter(|_| cell.is_answered()) else {
                continue;
            };
            let target = ScopeRef::Cell {
                field_id: field.id.clone(),
                column_id: column.id.clone(),
                row: i,
            }
            .to_string();
            if !cell_matches(value, column.ty) {
                out.push(ValidationIssue::new(
                    ErrorCode::CellTypeMismatch,
                    target,
                    format!(
                        "`{}` is not a {}",
                        value.scalar_text().unwrap_or_default(),
                        column.ty
                    ),
                ));
            } else if let FieldValue::Url(u) = value
                && !is_valid_url(u)
            {
                out.push(ValidationIssue::new(
                    ErrorCode::InvalidUrl,
                    target,
                    format!("`{u}` is not a valid URL"),
                ));
            }
        }
    }
}

fn list_errors(
    c: &ListConstraints,
    items: &[String],
    push: &mut impl FnMut(ErrorCode, String),
) {
    let n = items.len();
    if c.min_items.is_some_and(|min| n < min) || c.max_items.is_some_and(|max| n > max) {
        push(
            ErrorCode::ItemCount,
            format!("{n} items, expected {}", range(c.min_items, c.max_items)),
        );
    }
    if c.unique_items {
        let mut seen = HashSet::new();
        if let Some(dup) = items.iter().find(|item| !seen.insert(item.as_str())) {
            push(ErrorCode::DuplicateItems, format!("`{dup}` appears more than once"));
        }
    }
}

pub(crate) fn is_valid_url(s: &str) -> bool {
    url::Url::parse(s).is_ok_and(|u| u.has_host() || u.scheme() == "mailto")
}

fn range<T: fmt::Display>(min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{min}..={max}"),
        (Some(min), None) => format!("at least {min}"),
        (None, Some(max)) => format!("at most {max}"),
        (None, None) => "any".to_string(),
    }
}

fn value_kind_name(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::String(_) => "string",
        FieldValue::Number(_) => "number",
        FieldValue::StringList(_) => "string_list",
        FieldValue::Checkboxes(_) => "checkboxes",
        FieldValue::SingleSelect(_) => "single_select",
        FieldValue::MultiSelect(_) => "multi_select",
        FieldValue::Url(_) => "url",
        FieldValue::UrlList(_) => "url_list",
        FieldValue::Date(_) => "date",
        FieldValue::Year(_) => "year",
        FieldValue::Table(_) => "table",
    }
}

/// Whether every option of a checkboxes value is settled for its mode.
pub(crate) fn all_settled(field: &Field) -> bool {
    let FieldKind::Checkboxes(spec) = &field.kind else {
        return true;
    };
    let Some(FieldValue::Checkboxes(states)) = &field.response.value else {
        return false;
    };
    spec.options.iter().all(|o| {
        states
            .get(&o.id)
            .copied()
            .unwrap_or(CheckboxState::initial(spec.mode))
            .is_settled(spec.mode)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldGroup;
    use crate::parsing::parse;
    use pretty_assertions::assert_eq;

    fn codes(text: &str) -> Vec<(ErrorCode, String)> {
        validate(&parse(text).unwrap())
            .into_iter()
            .map(|i| (i.code, i.target))
            .collect()
    }

    fn doc(fields: &str) -> String {
        format!("{{% form id=\"f\" %}}\n{fields}{{% /form %}}\n")
    }

    #[test]
    fn clean_form_has_no_issues() {
        let text = doc(concat!(
            "{% field kind=\"string\" id=\"s\" label=\"S\" required=true minLength=2 %}\n",
            "```value\nAda\n```\n{% /field %}\n",
        ));
        assert!(codes(&text).is_empty());
    }

    #[test]
    fn required_fields() {
        let text = doc(concat!(
            "{% field kind=\"string\" id=\"a\" label=\"A\" required=true %}\n{% /field %}\n",
            "{% field kind=\"string\" id=\"b\" label=\"B\" required=true %}\n",
            "```value\n|SKIP|\n```\n{% /field %}\n",
        ));
        assert_eq!(
            codes(&text),
            vec![
                (ErrorCode::RequiredMissing, "a".to_string()),
                (ErrorCode::RequiredSkipped, "b".to_string()),
            ]
        );
    }

    #[test]
    fn string_constraints() {
        let text = doc(concat!(
            "{% field kind=\"string\" id=\"s\" label=\"S\" maxLength=2 pattern=\"^[0-9]+$\" %}\n",
            "```value\nabc\n```\n{% /field %}\n",
            "{% field kind=\"string\" id=\"p\" label=\"P\" pattern=\"(\" %}\n{% /field %}\n",
        ));
        assert_eq!(
            codes(&text),
            vec![
                (ErrorCode::MaxLength, "s".to_string()),
                (ErrorCode::PatternMismatch, "s".to_string()),
                (ErrorCode::InvalidPattern, "p".to_string()),
            ]
        );
    }

    #[test]
    fn number_constraints() {
        let text = doc(concat!(
            "{% field kind=\"number\" id=\"n\" label=\"N\" min=0 max=10 integer=true %}\n",
            "```value\n12.5\n```\n{% /field %}\n",
        ));
        assert_eq!(
            codes(&text),
            vec![
                (ErrorCode::NotInteger, "n".to_string()),
                (ErrorCode::NumberOutOfRange, "n".to_string()),
            ]
        );
    }

    #[test]
    fn list_constraints() {
        let text = doc(concat!(
            "{% field kind=\"string_list\" id=\"l\" label=\"L\" maxItems=2 uniqueItems=true %}\n",
            "```value\na\nb\na\n```\n{% /field %}\n",
            "{% field kind=\"url_list\" id=\"u\" label=\"U\" %}\n",
            "```value\nhttps://example.com\nnot a url\n```\n{% /field %}\n",
        ));
        assert_eq!(
            codes(&text),
            vec![
                (ErrorCode::ItemCount, "l".to_string()),
                (ErrorCode::DuplicateItems, "l".to_string()),
                (ErrorCode::InvalidUrl, "u".to_string()),
            ]
        );
    }

    #[test]
    fn date_and_year_ranges() {
        let text = doc(concat!(
            "{% field kind=\"date\" id=\"d\" label=\"D\" min=\"2024-01-01\" %}\n",
            "```value\n2023-12-31\n```\n{% /field %}\n",
            "{% field kind=\"year\" id=\"y\" label=\"Y\" max=2000 %}\n",
            "```value\n2024\n```\n{% /field %}\n",
        ));
        assert_eq!(
            codes(&text),
            vec![
                (ErrorCode::DateOutOfRange, "d".to_string()),
                (ErrorCode::YearOutOfRange, "y".to_string()),
            ]
        );
    }

    #[test]
    fn selection_count() {
        let text = doc(concat!(
            "{% field kind=\"multi_select\" id=\"m\" label=\"M\" minSelections=2 %}\n",
            "- [x] A {% #a %}\n- [ ] B {% #b %}\n{% /field %}\n",
        ));
        assert_eq!(codes(&text), vec![(ErrorCode::SelectionCount, "m".to_string())]);
    }

    #[test]
    fn table_problems() {
        let text = doc(concat!(
            "{% field kind=\"table\" id=\"t\" label=\"T\" columnIds=[\"name\", \"Age\"] columnTypes=[\"string\", \"number\"] maxRows=1 %}\n",
            "| Name | Age |\n| --- | --- |\n| Ada | old |\n| Bob | 3 |\n{% /field %}\n",
            "{% field kind=\"table\" id=\"r\" label=\"R\" columnIds=[\"a\"] required=true maxRows=0 %}\n{% /field %}\n",
        ));
        assert_eq!(
            codes(&text),
            vec![
                (ErrorCode::InvalidColumnId, "t.Age".to_string()),
                (ErrorCode::TableRowCount, "t".to_string()),
                (ErrorCode::CellTypeMismatch, "t.Age[0]".to_string()),
                (ErrorCode::RequiredMissing, "r".to_string()),
                (ErrorCode::RequiredTableMinRows, "r".to_string()),
            ]
        );
    }

    #[test]
    fn note_references() {
        let text = concat!(
            "{% form id=\"f\" %}\n",
            "{% field kind=\"table\" id=\"t\" label=\"T\" columnIds=[\"a\"] %}\n",
            "| A |\n| --- |\n| x |\n{% /field %}\n",
            "{% note id=\"n1\" ref=\"t.a[0]\" %}\nok\n{% /note %}\n",
            "{% note id=\"n2\" ref=\"t.a[4]\" %}\nout\n{% /note %}\n",
            "{% note id=\"n3\" ref=\"ghost\" %}\nmissing\n{% /note %}\n",
            "{% /form %}\n",
        );
        assert_eq!(
            codes(text),
            vec![
                (ErrorCode::CellRefOutOfBounds, "n2".to_string()),
                (ErrorCode::UnresolvedNoteRef, "n3".to_string()),
            ]
        );
    }

    #[test]
    fn duplicate_ids_in_built_forms() {
        let mut form = parse(&doc(
            "{% field kind=\"url\" id=\"a\" label=\"A\" /%}\n",
        ))
        .unwrap();
        let copy = form.groups[0].fields[0].clone();
        form.groups[0].fields.push(copy);
        let issues = validate(&form);
        assert_eq!(issues[0].code, ErrorCode::DuplicateId);
        assert_eq!(issues[0].to_string(), "a [duplicate_id]: field id `a` is used more than once");
    }

    #[test]
    fn field_sharing_a_group_id_is_a_duplicate() {
        let mut form = parse(&doc(
            "{% field kind=\"url\" id=\"a\" label=\"A\" /%}\n",
        ))
        .unwrap();
        form.groups.insert(0, FieldGroup::new("a"));
        let issues = validate(&form);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, ErrorCode::DuplicateId);
        assert_eq!(issues[0].target, "a");
    }
}
