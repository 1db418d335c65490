//! Field directives: typed attributes on the opening tag, then the body
//! (value fence, option list or pipe table) once the field is closed.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::attrs::{AttrValue, Attrs, Tag, parse_tag};
use super::error::{ParseError, ParseErrorKind};
use super::fence::CodeFence;
use crate::models::{
    ApprovalMode, CheckboxMode, CheckboxState, CheckboxesSpec, Column, ColumnType, DateConstraints,
    Field, FieldKind, FieldResponse, FieldValue, KindTag, ListConstraints, MultiSelectSpec,
    NumberConstraints, Priority, ResponseState, Role, SelectOption, SelectSpec, StringConstraints,
    TableSpec, YearConstraints,
};
use crate::table;

pub const SKIP_SENTINEL: &str = "|SKIP|";
pub const ABORT_SENTINEL: &str = "|ABORT|";

static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*+]\s+\[(.)\]\s*(.*?)\s*\{%\s*([^%]*?)\s*%\}\s*$").unwrap()
});

static CHECKBOX_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+\[.\]").unwrap());

/// A field whose opening tag has been read but whose body has not.
#[derive(Debug, Clone)]
pub(crate) struct FieldDraft {
    pub line: usize,
    pub field: Field,
    /// `state` attribute of option kinds and tables.
    pub state: Option<ResponseState>,
    /// `columnLabels`, when given.
    pub column_labels: Option<Vec<String>>,
}

fn err(line: usize, kind: ParseErrorKind) -> ParseError {
    ParseError::new(line, kind)
}

fn missing(tag: &str, attr: &str) -> ParseErrorKind {
    ParseErrorKind::MissingAttribute {
        tag: tag.to_string(),
        attr: attr.to_string(),
    }
}

fn invalid(attr: &str, expected: &str) -> ParseErrorKind {
    ParseErrorKind::InvalidAttribute {
        attr: attr.to_string(),
        expected: expected.to_string(),
    }
}

fn take_enum<T>(
    attrs: &mut Attrs,
    key: &str,
    expected: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ParseErrorKind> {
    match attrs.take_str(key)? {
        None => Ok(None),
        Some(s) => parse(&s).map(Some).ok_or_else(|| invalid(key, expected)),
    }
}

fn take_date(attrs: &mut Attrs, key: &str) -> Result<Option<NaiveDate>, ParseErrorKind> {
    take_enum(attrs, key, "a YYYY-MM-DD date", |s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
    })
}

fn take_list_constraints(
    attrs: &mut Attrs,
    with_item_lengths: bool,
) -> Result<ListConstraints, ParseErrorKind> {
    let mut constraints = ListConstraints {
        min_items: attrs.take_usize("minItems")?,
        max_items: attrs.take_usize("maxItems")?,
        unique_items: attrs.take_bool("uniqueItems")?,
        ..Default::default()
    };
    if with_item_lengths {
        constraints.item_min_length = attrs.take_usize("itemMinLength")?;
        constraints.item_max_length = attrs.take_usize("itemMaxLength")?;
    }
    Ok(constraints)
}

fn take_kind(
    attrs: &mut Attrs,
    kind: KindTag,
) -> Result<(FieldKind, Option<Vec<String>>), ParseErrorKind> {
    let mut column_labels = None;
    let kind = match kind {
        KindTag::String => FieldKind::String(StringConstraints {
            min_length: attrs.take_usize("minLength")?,
            max_length: attrs.take_usize("maxLength")?,
            pattern: attrs.take_str("pattern")?,
        }),
        KindTag::Number => FieldKind::Number(NumberConstraints {
            min: attrs.take_f64("min")?,
            max: attrs.take_f64("max")?,
            integer: attrs.take_bool("integer")?,
        }),
        KindTag::StringList => FieldKind::StringList(take_list_constraints(attrs, true)?),
        KindTag::UrlList => FieldKind::UrlList(take_list_constraints(attrs, false)?),
        KindTag::Checkboxes => FieldKind::Checkboxes(CheckboxesSpec {
            options: Vec::new(),
            mode: take_enum(attrs, "checkboxMode", "multi, simple or explicit", CheckboxMode::parse)?
                .unwrap_or_default(),
            approval: take_enum(attrs, "approvalMode", "none or blocking", ApprovalMode::parse)?
                .unwrap_or_default(),
        }),
        KindTag::SingleSelect => FieldKind::SingleSelect(SelectSpec {
            options: Vec::new(),
        }),
        KindTag::MultiSelect => FieldKind::MultiSelect(MultiSelectSpec {
            options: Vec::new(),
            min_selections: attrs.take_usize("minSelections")?,
            max_selections: attrs.take_usize("maxSelections")?,
        }),
        KindTag::Url => FieldKind::Url,
        KindTag::Date => FieldKind::Date(DateConstraints {
            min: take_date(attrs, "min")?,
            max: take_date(attrs, "max")?,
        }),
        KindTag::Year => FieldKind::Year(YearConstraints {
            min: attrs.take_i32("min")?,
            max: attrs.take_i32("max")?,
        }),
        KindTag::Table => {
            let ids = attrs
                .take_str_list("columnIds")?
                .ok_or_else(|| missing("field", "columnIds"))?;
            if ids.is_empty() {
                return Err(invalid("columnIds", "a non-empty array of strings"));
            }
            let labels = attrs.take_str_list("columnLabels")?;
            let types = attrs.take_str_list("columnTypes")?;
            if let Some(labels) = &labels
                && labels.len() != ids.len()
            {
                return Err(ParseErrorKind::LengthMismatch(format!(
                    "{} column ids but {} labels",
                    ids.len(),
                    labels.len()
                )));
            }
            let types = match types {
                None => vec![ColumnType::String; ids.len()],
                Some(types) if types.len() != ids.len() => {
                    return Err(ParseErrorKind::LengthMismatch(format!(
                        "{} column ids but {} types",
                        ids.len(),
                        types.len()
                    )));
                }
                Some(types) => types
                    .iter()
                    .map(|t| {
                        ColumnType::parse(t)
                            .ok_or_else(|| invalid("columnTypes", "string, number, url, date or year"))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            };
            let columns = ids
                .iter()
                .zip(types)
                .enumerate()
                .map(|(i, (id, ty))| {
                    let label = labels
                        .as_ref()
                        .and_then(|labels| labels.get(i))
                        .unwrap_or(id);
                    Column::new(id.clone(), label.clone(), ty)
                })
                .collect();
            column_labels = labels;
            FieldKind::Table(TableSpec {
                columns,
                min_rows: attrs.take_usize("minRows")?.unwrap_or(0),
                max_rows: attrs.take_usize("maxRows")?,
            })
        }
    };
    Ok((kind, column_labels))
}

/// Reads a `field` opening tag.
pub(crate) fn open_field(tag: Tag, line: usize) -> Result<FieldDraft, ParseError> {
    let Tag { mut attrs, .. } = tag;
    let at = |kind| err(line, kind);

    let kind_name = attrs
        .take_str("kind")
        .map_err(at)?
        .ok_or_else(|| at(missing("field", "kind")))?;
    let kind_tag =
        KindTag::parse(&kind_name).ok_or_else(|| at(ParseErrorKind::UnknownKind(kind_name)))?;
    let id = attrs
        .id
        .take()
        .ok_or_else(|| at(missing("field", "id")))?;
    let label = attrs
        .take_str("label")
        .map_err(at)?
        .ok_or_else(|| at(missing("field", "label")))?;

    let (kind, column_labels) = take_kind(&mut attrs, kind_tag).map_err(at)?;
    let mut field = Field::new(id, label, kind);
    field.role = take_enum(&mut attrs, "role", "user or agent", Role::parse)
        .map_err(at)?
        .unwrap_or_default();
    field.required = attrs.take_bool("required").map_err(at)?;
    field.priority =
        take_enum(&mut attrs, "priority", "high, medium or low", Priority::parse).map_err(at)?;
    field.classes = std::mem::take(&mut attrs.classes);

    let state = if kind_tag.uses_value_fence() {
        None
    } else {
        take_enum(&mut attrs, "state", "skipped or aborted", |s| match s {
            "skipped" => Some(ResponseState::Skipped),
            "aborted" => Some(ResponseState::Aborted),
            _ => None,
        })
        .map_err(at)?
    };

    for key in attrs.leftover_keys() {
        log::debug!("line {line}: ignoring unknown attribute `{key}` on field `{}`", field.id);
    }

    Ok(FieldDraft {
        line,
        field,
        state,
        column_labels,
    })
}

/// Completes a field from the lines between its opening and closing tags.
pub(crate) fn finish_field(
    draft: FieldDraft,
    body: &[(usize, &str)],
) -> Result<Field, ParseError> {
    let FieldDraft {
        line,
        mut field,
        state,
        column_labels,
    } = draft;

    if field.kind_tag().uses_value_fence() {
        field.response = read_value(&field, body, line)?;
    }
    match &mut field.kind {
        FieldKind::Checkboxes(spec) => {
            let marks = read_options(&field.id, &mut spec.options, body, line)?;
            let mode = spec.mode;
            let mut states = BTreeMap::new();
            for (option, (mark, option_line)) in spec.options.iter().zip(marks) {
                let state = CheckboxState::from_mark(mark, mode).ok_or_else(|| {
                    err(
                        option_line,
                        ParseErrorKind::InvalidMark {
                            mark,
                            option: option.id.clone(),
                        },
                    )
                })?;
                states.insert(option.id.clone(), state);
            }
            let initial = CheckboxState::initial(mode);
            field.response = if states.values().any(|&s| s != initial) {
                FieldResponse::answered(FieldValue::Checkboxes(states))
            } else {
                FieldResponse::empty()
            };
        }
        FieldKind::SingleSelect(spec) => {
            let marks = read_options(&field.id, &mut spec.options, body, line)?;
            let mut selected = None;
            for (option, (mark, option_line)) in spec.options.iter().zip(marks) {
                if !is_select_mark(mark, &option.id, option_line)? {
                    continue;
                }
                if selected.replace(option.id.clone()).is_some() {
                    return Err(err(
                        option_line,
                        ParseErrorKind::MultipleSelected(field.id.clone()),
                    ));
                }
            }
            field.response = selected
                .map(|id| FieldResponse::answered(FieldValue::SingleSelect(id)))
                .unwrap_or_default();
        }
        FieldKind::MultiSelect(spec) => {
            let marks = read_options(&field.id, &mut spec.options, body, line)?;
            let mut selected = Vec::new();
            for (option, (mark, option_line)) in spec.options.iter().zip(marks) {
                if is_select_mark(mark, &option.id, option_line)? {
                    selected.push(option.id.clone());
                }
            }
            field.response = if selected.is_empty() {
                FieldResponse::empty()
            } else {
                FieldResponse::answered(FieldValue::MultiSelect(selected))
            };
        }
        FieldKind::Table(spec) => {
            let lines = table_lines(body);
            let decoded = table::decode(&lines, &spec.columns)?;
            if column_labels.is_none() && !decoded.header.is_empty() {
                for (column, label) in spec.columns.iter_mut().zip(decoded.header) {
                    column.label = label;
                }
            }
            field.response = if decoded.rows.is_empty() {
                FieldResponse::empty()
            } else {
                FieldResponse::answered(FieldValue::Table(decoded.rows))
            };
        }
        _ => {}
    }

    match state {
        Some(ResponseState::Skipped) => field.response = FieldResponse::skipped(None),
        Some(ResponseState::Aborted) => field.response = FieldResponse::aborted(None),
        _ => {}
    }

    Ok(field)
}

fn is_select_mark(mark: char, option: &str, line: usize) -> Result<bool, ParseError> {
    match mark {
        ' ' => Ok(false),
        'x' | 'X' => Ok(true),
        _ => Err(err(
            line,
            ParseErrorKind::InvalidMark {
                mark,
                option: option.to_string(),
            },
        )),
    }
}

/// Iterates body lines that sit outside code fences.
fn outside_fences<'a>(body: &'a [(usize, &'a str)]) -> impl Iterator<Item = (usize, &'a str)> {
    let mut open: Option<CodeFence<'a>> = None;
    body.iter().filter_map(move |&(line, text)| {
        if let Some(fence) = &open {
            if fence.closes(text) {
                open = None;
            }
            return None;
        }
        if let Some(fence) = CodeFence::open(text) {
            open = Some(fence);
            return None;
        }
        Some((line, text))
    })
}

fn read_options(
    field_id: &str,
    options: &mut Vec<SelectOption>,
    body: &[(usize, &str)],
    field_line: usize,
) -> Result<Vec<(char, usize)>, ParseError> {
    let mut marks = Vec::new();
    let mut seen = HashSet::new();
    for (line, text) in outside_fences(body) {
        let Some(caps) = OPTION_LINE.captures(text) else {
            if CHECKBOX_PREFIX.is_match(text) {
                return Err(err(
                    line,
                    ParseErrorKind::MissingOptionId(text.trim().to_string()),
                ));
            }
            if !text.trim().is_empty() {
                log::debug!("line {line}: ignoring non-option line in field `{field_id}`");
            }
            continue;
        };
        let annotation = parse_tag(&caps[3]).map_err(|kind| err(line, kind))?;
        let Some(id) = annotation.attrs.id else {
            return Err(err(
                line,
                ParseErrorKind::MissingOptionId(text.trim().to_string()),
            ));
        };
        if !seen.insert(id.clone()) {
            return Err(err(line, ParseErrorKind::DuplicateId(format!("{field_id}.{id}"))));
        }
        let mark = caps[1].chars().next().unwrap_or(' ');
        options.push(SelectOption::new(id, &caps[2]));
        marks.push((mark, line));
    }
    if options.is_empty() {
        return Err(err(field_line, ParseErrorKind::NoOptions(field_id.to_string())));
    }
    Ok(marks)
}

fn table_lines<'a>(body: &'a [(usize, &'a str)]) -> Vec<(usize, &'a str)> {
    outside_fences(body)
        .filter(|(_, text)| text.trim_start().starts_with('|'))
        .collect()
}

/// Contents of the single value fence of a field, if any.
struct ValueFence {
    line: usize,
    text: String,
    literal: bool,
}

fn find_value_fence(
    field_id: &str,
    body: &[(usize, &str)],
) -> Result<Option<ValueFence>, ParseError> {
    let mut found: Option<ValueFence> = None;
    let mut lines = body.iter();
    while let Some(&(line, text)) = lines.next() {
        let Some(fence) = CodeFence::open(text) else {
            continue;
        };
        let mut inner = Vec::new();
        let mut closed = false;
        for &(_, text) in lines.by_ref() {
            if fence.closes(text) {
                closed = true;
                break;
            }
            inner.push(text);
        }
        if !closed {
            return Err(err(line, ParseErrorKind::UnclosedFence));
        }
        if !fence.is_value() {
            continue;
        }
        if found.is_some() {
            return Err(err(line, ParseErrorKind::DuplicateValue(field_id.to_string())));
        }
        found = Some(ValueFence {
            line,
            text: inner.join("\n"),
            literal: is_literal(fence.info, line)?,
        });
    }
    Ok(found)
}

/// `value {% process=false %}` turns off sentinel handling.
fn is_literal(info: &str, line: usize) -> Result<bool, ParseError> {
    let rest = info["value".len()..].trim();
    let Some(inner) = rest
        .strip_prefix("{%")
        .and_then(|rest| rest.strip_suffix("%}"))
    else {
        return Ok(false);
    };
    let mut tag = parse_tag(inner).map_err(|kind| err(line, kind))?;
    Ok(tag.attrs.take("process") == Some(AttrValue::Bool(false)))
}

fn read_value(field: &Field, body: &[(usize, &str)], line: usize) -> Result<FieldResponse, ParseError> {
    let Some(fence) = find_value_fence(&field.id, body)? else {
        return Ok(FieldResponse::empty());
    };
    if !fence.literal {
        match fence.text.trim() {
            SKIP_SENTINEL => return Ok(FieldResponse::skipped(None)),
            ABORT_SENTINEL => return Ok(FieldResponse::aborted(None)),
            _ => {}
        }
    }

    let text = fence.text;
    let kind = field.kind_tag();
    let bad = |text: &str| {
        err(
            fence.line,
            ParseErrorKind::InvalidValue {
                kind: kind.to_string(),
                text: text.to_string(),
            },
        )
    };
    let items = |text: &str| -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    };

    let value = match &field.kind {
        FieldKind::String(_) => FieldValue::String(text),
        FieldKind::Number(_) => {
            let trimmed = text.trim();
            let n = trimmed
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| bad(trimmed))?;
            FieldValue::Number(n)
        }
        FieldKind::Url => FieldValue::Url(text.trim().to_string()),
        FieldKind::Date(_) => {
            let trimmed = text.trim();
            FieldValue::Date(
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| bad(trimmed))?,
            )
        }
        FieldKind::Year(_) => {
            let trimmed = text.trim();
            FieldValue::Year(trimmed.parse().map_err(|_| bad(trimmed))?)
        }
        FieldKind::StringList(_) | FieldKind::UrlList(_) => {
            let items = items(&text);
            if items.is_empty() {
                return Ok(FieldResponse::empty());
            }
            if matches!(field.kind, FieldKind::UrlList(_)) {
                FieldValue::UrlList(items)
            } else {
                FieldValue::StringList(items)
            }
        }
        FieldKind::Checkboxes(_)
        | FieldKind::SingleSelect(_)
        | FieldKind::MultiSelect(_)
        | FieldKind::Table(_) => {
            log::debug!("line {line}: field `{}` has no value fence", field.id);
            return Ok(FieldResponse::empty());
        }
    };
    Ok(FieldResponse::answered(value))
}
