//! Canonical text output.
//!
//! Serialization is deterministic: attribute order, blank lines, fence
//! choice and note order depend only on the form. Anything the parser can
//! read comes back out in a shape the parser reads back to the same form.

pub mod fence;

use serde_json::Value as JsonValue;

use crate::models::{
    CheckboxMode, CheckboxState, ColumnType, DocBlock, Dialect, Field, FieldGroup, FieldKind,
    FieldValue, Form, Note, ResponseState, Role, SelectOption, format_number,
};
use crate::parsing::{ABORT_SENTINEL, SKIP_SENTINEL};
use crate::table;

pub use fence::{choose_fence, needs_literal};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Overrides the dialect recorded on the form.
    pub dialect: Option<Dialect>,
}

impl SerializeOptions {
    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect: Some(dialect),
        }
    }
}

/// Writes `form` as a canonical document.
pub fn serialize(form: &Form, options: SerializeOptions) -> String {
    let writer = Writer {
        dialect: options.dialect.unwrap_or(form.dialect),
    };
    let mut blocks = Vec::new();

    if let Some(frontmatter) = frontmatter(form) {
        blocks.push(frontmatter);
    }

    let mut open = writer.attrs();
    open.str("id", &form.id);
    open.opt_str("title", form.title.as_deref());
    blocks.push(writer.open("form", &open));
    writer.docs(&mut blocks, &form.id, &form.docs);

    for group in &form.groups {
        writer.group(&mut blocks, group);
    }
    for note in &form.notes {
        blocks.push(writer.note(note));
    }

    blocks.push(writer.close("form"));

    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

fn frontmatter(form: &Form) -> Option<String> {
    if form.metadata.is_empty() {
        return None;
    }
    match serde_yaml::to_string(&form.metadata) {
        Ok(yaml) => Some(format!("---\n{yaml}---")),
        Err(e) => {
            log::warn!("dropping frontmatter of `{}`: {e}", form.id);
            None
        }
    }
}

/// Attribute list in the order it is pushed.
struct Attrs {
    dialect: Dialect,
    parts: Vec<String>,
}

impl Attrs {
    fn quote(&self, value: &str) -> String {
        let quoted = JsonValue::from(value).to_string();
        match self.dialect {
            Dialect::Tags => quoted,
            // `-->` would end the comment
            Dialect::Comments => quoted.replace('>', "\\u003e"),
        }
    }

    fn str(&mut self, key: &str, value: &str) {
        let quoted = self.quote(value);
        self.parts.push(format!("{key}={quoted}"));
    }

    fn opt_str(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.str(key, value);
        }
    }

    fn raw(&mut self, key: &str, value: impl ToString) {
        self.parts.push(format!("{key}={}", value.to_string()));
    }

    fn opt_raw<T: ToString>(&mut self, key: &str, value: Option<T>) {
        if let Some(value) = value {
            self.raw(key, value);
        }
    }

    fn opt_num(&mut self, key: &str, value: Option<f64>) {
        self.opt_raw(key, value.map(format_number));
    }

    fn flag(&mut self, key: &str, set: bool) {
        if set {
            self.raw(key, true);
        }
    }

    fn list(&mut self, key: &str, items: impl IntoIterator<Item = impl AsRef<str>>) {
        let items: Vec<String> = items.into_iter().map(|i| self.quote(i.as_ref())).collect();
        self.parts.push(format!("{key}=[{}]", items.join(", ")));
    }

    fn class(&mut self, class: &str) {
        self.parts.push(format!(".{class}"));
    }
}

struct Writer {
    dialect: Dialect,
}

impl Writer {
    fn attrs(&self) -> Attrs {
        Attrs {
            dialect: self.dialect,
            parts: Vec::new(),
        }
    }

    fn open(&self, name: &str, attrs: &Attrs) -> String {
        let mut inner = name.to_string();
        for part in &attrs.parts {
            inner.push(' ');
            inner.push_str(part);
        }
        match self.dialect {
            Dialect::Tags => format!("{{% {inner} %}}"),
            Dialect::Comments => format!("<!-- f:{inner} -->"),
        }
    }

    fn close(&self, name: &str) -> String {
        match self.dialect {
            Dialect::Tags => format!("{{% /{name} %}}"),
            Dialect::Comments => format!("<!-- /f:{name} -->"),
        }
    }

    fn annotation(&self, id: &str) -> String {
        let simple = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        let inner = if simple {
            format!("#{id}")
        } else {
            let mut attrs = self.attrs();
            attrs.str("id", id);
            attrs.parts.join(" ")
        };
        match self.dialect {
            Dialect::Tags => format!("{{% {inner} %}}"),
            Dialect::Comments => format!("<!-- {inner} -->"),
        }
    }

    /// `open`, body lines, `close` as one block.
    fn element(&self, open: String, body: Vec<String>, name: &str) -> String {
        let mut lines = vec![open];
        lines.extend(body);
        lines.push(self.close(name));
        lines.join("\n")
    }

    fn text_element(&self, name: &str, attrs: &Attrs, text: &str) -> String {
        let body = if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
        self.element(self.open(name, attrs), body, name)
    }

    fn docs(&self, blocks: &mut Vec<String>, target: &str, docs: &[DocBlock]) {
        for doc in docs {
            let mut attrs = self.attrs();
            attrs.str("ref", target);
            blocks.push(self.text_element(doc.kind.tag_name(), &attrs, &doc.body));
        }
    }

    fn note(&self, note: &Note) -> String {
        let mut attrs = self.attrs();
        attrs.str("id", &note.id);
        attrs.str("ref", &note.target);
        attrs.str("role", note.role.as_str());
        attrs.opt_str("state", note.state.map(|s| s.as_str()));
        self.text_element("note", &attrs, &note.text)
    }

    fn group(&self, blocks: &mut Vec<String>, group: &FieldGroup) {
        if group.implicit {
            for field in &group.fields {
                self.field(blocks, field);
            }
            return;
        }
        let mut attrs = self.attrs();
        attrs.str("id", &group.id);
        attrs.opt_str("title", group.title.as_deref());
        blocks.push(self.open("group", &attrs));
        self.docs(blocks, &group.id, &group.docs);
        for field in &group.fields {
            self.field(blocks, field);
        }
        blocks.push(self.close("group"));
    }

    fn field(&self, blocks: &mut Vec<String>, field: &Field) {
        let open = self.open("field", &self.field_attrs(field));
        blocks.push(self.element(open, self.field_body(field), "field"));
        self.docs(blocks, &field.id, &field.docs);
    }

    fn field_attrs(&self, field: &Field) -> Attrs {
        let mut attrs = self.attrs();
        attrs.str("kind", field.kind_tag().as_str());
        attrs.str("id", &field.id);
        attrs.str("label", &field.label);
        if field.role != Role::Agent {
            attrs.str("role", field.role.as_str());
        }
        attrs.flag("required", field.required);
        attrs.opt_str("priority", field.priority.map(|p| p.as_str()));

        match &field.kind {
            FieldKind::String(c) => {
                attrs.opt_raw("minLength", c.min_length);
                attrs.opt_raw("maxLength", c.max_length);
                attrs.opt_str("pattern", c.pattern.as_deref());
            }
            FieldKind::Number(c) => {
                attrs.opt_num("min", c.min);
                attrs.opt_num("max", c.max);
                attrs.flag("integer", c.integer);
            }
            FieldKind::StringList(c) => {
                attrs.opt_raw("minItems", c.min_items);
                attrs.opt_raw("maxItems", c.max_items);
                attrs.opt_raw("itemMinLength", c.item_min_length);
                attrs.opt_raw("itemMaxLength", c.item_max_length);
                attrs.flag("uniqueItems", c.unique_items);
            }
            FieldKind::UrlList(c) => {
                attrs.opt_raw("minItems", c.min_items);
                attrs.opt_raw("maxItems", c.max_items);
                attrs.flag("uniqueItems", c.unique_items);
            }
            FieldKind::Checkboxes(spec) => {
                if spec.mode != CheckboxMode::default() {
                    attrs.str("checkboxMode", spec.mode.as_str());
                }
                if spec.approval != Default::default() {
                    attrs.str("approvalMode", spec.approval.as_str());
                }
            }
            FieldKind::SingleSelect(_) | FieldKind::Url => {}
            FieldKind::MultiSelect(spec) => {
                attrs.opt_raw("minSelections", spec.min_selections);
                attrs.opt_raw("maxSelections", spec.max_selections);
            }
            FieldKind::Date(c) => {
                let date = |d: chrono::NaiveDate| d.format("%Y-%m-%d").to_string();
                attrs.opt_str("min", c.min.map(date).as_deref());
                attrs.opt_str("max", c.max.map(date).as_deref());
            }
            FieldKind::Year(c) => {
                attrs.opt_raw("min", c.min);
                attrs.opt_raw("max", c.max);
            }
            FieldKind::Table(spec) => {
                attrs.list("columnIds", spec.columns.iter().map(|c| c.id.as_str()));
                if spec.columns.iter().any(|c| c.ty != ColumnType::String) {
                    attrs.list("columnTypes", spec.columns.iter().map(|c| c.ty.as_str()));
                }
                if spec.min_rows > 0 {
                    attrs.raw("minRows", spec.min_rows);
                }
                attrs.opt_raw("maxRows", spec.max_rows);
            }
        }

        if !field.kind_tag().uses_value_fence() {
            match field.response.state {
                ResponseState::Skipped | ResponseState::Aborted => {
                    attrs.str("state", field.response.state.as_str());
                }
                ResponseState::Empty | ResponseState::Answered => {}
            }
        }
        for class in &field.classes {
            attrs.class(class);
        }
        attrs
    }

    fn field_body(&self, field: &Field) -> Vec<String> {
        let answered = match field.response.state {
            ResponseState::Answered => field.response.value.as_ref(),
            _ => None,
        };
        match &field.kind {
            FieldKind::Checkboxes(spec) => {
                let states = match answered {
                    Some(FieldValue::Checkboxes(states)) => Some(states),
                    _ => None,
                };
                let initial = CheckboxState::initial(spec.mode);
                spec.options
                    .iter()
                    .map(|option| {
                        let state = states
                            .and_then(|s| s.get(&option.id))
                            .copied()
                            .unwrap_or(initial);
                        self.option_line(state.mark(), option)
                    })
                    .collect()
            }
            FieldKind::SingleSelect(spec) => {
                let selected = match answered {
                    Some(FieldValue::SingleSelect(id)) => Some(id.as_str()),
                    _ => None,
                };
                spec.options
                    .iter()
                    .map(|o| self.option_line(select_mark(selected == Some(o.id.as_str())), o))
                    .collect()
            }
            FieldKind::MultiSelect(spec) => {
                let selected: &[String] = match answered {
                    Some(FieldValue::MultiSelect(ids)) => ids,
                    _ => &[],
                };
                spec.options
                    .iter()
                    .map(|o| self.option_line(select_mark(selected.contains(&o.id)), o))
                    .collect()
            }
            FieldKind::Table(spec) => {
                let rows = match answered {
                    Some(FieldValue::Table(rows)) => rows.as_slice(),
                    _ => &[],
                };
                table::encode(&spec.columns, rows)
            }
            _ => match field.response.state {
                ResponseState::Empty => Vec::new(),
                ResponseState::Skipped => fence::sentinel_fence(SKIP_SENTINEL),
                ResponseState::Aborted => fence::sentinel_fence(ABORT_SENTINEL),
                ResponseState::Answered => match answered.and_then(value_text) {
                    Some(text) => fence::value_fence(&text),
                    None => {
                        log::warn!("field `{}` is answered without a usable value", field.id);
                        Vec::new()
                    }
                },
            },
        }
    }

    fn option_line(&self, mark: char, option: &SelectOption) -> String {
        format!("- [{mark}] {} {}", option.label, self.annotation(&option.id))
    }
}

fn select_mark(selected: bool) -> char {
    if selected { 'x' } else { ' ' }
}

/// Fence text of a value-fence kind.
fn value_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::StringList(items) | FieldValue::UrlList(items) => Some(items.join("\n")),
        other => other.scalar_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StringConstraints;
    use crate::parsing::parse;
    use pretty_assertions::assert_eq;

    const CANONICAL: &str = r#"---
title: Quarterly review
---

{% form id="review" title="Quarterly review" %}

{% instructions ref="review" %}
Fill every section.
{% /instructions %}

{% group id="basics" title="Basics" %}

{% field kind="string" id="name" label="Name" role="user" required=true minLength=2 %}
```value
Ada
```
{% /field %}

{% description ref="name" %}
Legal name.
{% /description %}

{% field kind="single_select" id="outlook" label="Outlook" %}
- [x] Bullish {% #bullish %}
- [ ] Bearish {% #bearish %}
{% /field %}

{% field kind="table" id="team" label="Team" columnIds=["name", "age"] columnTypes=["string", "number"] minRows=1 %}
| Name | Age |
| --- | --- |
| Ada | 36 |
| Bob | %SKIP% (unknown) |
{% /field %}

{% /group %}

{% field kind="year" id="founded" label="Founded" min=1900 %}
```value
|SKIP|
```
{% /field %}

{% field kind="checkboxes" id="steps" label="Steps" checkboxMode="simple" state="skipped" .wide %}
- [ ] Plan {% #plan %}
{% /field %}

{% note id="n1" ref="founded" role="agent" state="skipped" %}
Not provided.
{% /note %}

{% /form %}
"#;

    #[test]
    fn canonical_text_is_a_fixed_point() {
        let form = parse(CANONICAL).unwrap();
        assert_eq!(serialize(&form, SerializeOptions::default()), CANONICAL);
    }

    #[test]
    fn minimal_form() {
        let mut form = Form::new("f");
        let mut group = FieldGroup::new("_fields_1");
        group.implicit = true;
        let mut field = Field::new("bio", "Bio", FieldKind::String(StringConstraints::default()));
        field.role = Role::User;
        group.fields.push(field);
        form.groups.push(group);

        insta::assert_snapshot!(serialize(&form, SerializeOptions::default()), @r#"
        {% form id="f" %}

        {% field kind="string" id="bio" label="Bio" role="user" %}
        {% /field %}

        {% /form %}
        "#);
    }

    #[test]
    fn comment_dialect_output_parses_back() {
        let form = parse(CANONICAL).unwrap();
        let text = serialize(&form, SerializeOptions::with_dialect(Dialect::Comments));
        assert!(text.contains("<!-- f:form id=\"review\" title=\"Quarterly review\" -->"));
        assert!(text.contains("- [x] Bullish <!-- #bullish -->"));
        assert!(text.contains("<!-- /f:field -->"));
        assert!(!text.contains("{% /"));

        let mut reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.dialect, Dialect::Comments);
        reparsed.dialect = Dialect::Tags;
        assert_eq!(reparsed, form);
        assert_eq!(serialize(&parse(&text).unwrap(), SerializeOptions::default()), text);
    }

    #[test]
    fn comment_dialect_escapes_comment_terminators() {
        let mut form = Form::new("f");
        form.title = Some("a --> b".to_string());
        let text = serialize(&form, SerializeOptions::with_dialect(Dialect::Comments));
        assert!(text.starts_with(r#"<!-- f:form id="f" title="a --\u003e b" -->"#));
        assert_eq!(parse(&text).unwrap().title.as_deref(), Some("a --> b"));
    }

    #[test]
    fn values_needing_protection_round_trip() {
        let source = "{% form id=\"f\" %}\n\n{% field kind=\"string\" id=\"s\" label=\"S\" %}\n{% /field %}\n\n{% /form %}\n";
        let mut form = parse(source).unwrap();
        for value in ["|SKIP|", "see {% this %}", "`````\nfenced\n`````", "", "  padded\n"] {
            form.field_mut("s").unwrap().response =
                crate::models::FieldResponse::answered(FieldValue::String(value.to_string()));
            let text = serialize(&form, SerializeOptions::default());
            assert_eq!(parse(&text).unwrap(), form, "{text}");
        }
    }

    #[test]
    fn attribute_strings_are_escaped() {
        let mut form = Form::new("f");
        form.title = Some("say \"hi\"\\now".to_string());
        let text = serialize(&form, SerializeOptions::default());
        assert!(text.starts_with(r#"{% form id="f" title="say \"hi\"\\now" %}"#));
        assert_eq!(parse(&text).unwrap().title, form.title);
    }
}
