use std::collections::HashSet;

use super::attrs::{Attrs, Tag, parse_tag};
use super::error::{ParseError, ParseErrorKind};
use super::fence::CodeFence;
use super::fields::{FieldDraft, finish_field, open_field};
use crate::models::{DocBlock, DocKind, Field, FieldGroup, Form, Note, NoteState, Role};
use crate::scope::is_valid_id;

const FORM: &str = "form";
const GROUP: &str = "group";
const GROUP_ALIAS: &str = "field-group";
const FIELD: &str = "field";
const NOTE: &str = "note";

/// An element whose closing tag has not been seen yet.
#[derive(Debug)]
enum Frame<'a> {
    Form {
        line: usize,
    },
    Group {
        line: usize,
        group: FieldGroup,
    },
    Field {
        draft: Box<FieldDraft>,
        body: Vec<(usize, &'a str)>,
    },
    Doc {
        line: usize,
        kind: DocKind,
        target: String,
        body: Vec<&'a str>,
    },
    Note {
        line: usize,
        note: Note,
        body: Vec<&'a str>,
    },
}

impl Frame<'_> {
    fn name(&self) -> &'static str {
        match self {
            Frame::Form { .. } => FORM,
            Frame::Group { .. } => GROUP,
            Frame::Field { .. } => FIELD,
            Frame::Doc { kind, .. } => kind.tag_name(),
            Frame::Note { .. } => NOTE,
        }
    }

    fn line(&self) -> usize {
        match self {
            Frame::Form { line }
            | Frame::Group { line, .. }
            | Frame::Doc { line, .. }
            | Frame::Note { line, .. } => *line,
            Frame::Field { draft, .. } => draft.line,
        }
    }

    fn closes_with(&self, name: &str) -> bool {
        match self {
            Frame::Group { .. } => name == GROUP || name == GROUP_ALIAS,
            _ => name == self.name(),
        }
    }

    /// Whether the frame collects raw lines rather than directives.
    fn is_opaque(&self) -> bool {
        matches!(self, Frame::Doc { .. } | Frame::Note { .. })
    }
}

#[derive(Debug)]
struct PendingDoc {
    line: usize,
    target: String,
    block: DocBlock,
}

/// Line-driven builder: feed every body line to [`FormBuilder::push`], then
/// call [`FormBuilder::finish`].
pub(crate) struct FormBuilder<'a> {
    form: Option<Form>,
    stack: Vec<Frame<'a>>,
    implicit: Option<FieldGroup>,
    implicit_count: usize,
    docs: Vec<PendingDoc>,
    notes: Vec<Note>,
    /// Form, group and field ids share one namespace.
    ids: HashSet<String>,
    note_ids: HashSet<String>,
    fence: Option<(usize, CodeFence<'a>)>,
}

impl<'a> FormBuilder<'a> {
    pub fn new() -> Self {
        Self {
            form: None,
            stack: Vec::new(),
            implicit: None,
            implicit_count: 0,
            docs: Vec::new(),
            notes: Vec::new(),
            ids: HashSet::new(),
            note_ids: HashSet::new(),
            fence: None,
        }
    }

    pub fn push(&mut self, line: usize, text: &'a str) -> Result<(), ParseError> {
        if let Some((_, fence)) = &self.fence {
            if fence.closes(text) {
                self.fence = None;
            }
            self.collect(line, text);
            return Ok(());
        }

        if let Some(inner) = tag_inner(text) {
            let opaque = self.stack.last().is_some_and(Frame::is_opaque);
            match parse_tag(inner) {
                Ok(tag) if opaque => {
                    let closes = self
                        .stack
                        .last()
                        .is_some_and(|top| tag.closing && top.closes_with(&tag.name));
                    if closes {
                        return self.close(line, &tag.name);
                    }
                }
                Ok(tag) if !tag.name.is_empty() => return self.directive(line, tag),
                Ok(_) => {}
                Err(kind) if !opaque => return Err(ParseError::new(line, kind)),
                Err(_) => {}
            }
        }

        if let Some(fence) = CodeFence::open(text) {
            self.fence = Some((line, fence));
        }
        self.collect(line, text);
        Ok(())
    }

    pub fn finish(mut self, last_line: usize) -> Result<Form, ParseError> {
        if let Some(top) = self.stack.last() {
            if let (Some((fence_line, _)), Frame::Field { .. }) = (&self.fence, top) {
                return Err(ParseError::new(*fence_line, ParseErrorKind::UnclosedFence));
            }
            return Err(ParseError::new(
                top.line(),
                ParseErrorKind::Unclosed(top.name().to_string()),
            ));
        }

        let Some(mut form) = self.form.take() else {
            return Err(ParseError::new(last_line.max(1), ParseErrorKind::MissingForm));
        };

        for doc in std::mem::take(&mut self.docs) {
            attach_doc(&mut form, doc)?;
        }

        self.notes.sort_by(|a, b| a.id.cmp(&b.id));
        form.notes = self.notes;
        Ok(form)
    }

    fn collect(&mut self, line: usize, text: &'a str) {
        match self.stack.last_mut() {
            Some(Frame::Field { body, .. }) => body.push((line, text)),
            Some(Frame::Doc { body, .. } | Frame::Note { body, .. }) => body.push(text),
            _ if text.trim().is_empty() => {}
            _ => log::debug!("line {line}: ignoring text outside fields"),
        }
    }

    fn directive(&mut self, line: usize, tag: Tag) -> Result<(), ParseError> {
        if tag.closing {
            return self.close(line, &tag.name);
        }
        let self_closing = tag.self_closing;
        let name = tag.name.clone();
        match name.as_str() {
            FORM => self.open_form(line, tag)?,
            GROUP | GROUP_ALIAS => self.open_group(line, tag)?,
            FIELD => self.open_field(line, tag)?,
            NOTE => self.open_note(line, tag)?,
            other => match DocKind::from_tag(other) {
                Some(kind) => self.open_doc(line, kind, tag)?,
                None => return Err(ParseError::new(line, ParseErrorKind::UnknownTag(name))),
            },
        }
        if self_closing {
            self.close(line, &name)?;
        }
        Ok(())
    }

    fn misplaced(line: usize, tag: &str, parent: &str) -> ParseError {
        ParseError::new(
            line,
            ParseErrorKind::Misplaced {
                tag: tag.to_string(),
                parent: parent.to_string(),
            },
        )
    }

    fn required_id(line: usize, tag: &str, attrs: &mut Attrs) -> Result<String, ParseError> {
        attrs.id.take().ok_or_else(|| {
            ParseError::new(
                line,
                ParseErrorKind::MissingAttribute {
                    tag: tag.to_string(),
                    attr: "id".to_string(),
                },
            )
        })
    }

    fn claim_id(&mut self, line: usize, id: &str) -> Result<(), ParseError> {
        if !is_valid_id(id) {
            return Err(ParseError::new(
                line,
                ParseErrorKind::InvalidAttribute {
                    attr: "id".to_string(),
                    expected: "made of letters, digits, `_` or `-`".to_string(),
                },
            ));
        }
        if !self.ids.insert(id.to_string()) {
            return Err(ParseError::new(line, ParseErrorKind::DuplicateId(id.to_string())));
        }
        Ok(())
    }

    fn open_form(&mut self, line: usize, tag: Tag) -> Result<(), ParseError> {
        if self.form.is_some() {
            return Err(ParseError::new(line, ParseErrorKind::MultipleForms));
        }
        if !self.stack.is_empty() {
            return Err(Self::misplaced(line, FORM, "the document root"));
        }
        let mut attrs = tag.attrs;
        let id = Self::required_id(line, FORM, &mut attrs)?;
        self.claim_id(line, &id)?;
        let mut form = Form::new(id);
        form.title = attrs
            .take_str("title")
            .map_err(|kind| ParseError::new(line, kind))?;
        log_leftovers(line, FORM, &attrs);
        self.form = Some(form);
        self.stack.push(Frame::Form { line });
        Ok(())
    }

    fn open_group(&mut self, line: usize, tag: Tag) -> Result<(), ParseError> {
        if !matches!(self.stack.last(), Some(Frame::Form { .. })) {
            return Err(Self::misplaced(line, &tag.name, FORM));
        }
        self.flush_implicit();
        let mut attrs = tag.attrs;
        let mut group = FieldGroup::new(Self::required_id(line, GROUP, &mut attrs)?);
        self.claim_id(line, &group.id)?;
        group.title = attrs
            .take_str("title")
            .map_err(|kind| ParseError::new(line, kind))?;
        log_leftovers(line, GROUP, &attrs);
        self.stack.push(Frame::Group { line, group });
        Ok(())
    }

    fn open_field(&mut self, line: usize, tag: Tag) -> Result<(), ParseError> {
        if !matches!(
            self.stack.last(),
            Some(Frame::Form { .. } | Frame::Group { .. })
        ) {
            return Err(Self::misplaced(line, FIELD, "form or group"));
        }
        let draft = open_field(tag, line)?;
        self.claim_id(line, &draft.field.id)?;
        self.stack.push(Frame::Field {
            draft: Box::new(draft),
            body: Vec::new(),
        });
        Ok(())
    }

    fn open_note(&mut self, line: usize, tag: Tag) -> Result<(), ParseError> {
        let at = |kind| ParseError::new(line, kind);
        let mut attrs = tag.attrs;
        let id = Self::required_id(line, NOTE, &mut attrs)?;
        if !self.note_ids.insert(id.clone()) {
            return Err(at(ParseErrorKind::DuplicateId(id)));
        }
        let target = attrs.take_str("ref").map_err(at)?.ok_or_else(|| {
            at(ParseErrorKind::MissingAttribute {
                tag: NOTE.to_string(),
                attr: "ref".to_string(),
            })
        })?;
        let role = match attrs.take_str("role").map_err(at)? {
            None => Role::default(),
            Some(role) => Role::parse(&role).ok_or_else(|| {
                at(ParseErrorKind::InvalidAttribute {
                    attr: "role".to_string(),
                    expected: "user or agent".to_string(),
                })
            })?,
        };
        let state = match attrs.take_str("state").map_err(at)? {
            None => None,
            Some(state) => Some(NoteState::parse(&state).ok_or_else(|| {
                at(ParseErrorKind::InvalidAttribute {
                    attr: "state".to_string(),
                    expected: "skipped or aborted".to_string(),
                })
            })?),
        };
        log_leftovers(line, NOTE, &attrs);
        self.stack.push(Frame::Note {
            line,
            note: Note {
                id,
                target,
                role,
                state,
                text: String::new(),
            },
            body: Vec::new(),
        });
        Ok(())
    }

    fn open_doc(&mut self, line: usize, kind: DocKind, tag: Tag) -> Result<(), ParseError> {
        let owner = match self.stack.last() {
            Some(Frame::Field { draft, .. }) => draft.field.id.clone(),
            Some(Frame::Group { group, .. }) => group.id.clone(),
            Some(Frame::Form { .. }) => self
                .form
                .as_ref()
                .map(|form| form.id.clone())
                .unwrap_or_default(),
            _ => return Err(Self::misplaced(line, kind.tag_name(), FORM)),
        };
        let mut attrs = tag.attrs;
        let target = attrs
            .take_str("ref")
            .map_err(|e| ParseError::new(line, e))?
            .unwrap_or(owner);
        log_leftovers(line, kind.tag_name(), &attrs);
        self.stack.push(Frame::Doc {
            line,
            kind,
            target,
            body: Vec::new(),
        });
        Ok(())
    }

    fn close(&mut self, line: usize, name: &str) -> Result<(), ParseError> {
        let matches_top = self.stack.last().is_some_and(|top| top.closes_with(name));
        let Some(top) = self.stack.pop().filter(|_| matches_top) else {
            return Err(ParseError::new(
                line,
                ParseErrorKind::UnexpectedClose(name.to_string()),
            ));
        };

        match top {
            Frame::Form { .. } => {
                self.flush_implicit();
            }
            Frame::Group { group, .. } => {
                if let Some(form) = self.form.as_mut() {
                    form.groups.push(group);
                }
            }
            Frame::Field { draft, body } => {
                let field = finish_field(*draft, &body)?;
                self.add_field(field);
            }
            Frame::Doc {
                line,
                kind,
                target,
                body,
            } => self.docs.push(PendingDoc {
                line,
                target,
                block: DocBlock {
                    kind,
                    body: join_body(&body),
                },
            }),
            Frame::Note { mut note, body, .. } => {
                note.text = join_body(&body);
                self.notes.push(note);
            }
        }
        Ok(())
    }

    fn add_field(&mut self, field: Field) {
        if let Some(Frame::Group { group, .. }) = self.stack.last_mut() {
            group.fields.push(field);
            return;
        }
        let count = &mut self.implicit_count;
        self.implicit
            .get_or_insert_with(|| {
                *count += 1;
                let mut group = FieldGroup::new(format!("_fields_{count}"));
                group.implicit = true;
                group
            })
            .fields
            .push(field);
    }

    fn flush_implicit(&mut self) {
        if let (Some(group), Some(form)) = (self.implicit.take(), self.form.as_mut()) {
            form.groups.push(group);
        }
    }
}

impl Default for FormBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Text between `{%` and `%}` when the line holds exactly one directive.
fn tag_inner(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.len() < 4 {
        return None;
    }
    trimmed.strip_prefix("{%")?.strip_suffix("%}")
}

/// Joins body lines, dropping blank lines at either end.
fn join_body(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}

fn log_leftovers(line: usize, tag: &str, attrs: &Attrs) {
    for key in attrs.leftover_keys() {
        log::debug!("line {line}: ignoring unknown attribute `{key}` on `{tag}`");
    }
}

fn attach_doc(form: &mut Form, doc: PendingDoc) -> Result<(), ParseError> {
    let PendingDoc {
        line,
        target,
        block,
    } = doc;
    if target == form.id {
        form.docs.push(block);
        return Ok(());
    }
    if let Some(group) = form
        .groups
        .iter_mut()
        .find(|g| !g.implicit && g.id == target)
    {
        group.docs.push(block);
        return Ok(());
    }
    match form.field_mut(&target) {
        Some(field) => {
            field.docs.push(block);
            Ok(())
        }
        None => Err(ParseError::new(
            line,
            ParseErrorKind::UnresolvedDocRef(target),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn build(text: &str) -> Result<Form, ParseError> {
        let mut builder = FormBuilder::new();
        let mut last = 0;
        for (i, line) in text.lines().enumerate() {
            builder.push(i + 1, line)?;
            last = i + 1;
        }
        builder.finish(last)
    }

    #[test]
    fn join_body_trims_blank_edges() {
        assert_eq!(join_body(&["", "  a", "", "b", "  "]), "  a\n\nb");
        assert_eq!(join_body(&["", " "]), "");
    }

    #[test]
    fn fields_outside_groups_form_implicit_groups() {
        let form = build(concat!(
            "{% form id=\"f\" %}\n",
            "{% field kind=\"url\" id=\"a\" label=\"A\" %}{% /field %}\n",
            "{% field kind=\"url\" id=\"a\" label=\"A\" /%}\n",
        ));
        // the first line holds two tags, so it is not a directive line
        assert!(form.is_err());

        let form = build(concat!(
            "{% form id=\"f\" %}\n",
            "{% field kind=\"url\" id=\"a\" label=\"A\" /%}\n",
            "{% group id=\"g\" %}\n",
            "{% field kind=\"url\" id=\"b\" label=\"B\" /%}\n",
            "{% /group %}\n",
            "{% field kind=\"url\" id=\"c\" label=\"C\" /%}\n",
            "{% /form %}\n",
        ))
        .unwrap();
        let ids: Vec<_> = form.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["_fields_1", "g", "_fields_2"]);
        assert!(form.groups[0].implicit);
        assert!(!form.groups[1].implicit);
    }

    #[test]
    fn tags_inside_fences_are_inert() {
        let form = build(concat!(
            "{% form id=\"f\" %}\n",
            "```\n",
            "{% field kind=\"url\" id=\"a\" label=\"A\" /%}\n",
            "```\n",
            "{% /form %}\n",
        ))
        .unwrap();
        assert!(form.groups.is_empty());
    }

    #[test]
    fn docs_attach_to_innermost_element_or_ref() {
        let form = build(concat!(
            "{% form id=\"f\" %}\n",
            "{% description %}\n",
            "About the form.\n",
            "{% /description %}\n",
            "{% group id=\"g\" %}\n",
            "{% field kind=\"url\" id=\"a\" label=\"A\" %}\n",
            "{% /field %}\n",
            "{% instructions ref=\"a\" %}\n",
            "Paste a link.\n",
            "{% /instructions %}\n",
            "{% /group %}\n",
            "{% /form %}\n",
        ))
        .unwrap();
        assert_eq!(form.docs[0].body, "About the form.");
        assert_eq!(form.docs[0].kind, DocKind::Description);
        let field = form.field("a").unwrap();
        assert_eq!(field.docs[0].kind, DocKind::Instructions);
        assert_eq!(field.docs[0].body, "Paste a link.");
    }

    #[test]
    fn doc_bodies_are_opaque() {
        let form = build(concat!(
            "{% form id=\"f\" %}\n",
            "{% documentation %}\n",
            "{% field kind=\"nope\" %}\n",
            "{% /documentation %}\n",
            "{% /form %}\n",
        ))
        .unwrap();
        assert_eq!(form.docs[0].body, "{% field kind=\"nope\" %}");
    }

    #[test]
    fn unresolved_doc_ref_is_an_error() {
        let err = build(concat!(
            "{% form id=\"f\" %}\n",
            "{% description ref=\"ghost\" %}\n",
            "{% /description %}\n",
            "{% /form %}\n",
        ))
        .unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(
            err.kind,
            ParseErrorKind::UnresolvedDocRef("ghost".to_string())
        );
    }

    #[test]
    fn notes_are_sorted_and_allowed_after_the_form() {
        let form = build(concat!(
            "{% form id=\"f\" %}\n",
            "{% field kind=\"url\" id=\"a\" label=\"A\" /%}\n",
            "{% note id=\"n2\" ref=\"a\" %}\n",
            "Second.\n",
            "{% /note %}\n",
            "{% /form %}\n",
            "{% note id=\"n1\" ref=\"a\" role=\"user\" state=\"skipped\" %}\n",
            "First.\n",
            "{% /note %}\n",
        ))
        .unwrap();
        let ids: Vec<_> = form.notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["n1", "n2"]);
        assert_eq!(form.notes[0].role, Role::User);
        assert_eq!(form.notes[0].state, Some(NoteState::Skipped));
        assert_eq!(form.notes[0].text, "First.");
    }

    #[test]
    fn structural_errors() {
        let cases = [
            ("", ParseErrorKind::MissingForm),
            (
                "{% form id=\"f\" %}\n{% /form %}\n{% form id=\"g\" %}\n",
                ParseErrorKind::MultipleForms,
            ),
            (
                "{% form id=\"f\" %}\n{% widget %}\n",
                ParseErrorKind::UnknownTag("widget".to_string()),
            ),
            (
                "{% form id=\"f\" %}\n{% /group %}\n",
                ParseErrorKind::UnexpectedClose("group".to_string()),
            ),
            (
                "{% form id=\"f\" %}\n",
                ParseErrorKind::Unclosed("form".to_string()),
            ),
            (
                "{% field kind=\"url\" id=\"a\" label=\"A\" /%}\n",
                ParseErrorKind::Misplaced {
                    tag: "field".to_string(),
                    parent: "form or group".to_string(),
                },
            ),
            (
                "{% form id=\"f\" %}\n{% field kind=\"url\" id=\"a\" label=\"A\" /%}\n{% field kind=\"url\" id=\"a\" label=\"A\" /%}\n",
                ParseErrorKind::DuplicateId("a".to_string()),
            ),
            (
                "{% form id=\"f\" %}\n{% group id=\"g\" %}\n{% field kind=\"url\" id=\"g\" label=\"G\" /%}\n",
                ParseErrorKind::DuplicateId("g".to_string()),
            ),
            (
                "{% form id=\"f\" %}\n{% field kind=\"url\" id=\"f\" label=\"F\" /%}\n",
                ParseErrorKind::DuplicateId("f".to_string()),
            ),
            (
                "{% form id=\"f\" %}\n{% field kind=\"url\" id=\"a.b\" label=\"A\" /%}\n",
                ParseErrorKind::InvalidAttribute {
                    attr: "id".to_string(),
                    expected: "made of letters, digits, `_` or `-`".to_string(),
                },
            ),
            (
                "{% form id=\"f\" %}\n{% field kind=\"url\" id=\"a\" label=\"A\" %}\n```value\n",
                ParseErrorKind::UnclosedFence,
            ),
        ];
        for (text, expected) in cases {
            assert_eq!(build(text).unwrap_err().kind, expected, "{text}");
        }
    }

    #[test]
    fn error_lines_are_one_based() {
        let err = build("{% form id=\"f\" %}\n\n{% widget %}\n").unwrap_err();
        assert_eq!(err.line, 3);
    }
}
