use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Field, Note, ResponseState};

/// Metadata read from the frontmatter block.
pub type Metadata = BTreeMap<String, serde_yaml::Value>;

/// Surface syntax used for directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `{% field ... %}` ... `{% /field %}`
    #[default]
    Tags,
    /// `<!-- f:field ... -->` ... `<!-- /f:field -->`
    Comments,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Tags => "tags",
            Dialect::Comments => "comments",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tags" => Some(Dialect::Tags),
            "comments" => Some(Dialect::Comments),
            _ => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The root document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<DocBlock>,
    pub groups: Vec<FieldGroup>,
    /// Kept sorted by id.
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Dialect the document was read in; only the serializer looks at it.
    #[serde(default)]
    pub dialect: Dialect,
}

impl Form {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            metadata: Metadata::new(),
            docs: Vec::new(),
            groups: Vec::new(),
            notes: Vec::new(),
            dialect: Dialect::Tags,
        }
    }

    /// All fields in document order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.groups.iter().flat_map(|g| g.fields.iter())
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields().find(|f| f.id == id)
    }

    pub(crate) fn field_mut(&mut self, id: &str) -> Option<&mut Field> {
        self.groups
            .iter_mut()
            .flat_map(|g| g.fields.iter_mut())
            .find(|f| f.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&FieldGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Inserts a note keeping `notes` sorted by id.
    pub(crate) fn insert_note(&mut self, note: Note) {
        let at = self
            .notes
            .partition_point(|existing| existing.id.as_str() < note.id.as_str());
        self.notes.insert(at, note);
    }

    /// First `n<k>` id not taken by an existing note.
    pub fn next_note_id(&self) -> String {
        (1..)
            .map(|k| format!("n{k}"))
            .find(|candidate| self.note(candidate).is_none())
            .unwrap_or_default()
    }

    /// Counts of field states across the whole form.
    pub fn progress(&self) -> FormProgress {
        let mut progress = FormProgress::default();
        for field in self.fields() {
            progress.total += 1;
            match field.response.state {
                ResponseState::Empty => progress.empty += 1,
                ResponseState::Answered => progress.answered += 1,
                ResponseState::Skipped => progress.skipped += 1,
                ResponseState::Aborted => progress.aborted += 1,
            }
            if field.required && field.response.state == ResponseState::Empty {
                progress.required_remaining += 1;
            }
        }
        progress
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FormProgress {
    pub total: usize,
    pub answered: usize,
    pub empty: usize,
    pub skipped: usize,
    pub aborted: usize,
    pub required_remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<DocBlock>,
    pub fields: Vec<Field>,
    /// Fields written directly inside the form; serialized without group tags.
    #[serde(default)]
    pub implicit: bool,
}

impl FieldGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            docs: Vec::new(),
            fields: Vec::new(),
            implicit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Description,
    Instructions,
    Documentation,
}

impl DocKind {
    pub fn tag_name(self) -> &'static str {
        match self {
            DocKind::Description => "description",
            DocKind::Instructions => "instructions",
            DocKind::Documentation => "documentation",
        }
    }

    pub fn from_tag(name: &str) -> Option<Self> {
        match name {
            "description" => Some(DocKind::Description),
            "instructions" => Some(DocKind::Instructions),
            "documentation" => Some(DocKind::Documentation),
            _ => None,
        }
    }
}

/// Free prose attached to the form, a group or a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocBlock {
    pub kind: DocKind,
    pub body: String,
}
