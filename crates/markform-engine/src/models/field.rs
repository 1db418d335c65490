use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{DocBlock, FieldResponse};

/// Which actor is expected to supply a field's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    #[default]
    Agent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "agent" => Some(Role::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// A single typed unit of data collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<DocBlock>,
    pub kind: FieldKind,
    #[serde(default)]
    pub response: FieldResponse,
}

impl Field {
    /// Creates an unanswered agent field with the given kind.
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            role: Role::Agent,
            required: false,
            priority: None,
            classes: Vec::new(),
            docs: Vec::new(),
            kind,
            response: FieldResponse::empty(),
        }
    }

    pub fn kind_tag(&self) -> KindTag {
        self.kind.tag()
    }

    /// Declared options for selection kinds, `None` for everything else.
    pub fn options(&self) -> Option<&[SelectOption]> {
        match &self.kind {
            FieldKind::Checkboxes(spec) => Some(&spec.options),
            FieldKind::SingleSelect(spec) => Some(&spec.options),
            FieldKind::MultiSelect(spec) => Some(&spec.options),
            _ => None,
        }
    }

    pub fn table(&self) -> Option<&TableSpec> {
        match &self.kind {
            FieldKind::Table(spec) => Some(spec),
            _ => None,
        }
    }

    /// True for a checkboxes field configured as a blocking approval checkpoint.
    pub fn is_checkpoint(&self) -> bool {
        matches!(
            &self.kind,
            FieldKind::Checkboxes(CheckboxesSpec {
                approval: ApprovalMode::Blocking,
                ..
            })
        )
    }
}

/// Kind-specific constraints, one variant per field kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    String(StringConstraints),
    Number(NumberConstraints),
    StringList(ListConstraints),
    Checkboxes(CheckboxesSpec),
    SingleSelect(SelectSpec),
    MultiSelect(MultiSelectSpec),
    Url,
    UrlList(ListConstraints),
    Date(DateConstraints),
    Year(YearConstraints),
    Table(TableSpec),
}

impl FieldKind {
    pub fn tag(&self) -> KindTag {
        match self {
            FieldKind::String(_) => KindTag::String,
            FieldKind::Number(_) => KindTag::Number,
            FieldKind::StringList(_) => KindTag::StringList,
            FieldKind::Checkboxes(_) => KindTag::Checkboxes,
            FieldKind::SingleSelect(_) => KindTag::SingleSelect,
            FieldKind::MultiSelect(_) => KindTag::MultiSelect,
            FieldKind::Url => KindTag::Url,
            FieldKind::UrlList(_) => KindTag::UrlList,
            FieldKind::Date(_) => KindTag::Date,
            FieldKind::Year(_) => KindTag::Year,
            FieldKind::Table(_) => KindTag::Table,
        }
    }
}

/// Data-free discriminant of [`FieldKind`], used in attributes and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    String,
    Number,
    StringList,
    Checkboxes,
    SingleSelect,
    MultiSelect,
    Url,
    UrlList,
    Date,
    Year,
    Table,
}

impl KindTag {
    pub const ALL: [KindTag; 11] = [
        KindTag::String,
        KindTag::Number,
        KindTag::StringList,
        KindTag::Checkboxes,
        KindTag::SingleSelect,
        KindTag::MultiSelect,
        KindTag::Url,
        KindTag::UrlList,
        KindTag::Date,
        KindTag::Year,
        KindTag::Table,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KindTag::String => "string",
            KindTag::Number => "number",
            KindTag::StringList => "string_list",
            KindTag::Checkboxes => "checkboxes",
            KindTag::SingleSelect => "single_select",
            KindTag::MultiSelect => "multi_select",
            KindTag::Url => "url",
            KindTag::UrlList => "url_list",
            KindTag::Date => "date",
            KindTag::Year => "year",
            KindTag::Table => "table",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Kinds whose value lives in a value fence.
    pub fn uses_value_fence(self) -> bool {
        !matches!(
            self,
            KindTag::Checkboxes | KindTag::SingleSelect | KindTag::MultiSelect | KindTag::Table
        )
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub integer: bool,
}

/// Constraints shared by `string_list` and `url_list`.
///
/// `item_min_length`/`item_max_length` are only honored for `string_list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_max_length: Option<usize>,
    #[serde(default)]
    pub unique_items: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxMode {
    #[default]
    Multi,
    Simple,
    Explicit,
}

impl CheckboxMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckboxMode::Multi => "multi",
            CheckboxMode::Simple => "simple",
            CheckboxMode::Explicit => "explicit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "multi" => Some(CheckboxMode::Multi),
            "simple" => Some(CheckboxMode::Simple),
            "explicit" => Some(CheckboxMode::Explicit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    #[default]
    None,
    Blocking,
}

impl ApprovalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalMode::None => "none",
            ApprovalMode::Blocking => "blocking",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ApprovalMode::None),
            "blocking" => Some(ApprovalMode::Blocking),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckboxesSpec {
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub mode: CheckboxMode,
    #[serde(default)]
    pub approval: ApprovalMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectSpec {
    pub options: Vec<SelectOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSelectSpec {
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_selections: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_selections: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i32>,
}

/// Declared type of a table column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Url,
    Date,
    Year,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Url => "url",
            ColumnType::Date => "date",
            ColumnType::Year => "year",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ColumnType::String),
            "number" => Some(ColumnType::Number),
            "url" => Some(ColumnType::Url),
            "date" => Some(ColumnType::Date),
            "year" => Some(ColumnType::Year),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub ty: ColumnType,
}

impl Column {
    pub fn new(id: impl Into<String>, label: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub min_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
}

impl TableSpec {
    /// Lower row bound once `required` is taken into account.
    pub fn effective_min_rows(&self, required: bool) -> usize {
        if required {
            self.min_rows.max(1)
        } else {
            self.min_rows
        }
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }
}
