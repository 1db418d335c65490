use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::CheckboxMode;

/// Fill state of a field or table cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseState {
    #[default]
    Empty,
    Answered,
    Skipped,
    Aborted,
}

impl ResponseState {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseState::Empty => "empty",
            ResponseState::Answered => "answered",
            ResponseState::Skipped => "skipped",
            ResponseState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current response of a field, or of a single table cell.
///
/// Invariants: `Empty` carries no value, `Answered` always carries one,
/// `Skipped`/`Aborted` carry no value. `reason` is only used by table cells
/// (`%SKIP% (reason)`); field-level rationale lives in notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldResponse {
    pub state: ResponseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FieldResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn answered(value: FieldValue) -> Self {
        Self {
            state: ResponseState::Answered,
            value: Some(value),
            reason: None,
        }
    }

    pub fn skipped(reason: Option<String>) -> Self {
        Self {
            state: ResponseState::Skipped,
            value: None,
            reason,
        }
    }

    pub fn aborted(reason: Option<String>) -> Self {
        Self {
            state: ResponseState::Aborted,
            value: None,
            reason,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.state == ResponseState::Answered
    }
}

/// A typed field value. Table cells use the scalar variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Number(f64),
    StringList(Vec<String>),
    Checkboxes(BTreeMap<String, CheckboxState>),
    SingleSelect(String),
    MultiSelect(Vec<String>),
    Url(String),
    UrlList(Vec<String>),
    Date(NaiveDate),
    Year(i32),
    Table(Vec<TableRow>),
}

impl FieldValue {
    /// Text form of a scalar value as written in a value fence or table cell.
    ///
    /// Returns `None` for list, selection and table values.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            FieldValue::String(s) | FieldValue::Url(s) => Some(s.clone()),
            FieldValue::Number(n) => Some(format_number(*n)),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::Year(y) => Some(y.to_string()),
            _ => None,
        }
    }
}

/// One table row: a response per declared column, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<FieldResponse>,
}

impl TableRow {
    pub fn new(cells: Vec<FieldResponse>) -> Self {
        Self { cells }
    }
}

/// Per-option state of a checkboxes field.
///
/// Which states are legal depends on the field's [`CheckboxMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxState {
    Todo,
    Done,
    Incomplete,
    Active,
    Na,
    Unfilled,
    Yes,
    No,
}

impl CheckboxState {
    /// The character between the brackets of a task-list item.
    pub fn mark(self) -> char {
        match self {
            CheckboxState::Todo | CheckboxState::Unfilled => ' ',
            CheckboxState::Done => 'x',
            CheckboxState::Incomplete => '/',
            CheckboxState::Active => '*',
            CheckboxState::Na => '-',
            CheckboxState::Yes => 'y',
            CheckboxState::No => 'n',
        }
    }

    pub fn from_mark(mark: char, mode: CheckboxMode) -> Option<Self> {
        let state = match (mode, mark) {
            (CheckboxMode::Explicit, ' ') => CheckboxState::Unfilled,
            (CheckboxMode::Explicit, 'y' | 'Y') => CheckboxState::Yes,
            (CheckboxMode::Explicit, 'n' | 'N') => CheckboxState::No,
            (CheckboxMode::Explicit, _) => return None,
            (_, ' ') => CheckboxState::Todo,
            (_, 'x' | 'X') => CheckboxState::Done,
            (CheckboxMode::Multi, '/') => CheckboxState::Incomplete,
            (CheckboxMode::Multi, '*') => CheckboxState::Active,
            (CheckboxMode::Multi, '-') => CheckboxState::Na,
            _ => return None,
        };
        Some(state)
    }

    pub fn allowed_in(self, mode: CheckboxMode) -> bool {
        match mode {
            CheckboxMode::Multi => matches!(
                self,
                CheckboxState::Todo
                    | CheckboxState::Done
                    | CheckboxState::Incomplete
                    | CheckboxState::Active
                    | CheckboxState::Na
            ),
            CheckboxMode::Simple => matches!(self, CheckboxState::Todo | CheckboxState::Done),
            CheckboxMode::Explicit => matches!(
                self,
                CheckboxState::Unfilled | CheckboxState::Yes | CheckboxState::No
            ),
        }
    }

    /// The state every option starts in for a given mode.
    pub fn initial(mode: CheckboxMode) -> Self {
        match mode {
            CheckboxMode::Explicit => CheckboxState::Unfilled,
            CheckboxMode::Multi | CheckboxMode::Simple => CheckboxState::Todo,
        }
    }

    /// Whether the option needs no further work.
    pub fn is_settled(self, mode: CheckboxMode) -> bool {
        match mode {
            CheckboxMode::Multi => matches!(self, CheckboxState::Done | CheckboxState::Na),
            CheckboxMode::Simple => self == CheckboxState::Done,
            CheckboxMode::Explicit => matches!(self, CheckboxState::Yes | CheckboxState::No),
        }
    }
}

/// Formats a number the way it is written in documents (`36`, `2.5`).
pub fn format_number(n: f64) -> String {
    format!("{n}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CheckboxMode::Multi, ' ', Some(CheckboxState::Todo))]
    #[case(CheckboxMode::Multi, 'x', Some(CheckboxState::Done))]
    #[case(CheckboxMode::Multi, '/', Some(CheckboxState::Incomplete))]
    #[case(CheckboxMode::Multi, '*', Some(CheckboxState::Active))]
    #[case(CheckboxMode::Multi, '-', Some(CheckboxState::Na))]
    #[case(CheckboxMode::Simple, 'X', Some(CheckboxState::Done))]
    #[case(CheckboxMode::Simple, '/', None)]
    #[case(CheckboxMode::Explicit, ' ', Some(CheckboxState::Unfilled))]
    #[case(CheckboxMode::Explicit, 'y', Some(CheckboxState::Yes))]
    #[case(CheckboxMode::Explicit, 'x', None)]
    fn marks_depend_on_mode(
        #[case] mode: CheckboxMode,
        #[case] mark: char,
        #[case] expected: Option<CheckboxState>,
    ) {
        assert_eq!(CheckboxState::from_mark(mark, mode), expected);
    }

    #[test]
    fn mark_round_trips_for_every_allowed_state() {
        for mode in [
            CheckboxMode::Multi,
            CheckboxMode::Simple,
            CheckboxMode::Explicit,
        ] {
            for state in [
                CheckboxState::Todo,
                CheckboxState::Done,
                CheckboxState::Incomplete,
                CheckboxState::Active,
                CheckboxState::Na,
                CheckboxState::Unfilled,
                CheckboxState::Yes,
                CheckboxState::No,
            ] {
                if state.allowed_in(mode) {
                    assert_eq!(CheckboxState::from_mark(state.mark(), mode), Some(state));
                }
            }
        }
    }

    #[test]
    fn numbers_format_without_trailing_zero() {
        assert_eq!(format_number(36.0), "36");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-0.25), "-0.25");
    }

    #[test]
    fn scalar_text_for_dates_is_iso() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            FieldValue::Date(date).scalar_text().as_deref(),
            Some("2024-03-09")
        );
        assert_eq!(FieldValue::StringList(vec![]).scalar_text(), None);
    }
}
