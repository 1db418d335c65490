use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{ResponseState, Role};

/// State a note records about its target: why it was skipped or aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteState {
    Skipped,
    Aborted,
}

impl NoteState {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteState::Skipped => "skipped",
            NoteState::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "skipped" => Some(NoteState::Skipped),
            "aborted" => Some(NoteState::Aborted),
            _ => None,
        }
    }

    /// The note state mirroring a response state, if there is one.
    pub fn mirroring(state: ResponseState) -> Option<Self> {
        match state {
            ResponseState::Skipped => Some(NoteState::Skipped),
            ResponseState::Aborted => Some(NoteState::Aborted),
            ResponseState::Empty | ResponseState::Answered => None,
        }
    }
}

impl fmt::Display for NoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A free-text note attached to a scope reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    /// Scope reference string (`field`, `field.option`, `table.column[2]`).
    #[serde(rename = "ref")]
    pub target: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NoteState>,
    #[serde(default)]
    pub text: String,
}
