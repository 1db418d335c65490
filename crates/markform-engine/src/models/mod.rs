pub mod field;
pub mod form;
pub mod note;
pub mod response;

pub use field::*;
pub use form::{DocBlock, DocKind, Dialect, FieldGroup, Form, FormProgress, Metadata};
pub use note::{Note, NoteState};
pub use response::{
    CheckboxState, FieldResponse, FieldValue, ResponseState, TableRow, format_number,
};
