//! Markdown form documents: parse them into a typed model, validate and
//! patch that model, list outstanding work, and write it back canonically.
//!
//! ```
//! use markform_engine::{Patch, RoleFilter, SerializeOptions, apply_patches, is_complete, parse, serialize};
//!
//! let text = "{% form id=\"f\" %}\n\n{% field kind=\"string\" id=\"name\" label=\"Name\" required=true %}\n{% /field %}\n\n{% /form %}\n";
//! let form = parse(text).unwrap();
//! assert!(!is_complete(&form, &RoleFilter::All));
//!
//! let patch = Patch::SetString { field_id: "name".into(), value: "Ada".into() };
//! let result = apply_patches(&form, &[patch]);
//! assert!(is_complete(&result.form, &RoleFilter::All));
//! assert!(serialize(&result.form, SerializeOptions::default()).contains("Ada"));
//! ```

pub mod editing;
pub mod export;
pub mod io;
pub mod issues;
pub mod models;
pub mod parsing;
pub mod scope;
pub mod serialize;
pub mod table;
pub mod validate;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use editing::{ApplyResult, CellInput, Patch, PatchOutcome, PatchRejection, apply_patches};
pub use export::{ExportedField, export_values};
pub use io::*;
pub use issues::{Issue, IssueReason, RoleFilter, Severity, is_complete, list_issues};
pub use models::*;
pub use parsing::{ParseError, ParseErrorKind, parse};
pub use scope::{Bounds, RefError, ScopeRef, resolve_ref};
pub use serialize::{SerializeOptions, serialize};
pub use validate::{ErrorCode, ValidationIssue, validate};
