/// A structural parse failure with the 1-based line it was detected on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("no form directive found")]
    MissingForm,
    #[error("only one form directive is allowed per document")]
    MultipleForms,
    #[error("unknown directive `{0}`")]
    UnknownTag(String),
    #[error("malformed directive: {0}")]
    MalformedTag(String),
    #[error("`{tag}` is missing required attribute `{attr}`")]
    MissingAttribute { tag: String, attr: String },
    #[error("attribute `{attr}` must be {expected}")]
    InvalidAttribute { attr: String, expected: String },
    #[error("attribute `{0}` is given more than once")]
    DuplicateAttribute(String),
    #[error("unknown field kind `{0}`")]
    UnknownKind(String),
    #[error("`{tag}` must be placed inside `{parent}`")]
    Misplaced { tag: String, parent: String },
    #[error("unexpected closing directive `{0}`")]
    UnexpectedClose(String),
    #[error("`{0}` is never closed")]
    Unclosed(String),
    #[error("duplicate id `{0}`")]
    DuplicateId(String),
    #[error("attribute arrays have mismatched lengths: {0}")]
    LengthMismatch(String),
    #[error("value fence is never closed")]
    UnclosedFence,
    #[error("field `{0}` has more than one value fence")]
    DuplicateValue(String),
    #[error("invalid {kind} value `{text}`")]
    InvalidValue { kind: String, text: String },
    #[error("field `{0}` declares no options")]
    NoOptions(String),
    #[error("option line has no `#id` annotation: `{0}`")]
    MissingOptionId(String),
    #[error("mark `[{mark}]` is not valid for option `{option}`")]
    InvalidMark { mark: char, option: String },
    #[error("single-select field `{0}` has more than one selected option")]
    MultipleSelected(String),
    #[error("table header has {found} cells but {expected} columns are declared")]
    HeaderMismatch { found: usize, expected: usize },
    #[error("table row has {found} cells but {expected} columns are declared")]
    RowWidth { found: usize, expected: usize },
    #[error("table is missing its separator row")]
    MissingSeparator,
    #[error("`{0}` does not name the form, a group or a field")]
    UnresolvedDocRef(String),
}
