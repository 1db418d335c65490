#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceKind {
    Backticks,
    Tildes,
}

impl FenceKind {
    pub fn char(self) -> char {
        match self {
            FenceKind::Backticks => '`',
            FenceKind::Tildes => '~',
        }
    }
}

/// An opening code fence line: up to three spaces, a run of at least three
/// backticks or tildes, then an info string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFence<'a> {
    pub kind: FenceKind,
    pub len: usize,
    pub info: &'a str,
}

impl<'a> CodeFence<'a> {
    pub const MIN_LEN: usize = 3;

    pub fn open(line: &'a str) -> Option<Self> {
        let rest = strip_indent(line)?;
        let kind = match rest.chars().next()? {
            '`' => FenceKind::Backticks,
            '~' => FenceKind::Tildes,
            _ => return None,
        };
        let len = run_length(rest, kind.char());
        if len < Self::MIN_LEN {
            return None;
        }
        let info = rest[len..].trim();
        if kind == FenceKind::Backticks && info.contains('`') {
            return None;
        }
        Some(Self { kind, len, info })
    }

    /// A closing line uses the same character, is at least as long as the
    /// opener and carries nothing but whitespace after the run.
    pub fn closes(&self, line: &str) -> bool {
        let Some(rest) = strip_indent(line) else {
            return false;
        };
        let len = run_length(rest, self.kind.char());
        len >= self.len && rest[len..].trim().is_empty()
    }

    /// True when the info string marks a value fence.
    pub fn is_value(&self) -> bool {
        self.info == "value" || self.info.starts_with("value ")
    }
}

/// Strips at most three leading spaces; `None` when the line is indented
/// further (indented code).
fn strip_indent(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    (indent <= 3).then(|| &line[indent..])
}

fn run_length(s: &str, c: char) -> usize {
    s.chars().take_while(|&ch| ch == c).count()
}

/// Longest run of `c` that starts a line after at most three spaces.
pub fn longest_leading_run(text: &str, c: char) -> usize {
    text.lines()
        .filter_map(strip_indent)
        .map(|rest| run_length(rest, c))
        .max()
        .unwrap_or(0)
}
