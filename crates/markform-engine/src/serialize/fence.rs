//! Value fences that survive whatever text they hold.

use crate::parsing::fence::{CodeFence, FenceKind, longest_leading_run};
use crate::parsing::{ABORT_SENTINEL, SKIP_SENTINEL};

const LITERAL_MARKERS: [&str; 4] = ["{%", "<!-- f:", "<!-- /f:", "<!-- #"];

/// Fence character and length for `value`.
///
/// The fence is one longer than the longest run of the same character that
/// could be read as a closing line. Backticks are preferred unless they would
/// be longer than tildes.
pub fn choose_fence(value: &str) -> (FenceKind, usize) {
    let backticks = (longest_leading_run(value, '`') + 1).max(CodeFence::MIN_LEN);
    let tildes = (longest_leading_run(value, '~') + 1).max(CodeFence::MIN_LEN);
    if backticks > tildes {
        (FenceKind::Tildes, tildes)
    } else {
        (FenceKind::Backticks, backticks)
    }
}

/// Whether sentinel processing must be switched off for `value`.
pub fn needs_literal(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed == SKIP_SENTINEL
        || trimmed == ABORT_SENTINEL
        || LITERAL_MARKERS.iter().any(|marker| value.contains(marker))
}

/// Lines of a value fence holding `value` verbatim.
pub fn value_fence(value: &str) -> Vec<String> {
    let (kind, len) = choose_fence(value);
    let fence = kind.char().to_string().repeat(len);
    let info = if needs_literal(value) {
        "value {% process=false %}"
    } else {
        "value"
    };

    let mut lines = vec![format!("{fence}{info}")];
    if !value.is_empty() {
        lines.push(value.to_string());
    }
    lines.push(fence);
    lines
}

/// Fence lines for a bare sentinel.
pub fn sentinel_fence(sentinel: &str) -> Vec<String> {
    vec![
        "```value".to_string(),
        sentinel.to_string(),
        "```".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("plain", FenceKind::Backticks, 3)]
    #[case("```\ncode\n```", FenceKind::Tildes, 3)]
    #[case("`````", FenceKind::Tildes, 3)]
    #[case("`````\n~~~~~~~", FenceKind::Backticks, 6)]
    #[case("~~~~\n``", FenceKind::Backticks, 3)]
    #[case("    ``````", FenceKind::Backticks, 3)]
    #[case("text with ``````` inside", FenceKind::Backticks, 3)]
    fn picks_a_fence_that_cannot_close_early(
        #[case] value: &str,
        #[case] kind: FenceKind,
        #[case] len: usize,
    ) {
        assert_eq!(choose_fence(value), (kind, len));
    }

    #[test]
    fn chosen_fence_never_collides_with_the_value() {
        for value in ["```", "~~~\n````", "  `````\n~~~~~~~~", "a\n   ~~~~"] {
            let (kind, len) = choose_fence(value);
            let fence = kind.char().to_string().repeat(len);
            let opener = CodeFence::open(&fence).unwrap();
            assert!(value.lines().all(|line| !opener.closes(line)), "{value:?}");
        }
    }

    #[rstest]
    #[case("|SKIP|", true)]
    #[case("  |ABORT|\n", true)]
    #[case("{% note %}", true)]
    #[case("<!-- f:field -->", true)]
    #[case("<!-- #id -->", true)]
    #[case("<!-- ordinary comment -->", false)]
    #[case("|SKIP| later", false)]
    fn literal_when_markup_or_sentinel(#[case] value: &str, #[case] literal: bool) {
        assert_eq!(needs_literal(value), literal);
    }

    #[test]
    fn empty_value_has_no_content_line() {
        assert_eq!(value_fence(""), vec!["```value", "```"]);
        assert_eq!(
            value_fence("|SKIP|"),
            vec!["```value {% process=false %}", "|SKIP|", "```"]
        );
    }
}
