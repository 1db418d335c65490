//! Comment-dialect normalization.
//!
//! Documents may spell directives as HTML comments so that they stay
//! invisible in ordinary Markdown renderers:
//!
//! ```text
//! <!-- f:field kind="string" id="name" -->     {% field kind="string" id="name" %}
//! <!-- /f:field -->                            {% /field %}
//! <!-- f:note id="n1" ref="x" /-->             {% note id="n1" ref="x" /%}
//! - [ ] Yes <!-- #yes -->                      - [ ] Yes {% #yes %}
//! ```
//!
//! [`normalize`] rewrites the left column into the right one. Code blocks
//! and inline code spans are located with pulldown-cmark and copied through
//! untouched. Rewrites never add or remove lines, so line numbers reported
//! by the parser still point into the original text.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use pulldown_cmark::{Event, Parser, Tag};
use regex::{Captures, Regex};

use crate::models::Dialect;

static COMMENT_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*(/)?f:([A-Za-z][A-Za-z0-9_-]*)(.*?)\s*(/)?-->").unwrap()
});

static COMMENT_ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*([#.][A-Za-z0-9_-].*?)\s*-->").unwrap());

/// Byte ranges of fenced code, indented code and inline code spans.
pub fn code_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for (event, range) in Parser::new(text).into_offset_iter() {
        let protected = matches!(event, Event::Start(Tag::CodeBlock(_)) | Event::Code(_));
        if !protected {
            continue;
        }
        match ranges.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => ranges.push(range),
        }
    }
    ranges
}

/// Splits `text` into alternating `(segment, is_code)` pieces.
fn segments<'a>(text: &'a str, code: &[Range<usize>]) -> Vec<(&'a str, bool)> {
    let mut out = Vec::new();
    let mut pos = 0;
    for range in code {
        if range.start > pos {
            out.push((&text[pos..range.start], false));
        }
        out.push((&text[range.start..range.end], true));
        pos = range.end;
    }
    if pos < text.len() {
        out.push((&text[pos..], false));
    }
    out
}

/// Dialect of a document: comment directives outside code select
/// [`Dialect::Comments`].
pub fn detect(text: &str) -> Dialect {
    detect_in(text, &code_ranges(text))
}

fn detect_in(text: &str, code: &[Range<usize>]) -> Dialect {
    let has_comment_directive = segments(text, code)
        .into_iter()
        .any(|(segment, is_code)| !is_code && COMMENT_DIRECTIVE.is_match(segment));
    if has_comment_directive {
        Dialect::Comments
    } else {
        Dialect::Tags
    }
}

/// Rewrites comment directives into tag directives and reports the detected
/// dialect. Tag-dialect input is returned as is.
pub fn normalize(text: &str) -> (Cow<'_, str>, Dialect) {
    let code = code_ranges(text);
    let dialect = detect_in(text, &code);
    if dialect == Dialect::Tags {
        return (Cow::Borrowed(text), dialect);
    }

    let mut out = String::with_capacity(text.len());
    for (segment, is_code) in segments(text, &code) {
        if is_code {
            out.push_str(segment);
        } else {
            out.push_str(&rewrite(segment));
        }
    }
    (Cow::Owned(out), dialect)
}

fn rewrite(segment: &str) -> String {
    let directives = COMMENT_DIRECTIVE.replace_all(segment, |caps: &Captures<'_>| {
        let close = caps.get(1).map_or("", |m| m.as_str());
        let name = &caps[2];
        let attrs = caps[3].trim();
        let self_close = if caps.get(4).is_some() { " /" } else { "" };
        if attrs.is_empty() {
            format!("{{% {close}{name}{self_close} %}}")
        } else {
            format!("{{% {close}{name} {attrs}{self_close} %}}")
        }
    });
    COMMENT_ANNOTATION
        .replace_all(&directives, |caps: &Captures<'_>| format!("{{% {} %}}", &caps[1]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tag_dialect_is_borrowed() {
        let text = "{% form id=\"f\" %}\n{% /form %}\n";
        let (out, dialect) = normalize(text);
        assert_eq!(dialect, Dialect::Tags);
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn rewrites_comment_directives() {
        let text = concat!(
            "<!-- f:form id=\"f\" -->\n",
            "<!-- f:field kind=\"single_select\" id=\"s\" label=\"S\" -->\n",
            "- [ ] Yes <!-- #yes -->\n",
            "<!-- /f:field -->\n",
            "<!-- f:note id=\"n1\" ref=\"s\" /-->\n",
            "<!-- /f:form -->\n",
        );
        let (out, dialect) = normalize(text);
        assert_eq!(dialect, Dialect::Comments);
        assert_eq!(
            out,
            concat!(
                "{% form id=\"f\" %}\n",
                "{% field kind=\"single_select\" id=\"s\" label=\"S\" %}\n",
                "- [ ] Yes {% #yes %}\n",
                "{% /field %}\n",
                "{% note id=\"n1\" ref=\"s\" / %}\n",
                "{% /form %}\n",
            )
        );
    }

    #[test]
    fn leaves_code_untouched() {
        let text = concat!(
            "<!-- f:form id=\"f\" -->\n",
            "\n",
            "```value\n",
            "<!-- f:field id=\"x\" -->\n",
            "```\n",
            "\n",
            "Inline `<!-- #keep -->` code.\n",
            "\n",
            "<!-- /f:form -->\n",
        );
        let (out, _) = normalize(text);
        assert!(out.contains("```value\n<!-- f:field id=\"x\" -->\n```"));
        assert!(out.contains("`<!-- #keep -->`"));
        assert!(out.starts_with("{% form id=\"f\" %}"));
        assert!(out.ends_with("{% /form %}\n"));
    }

    #[test]
    fn directives_only_inside_code_keep_tag_dialect() {
        let text = "```\n<!-- f:form -->\n```\n";
        assert_eq!(detect(text), Dialect::Tags);
    }

    #[test]
    fn plain_html_comments_are_not_directives() {
        assert_eq!(detect("<!-- just a comment -->\n"), Dialect::Tags);
    }
}
