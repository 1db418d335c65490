pub mod attrs;
mod builder;
pub mod dialect;
mod error;
pub mod fence;
mod fields;
pub mod frontmatter;

use std::borrow::Cow;

pub use error::{ParseError, ParseErrorKind};
pub use fields::{ABORT_SENTINEL, SKIP_SENTINEL};

use builder::FormBuilder;

/// Parses a form document.
///
/// CRLF line endings are accepted. Frontmatter becomes [`Form::metadata`],
/// the directive dialect is detected and recorded on the form, and every
/// structural problem is reported with the 1-based line it was found on.
///
/// [`Form::metadata`]: crate::models::Form::metadata
pub fn parse(text: &str) -> Result<crate::models::Form, ParseError> {
    let text = if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    };

    let frontmatter = frontmatter::extract(&text);
    let (body, dialect) = dialect::normalize(frontmatter.body);

    let mut builder = FormBuilder::new();
    let mut last_line = frontmatter.offset_lines;
    for (i, line) in body.lines().enumerate() {
        last_line = frontmatter.offset_lines + i + 1;
        builder.push(last_line, line)?;
    }

    let mut form = builder.finish(last_line)?;
    form.metadata = frontmatter.metadata;
    form.dialect = dialect;
    log::debug!(
        "parsed form `{}`: {} groups, {} notes, {} dialect",
        form.id,
        form.groups.len(),
        form.notes.len(),
        form.dialect
    );
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dialect, FieldValue, ResponseState};
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"---
title: Review
---

{% form id="review" title="Quarterly review" %}

{% group id="basics" title="Basics" %}

{% field kind="string" id="name" label="Name" role="user" required=true %}
```value
Ada
```
{% /field %}

{% field kind="single_select" id="outlook" label="Outlook" %}
- [x] Bullish {% #bullish %}
- [ ] Bearish {% #bearish %}
{% /field %}

{% /group %}

{% /form %}
"#;

    #[test]
    fn parses_a_document() {
        let form = parse(DOC).unwrap();
        assert_eq!(form.id, "review");
        assert_eq!(form.title.as_deref(), Some("Quarterly review"));
        assert_eq!(form.metadata.len(), 1);
        assert_eq!(form.dialect, Dialect::Tags);
        assert_eq!(
            form.field("name").unwrap().response.value,
            Some(FieldValue::String("Ada".to_string()))
        );
        assert_eq!(
            form.field("outlook").unwrap().response.value,
            Some(FieldValue::SingleSelect("bullish".to_string()))
        );
    }

    #[test]
    fn crlf_parses_like_lf() {
        let crlf = DOC.replace('\n', "\r\n");
        assert_eq!(parse(&crlf).unwrap(), parse(DOC).unwrap());
    }

    #[test]
    fn comment_dialect_parses_like_tags() {
        let comments = DOC
            .replace("{% /field %}", "<!-- /f:field -->")
            .replace("{% /group %}", "<!-- /f:group -->")
            .replace("{% /form %}", "<!-- /f:form -->")
            .replace("{% #bullish %}", "<!-- #bullish -->")
            .replace("{% #bearish %}", "<!-- #bearish -->")
            .replace("{% form ", "<!-- f:form ")
            .replace("{% group ", "<!-- f:group ")
            .replace("{% field ", "<!-- f:field ")
            .replace(" %}", " -->");
        let mut form = parse(&comments).unwrap();
        assert_eq!(form.dialect, Dialect::Comments);
        form.dialect = Dialect::Tags;
        assert_eq!(form, parse(DOC).unwrap());
    }

    #[test]
    fn line_numbers_count_frontmatter() {
        let text = "---\na: 1\n---\n{% form id=\"f\" %}\n{% bogus %}\n";
        let err = parse(text).unwrap_err();
        assert_eq!(err.line, 5);
        assert_eq!(err.to_string(), "line 5: unknown directive `bogus`");
    }

    #[test]
    fn skip_sentinel_in_value_fence() {
        let text = "{% form id=\"f\" %}\n{% field kind=\"year\" id=\"y\" label=\"Y\" %}\n```value\n|SKIP|\n```\n{% /field %}\n{% /form %}\n";
        let form = parse(text).unwrap();
        assert_eq!(
            form.field("y").unwrap().response.state,
            ResponseState::Skipped
        );
    }
}
