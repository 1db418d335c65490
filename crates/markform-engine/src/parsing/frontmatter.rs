use serde_yaml::Value;

use crate::models::Metadata;

const DELIMITER: &str = "---";

/// A document split into its metadata and the remaining body.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontmatter<'a> {
    pub metadata: Metadata,
    pub body: &'a str,
    /// Number of lines consumed before `body` starts.
    pub offset_lines: usize,
}

/// Splits a leading `---` YAML block from `text`.
///
/// Anything that is not a mapping yields empty metadata; the block is still
/// removed from the body when both delimiters are present.
pub fn extract(text: &str) -> Frontmatter<'_> {
    let none = Frontmatter {
        metadata: Metadata::new(),
        body: text,
        offset_lines: 0,
    };

    let Some(first_end) = text.find('\n') else {
        return none;
    };
    if text[..first_end].trim_end_matches('\r') != DELIMITER {
        return none;
    }

    let mut pos = first_end + 1;
    let mut lines = 1;
    while pos <= text.len() {
        let end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
        lines += 1;
        if text[pos..end].trim_end_matches('\r') == DELIMITER {
            let yaml = &text[first_end + 1..pos];
            let body_start = (end + 1).min(text.len());
            return Frontmatter {
                metadata: parse_metadata(yaml),
                body: &text[body_start..],
                offset_lines: lines,
            };
        }
        if end == text.len() {
            break;
        }
        pos = end + 1;
    }

    none
}

fn parse_metadata(yaml: &str) -> Metadata {
    if yaml.trim().is_empty() {
        return Metadata::new();
    }
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(map)) => map
            .into_iter()
            .filter_map(|(key, value)| match key {
                Value::String(key) => Some((key, value)),
                other => {
                    log::debug!("ignoring non-string frontmatter key {other:?}");
                    None
                }
            })
            .collect(),
        Ok(_) => {
            log::debug!("frontmatter is not a mapping, ignoring it");
            Metadata::new()
        }
        Err(e) => {
            log::warn!("malformed frontmatter: {e}");
            Metadata::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_mapping() {
        let fm = extract("---\ntitle: Review\nyear: 2024\n---\nbody\n");
        assert_eq!(fm.metadata.len(), 2);
        assert_eq!(
            fm.metadata.get("title"),
            Some(&Value::String("Review".to_string()))
        );
        assert_eq!(fm.body, "body\n");
        assert_eq!(fm.offset_lines, 4);
    }

    #[test]
    fn handles_crlf_delimiters() {
        let fm = extract("---\r\na: 1\r\n---\r\nbody");
        assert_eq!(fm.metadata.len(), 1);
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn no_frontmatter_leaves_text_alone() {
        let text = "{% form id=\"f\" %}\n{% /form %}\n";
        let fm = extract(text);
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, text);
        assert_eq!(fm.offset_lines, 0);
    }

    #[test]
    fn unclosed_block_is_not_frontmatter() {
        let fm = extract("---\ntitle: x\nbody\n");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.offset_lines, 0);
    }

    #[test]
    fn malformed_yaml_is_empty_metadata() {
        let fm = extract("---\nkey: [unclosed\n---\nbody");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn non_mapping_yaml_is_empty_metadata() {
        let fm = extract("---\n- a\n- b\n---\n");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "");
    }

    #[test]
    fn empty_block() {
        let fm = extract("---\n---\nrest");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "rest");
        assert_eq!(fm.offset_lines, 2);
    }
}
