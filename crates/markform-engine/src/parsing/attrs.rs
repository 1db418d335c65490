//! # Directive Attributes
//!
//! Lexes the inside of a `{% ... %}` directive with [Logos] and turns it into
//! a [`Tag`]: a name, open/close/self-closing flags and an [`Attrs`] bag.
//!
//! [Logos]: https://docs.rs/logos
//!
//! ```text
//! field kind="table" #team .wide columnIds=["name", "age"] minRows=1
//! ```
//!
//! Values are JSON-style: double-quoted strings with backslash escapes,
//! numbers, `true`, `false`, `null` and `[...]` arrays. `#id` and `.class`
//! shorthands may appear anywhere among the attributes.

use std::collections::BTreeMap;

use logos::Logos;

use super::error::ParseErrorKind;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token<'s> {
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice())]
    Str(&'s str),

    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice())]
    Number(&'s str),

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("null")]
    Null,

    #[regex(r"#[A-Za-z0-9_-]+", |lex| &lex.slice()[1..])]
    IdShorthand(&'s str),

    #[regex(r"\.[A-Za-z_][A-Za-z0-9_-]*", |lex| &lex.slice()[1..])]
    ClassShorthand(&'s str),

    #[regex(r"[A-Za-z_][A-Za-z0-9_-]*", |lex| lex.slice())]
    Ident(&'s str),

    #[token("=")]
    Eq,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,
}

/// A parsed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    List(Vec<AttrValue>),
}

/// A parsed directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Directive name; empty for annotation-only tags such as `{% #id %}`.
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
    pub attrs: Attrs,
}

/// Attribute bag of a directive. Typed accessors remove what they read so
/// that leftovers can be reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs {
    pub id: Option<String>,
    pub classes: Vec<String>,
    values: BTreeMap<String, AttrValue>,
}

/// Parses the text between `{%` and `%}`.
pub fn parse_tag(inner: &str) -> Result<Tag, ParseErrorKind> {
    let inner = inner.trim();

    if let Some(rest) = inner.strip_prefix('/') {
        let name = rest.trim();
        if name.is_empty() || !name.chars().all(is_ident_char) {
            return Err(ParseErrorKind::MalformedTag(inner.to_string()));
        }
        return Ok(Tag {
            name: name.to_string(),
            closing: true,
            self_closing: false,
            attrs: Attrs::default(),
        });
    }

    let (body, self_closing) = match inner.strip_suffix('/') {
        Some(body) => (body, true),
        None => (inner, false),
    };

    let tokens = Token::lexer(body)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ParseErrorKind::MalformedTag(inner.to_string()))?;

    let mut pos = 0;
    let mut name = String::new();
    if let [Token::Ident(first), rest @ ..] = tokens.as_slice()
        && rest.first() != Some(&Token::Eq)
    {
        name = (*first).to_string();
        pos = 1;
    }

    let mut attrs = Attrs::default();
    while pos < tokens.len() {
        match tokens[pos] {
            Token::IdShorthand(id) => {
                if attrs.id.replace(id.to_string()).is_some() {
                    return Err(ParseErrorKind::DuplicateAttribute("id".to_string()));
                }
                pos += 1;
            }
            Token::ClassShorthand(class) => {
                attrs.classes.push(class.to_string());
                pos += 1;
            }
            Token::Ident(key) => {
                if tokens.get(pos + 1) != Some(&Token::Eq) {
                    return Err(ParseErrorKind::MalformedTag(inner.to_string()));
                }
                let (value, next) = parse_value(&tokens, pos + 2, inner)?;
                attrs.insert(key, value)?;
                pos = next;
            }
            _ => return Err(ParseErrorKind::MalformedTag(inner.to_string())),
        }
    }

    Ok(Tag {
        name,
        closing: false,
        self_closing,
        attrs,
    })
}

fn parse_value(
    tokens: &[Token<'_>],
    pos: usize,
    inner: &str,
) -> Result<(AttrValue, usize), ParseErrorKind> {
    let malformed = || ParseErrorKind::MalformedTag(inner.to_string());
    let token = tokens.get(pos).ok_or_else(malformed)?;
    let value = match *token {
        Token::Str(raw) => AttrValue::Str(decode_string(raw).ok_or_else(malformed)?),
        Token::Number(raw) => AttrValue::Num(raw.parse().map_err(|_| malformed())?),
        Token::True => AttrValue::Bool(true),
        Token::False => AttrValue::Bool(false),
        Token::Null => AttrValue::Null,
        Token::LBracket => {
            let mut items = Vec::new();
            let mut at = pos + 1;
            loop {
                match tokens.get(at) {
                    Some(Token::RBracket) => return Ok((AttrValue::List(items), at + 1)),
                    Some(Token::Comma) if !items.is_empty() => at += 1,
                    Some(_) => {
                        let (item, next) = parse_value(tokens, at, inner)?;
                        items.push(item);
                        at = next;
                        if !matches!(tokens.get(at), Some(Token::Comma | Token::RBracket)) {
                            return Err(malformed());
                        }
                    }
                    None => return Err(malformed()),
                }
            }
        }
        _ => return Err(malformed()),
    };
    Ok((value, pos + 1))
}

fn decode_string(raw: &str) -> Option<String> {
    serde_json::from_str(raw).ok()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn describe(expected: &str, attr: &str) -> ParseErrorKind {
    ParseErrorKind::InvalidAttribute {
        attr: attr.to_string(),
        expected: expected.to_string(),
    }
}

impl Attrs {
    fn insert(&mut self, key: &str, value: AttrValue) -> Result<(), ParseErrorKind> {
        if key == "id" {
            let AttrValue::Str(id) = value else {
                return Err(describe("a string", key));
            };
            if self.id.replace(id).is_some() {
                return Err(ParseErrorKind::DuplicateAttribute(key.to_string()));
            }
            return Ok(());
        }
        if self.values.insert(key.to_string(), value).is_some() {
            return Err(ParseErrorKind::DuplicateAttribute(key.to_string()));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.classes.is_empty() && self.values.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Removes and returns the raw value for `key`. `null` counts as absent.
    pub fn take(&mut self, key: &str) -> Option<AttrValue> {
        match self.values.remove(key) {
            Some(AttrValue::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    pub fn take_str(&mut self, key: &str) -> Result<Option<String>, ParseErrorKind> {
        match self.take(key) {
            None => Ok(None),
            Some(AttrValue::Str(s)) => Ok(Some(s)),
            Some(_) => Err(describe("a string", key)),
        }
    }

    pub fn take_bool(&mut self, key: &str) -> Result<bool, ParseErrorKind> {
        match self.take(key) {
            None => Ok(false),
            Some(AttrValue::Bool(b)) => Ok(b),
            Some(_) => Err(describe("true or false", key)),
        }
    }

    pub fn take_f64(&mut self, key: &str) -> Result<Option<f64>, ParseErrorKind> {
        match self.take(key) {
            None => Ok(None),
            Some(AttrValue::Num(n)) if n.is_finite() => Ok(Some(n)),
            Some(_) => Err(describe("a number", key)),
        }
    }

    pub fn take_usize(&mut self, key: &str) -> Result<Option<usize>, ParseErrorKind> {
        match self.take(key) {
            None => Ok(None),
            Some(AttrValue::Num(n)) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => {
                Ok(Some(n as usize))
            }
            Some(_) => Err(describe("a non-negative integer", key)),
        }
    }

    pub fn take_i32(&mut self, key: &str) -> Result<Option<i32>, ParseErrorKind> {
        match self.take(key) {
            None => Ok(None),
            Some(AttrValue::Num(n))
                if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 =>
            {
                Ok(Some(n as i32))
            }
            Some(_) => Err(describe("an integer", key)),
        }
    }

    pub fn take_str_list(&mut self, key: &str) -> Result<Option<Vec<String>>, ParseErrorKind> {
        match self.take(key) {
            None => Ok(None),
            Some(AttrValue::List(items)) => items
                .into_iter()
                .map(|item| match item {
                    AttrValue::Str(s) => Ok(s),
                    _ => Err(describe("an array of strings", key)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(describe("an array of strings", key)),
        }
    }

    /// Names of attributes nobody asked for.
    pub fn leftover_keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
