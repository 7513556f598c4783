//! S-expression form of a tree.
//!
//! This is the interchange format between the engine and external parsers or
//! printers that do not link against the crate (and the format used in
//! tests). It follows the shape of tree-sitter's `to_sexp` output, extended
//! with anonymous tokens and leaf values:
//!
//! ```text
//! node   := [field ':'] ( '(' kind ['=' string] node* ')' | string )
//! string := '"' ( '\"' | '\\' | any )* '"'
//! ```
//!
//! - `(identifier = "enabled")` is a named leaf with a literal value.
//! - `"else"` is an anonymous token.
//! - `condition: (true)` labels the node with the `condition` field.
//!
//! Spans are not part of the format; they are laid out as if the leaves were
//! printed in order separated by single spaces, which matches
//! [`Node::render`](crate::tree::Node::render).

use std::sync::Arc;

use crate::error::TreeError;
use crate::tree::{Node, Span};

/// Parse a single tree.
pub fn parse(src: &str) -> Result<Arc<Node>, TreeError> {
    let mut reader = Reader { src, pos: 0, offset: 0 };
    reader.skip_ws();
    let node = reader.node()?;
    reader.skip_ws();
    if reader.pos != src.len() {
        return Err(reader.error("trailing input after the root node"));
    }
    Ok(node)
}

/// Print a tree; `parse(&print(t))` yields the same shape.
pub fn print(node: &Node) -> String {
    let mut out = String::new();
    print_into(node, &mut out);
    out
}

fn print_into(node: &Node, out: &mut String) {
    if let Some(field) = node.field() {
        out.push_str(field);
        out.push_str(": ");
    }
    if !node.is_named() {
        push_quoted(node.kind(), out);
        return;
    }
    out.push('(');
    out.push_str(node.kind());
    if let Some(value) = node.value() {
        out.push_str(" = ");
        push_quoted(value, out);
    }
    for child in node.children() {
        out.push(' ');
        print_into(child, out);
    }
    out.push(')');
}

fn push_quoted(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    /// Running offset of the laid-out source text.
    offset: usize,
}

impl Reader<'_> {
    fn error(&self, message: &str) -> TreeError {
        TreeError { offset: self.pos, message: message.to_string() }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn word(&mut self) -> &str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    fn string(&mut self) -> Result<String, TreeError> {
        // Opening quote already peeked.
        self.pos += 1;
        let mut text = String::new();
        let mut escaped = false;
        while let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            if escaped {
                text.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                return Ok(text);
            } else {
                text.push(c);
            }
        }
        Err(self.error("unterminated string"))
    }

    /// Lay out a leaf of `len` bytes and return its span.
    fn place(&mut self, len: usize) -> Span {
        let span = Span::new(self.offset, self.offset + len);
        self.offset += len + 1;
        span
    }

    fn node(&mut self) -> Result<Arc<Node>, TreeError> {
        let mut field = None;
        if !matches!(self.peek(), Some('(') | Some('"')) {
            let word = self.word().to_string();
            match word.strip_suffix(':') {
                Some(name) if !name.is_empty() => field = Some(name.to_string()),
                _ => return Err(self.error(&format!("expected '(', '\"' or a field label, found '{word}'"))),
            }
            self.skip_ws();
        }

        let node = match self.peek() {
            Some('"') => {
                let text = self.string()?;
                let span = self.place(text.len());
                Node::token(&text, span)
            }
            Some('(') => self.named()?,
            _ => return Err(self.error("expected a node")),
        };
        Ok(Arc::new(match field {
            Some(field) => node.with_field(&field),
            None => node,
        }))
    }

    fn named(&mut self) -> Result<Node, TreeError> {
        self.pos += 1;
        self.skip_ws();
        let kind = self.word().to_string();
        if kind.is_empty() {
            return Err(self.error("missing node kind"));
        }
        self.skip_ws();

        let mut value = None;
        if self.peek() == Some('=') {
            self.pos += 1;
            self.skip_ws();
            if self.peek() != Some('"') {
                return Err(self.error("expected a quoted leaf value after '='"));
            }
            value = Some(self.string()?);
            self.skip_ws();
        }

        let start = self.offset;
        let mut children = Vec::new();
        loop {
            match self.peek() {
                Some(')') => {
                    self.pos += 1;
                    break;
                }
                None => return Err(self.error("unbalanced parentheses")),
                Some(_) => {
                    children.push(self.node()?);
                    self.skip_ws();
                }
            }
        }

        if children.is_empty() {
            let text_len = value.as_deref().unwrap_or(&kind).len();
            let span = self.place(text_len);
            return Ok(Node::leaf(&kind, value.as_deref(), span));
        }
        if value.is_some() {
            return Err(self.error("only leaves may carry a value"));
        }
        let end = children.last().map_or(start, |c| c.span().end);
        Ok(Node::branch(&kind, children, Span::new(start, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_round_trips_fields_values_and_tokens() {
        let src = r#"(if_statement "if" condition: (identifier = "enabled") consequence: (block "{" "}"))"#;
        let tree = parse(src).unwrap();
        assert_eq!(print(&tree), src);
    }

    #[test]
    fn spans_follow_rendered_layout() {
        let tree = parse(r#"(call (identifier = "foo") "(" ")")"#).unwrap();
        assert_eq!(tree.render(), "foo ( )");
        assert_eq!(tree.span(), Span::new(0, 7));
        assert_eq!(tree.children()[1].span(), Span::new(4, 5));
    }

    #[test]
    fn escaped_quotes_survive() {
        let tree = parse(r#"(string = "\"flag\"")"#).unwrap();
        assert_eq!(tree.value(), Some("\"flag\""));
        assert_eq!(print(&tree), r#"(string = "\"flag\"")"#);
    }

    #[test]
    fn reports_unbalanced_input() {
        let err = parse("(block (a)").unwrap_err();
        assert_eq!(err.message, "unbalanced parentheses");
        assert!(parse("(a) (b)").is_err());
        assert!(parse("(a = \"x\" (b))").is_err());
    }
}
