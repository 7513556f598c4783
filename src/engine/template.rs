//! Replacement templates: turning a [`Template`] plus match bindings into
//! the node list that takes the matched node's place.
//!
//! Synthesized nodes take the span of the matched node, so change records and
//! downstream printers can still locate them. A captured node is reused as is
//! (same `NodeId`, shared subtree) the first time the template places it;
//! further placements get a fresh copy so ids stay unique within a revision.

use std::collections::HashSet;
use std::sync::Arc;

use super::matcher::{Bindings, Tags};
use crate::Template;
use crate::tree::{Kind, Node, NodeId};

/// `@name` placeholders in a leaf template text.
pub(crate) fn placeholders(text: &str) -> impl Iterator<Item = &str> + '_ {
    regex!(r"@([A-Za-z_][A-Za-z0-9_]*)").captures_iter(text).filter_map(|c| c.get(1)).map(|m| m.as_str())
}

/// Expand a leaf text, substituting captures (rendered) and carried values.
pub(crate) fn expand(text: &str, bindings: &Bindings, tags: &Tags) -> String {
    regex!(r"@([A-Za-z_][A-Za-z0-9_]*)")
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            match bindings.get(name) {
                Some(node) => node.render(),
                None => tags.get(name).cloned().unwrap_or_default(),
            }
        })
        .into_owned()
}

pub(crate) fn instantiate(template: &Template, bindings: &Bindings, tags: &Tags, matched: &Node) -> Vec<Arc<Node>> {
    let mut builder = Builder { bindings, tags, matched, placed: HashSet::new() };
    builder.build(template, None)
}

struct Builder<'a, 't> {
    bindings: &'a Bindings<'t>,
    tags: &'a Tags,
    matched: &'a Node,
    placed: HashSet<NodeId>,
}

impl Builder<'_, '_> {
    /// Build `template`, labelling each produced node with `field` (captures
    /// lose whatever role they had at their old position).
    fn build(&mut self, template: &Template, field: Option<&Kind>) -> Vec<Arc<Node>> {
        let span = self.matched.span();
        match template {
            Template::Delete => Vec::new(),
            Template::Capture(name) => match self.bindings.get(name) {
                Some(node) => vec![self.place(node, field)],
                None => Vec::new(),
            },
            Template::Splice(name) => match self.bindings.get(name) {
                Some(node) => node.named_children().map(|c| self.place(c, field)).collect(),
                None => Vec::new(),
            },
            Template::Leaf { kind, text } => {
                let value = text.as_deref().map(|t| expand(t, self.bindings, self.tags));
                vec![Arc::new(Node::leaf(kind, value.as_deref(), span).relabeled(field))]
            }
            Template::Token(text) => vec![Arc::new(Node::token(text, span).relabeled(field))],
            Template::Node { kind, children } => {
                let children = children.iter().flat_map(|c| self.build(c, None)).collect();
                vec![Arc::new(Node::branch(kind, children, span).relabeled(field))]
            }
            Template::Field(name, inner) => {
                let label = Kind::from(name.as_str());
                self.build(inner, Some(&label))
            }
            Template::Seq(items) => items.iter().flat_map(|t| self.build(t, field)).collect(),
        }
    }

    fn place(&mut self, node: &Arc<Node>, field: Option<&Kind>) -> Arc<Node> {
        let fresh = !self.placed.insert(node.id());
        let node = if fresh { Arc::new(node.reidentified()) } else { Arc::clone(node) };
        if node.field() == field.map(|f| &**f) { node } else { Arc::new(node.relabeled(field)) }
    }
}
