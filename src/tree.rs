//! Language-agnostic program tree.
//!
//! A [`Node`] is an immutable element of a parsed program: a kind tag, an
//! ordered list of children, an optional literal value (for leaves), a source
//! [`Span`], an optional field label naming its role inside the parent (for
//! example `condition`), and a `named` flag separating syntactic nodes from
//! anonymous punctuation/keyword tokens.
//!
//! Children are held behind `Arc`, so a rewrite only path-copies the ancestors
//! of the edited node and shares every untouched subtree with the previous
//! [`Revision`]:
//!
//! ```text
//! rev 0:      A            rev 1:      A'          (A' keeps A's NodeId)
//!           /   \                    /    \
//!          B     C                  B      C'      (B shared, C replaced)
//! ```
//!
//! ## Invariants
//!
//! - A `NodeId` is stable across revisions for nodes that were shared or
//!   path-copied; replacement nodes get fresh ids.
//! - For parsed trees, children cover the parent's span in order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind tag of a node (`"if_statement"`, `"identifier"`, `","`...).
pub type Kind = Arc<str>;

/// Stable identity of a node across revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Byte range in the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start byte index (inclusive).
    pub start: usize,
    /// End byte index (exclusive).
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// From the start of the first node to the end of the last.
    pub fn covering(nodes: &[Arc<Node>]) -> Option<Span> {
        Some(Span::new(nodes.first()?.span.start, nodes.last()?.span.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    kind: Kind,
    field: Option<Kind>,
    named: bool,
    value: Option<String>,
    span: Span,
    children: Vec<Arc<Node>>,
}

impl Node {
    /// A named leaf carrying a literal value (identifiers, literals).
    pub fn leaf(kind: &str, value: Option<&str>, span: Span) -> Self {
        Node {
            id: NodeId::fresh(),
            kind: Kind::from(kind),
            field: None,
            named: true,
            value: value.map(str::to_string),
            span,
            children: Vec::new(),
        }
    }

    /// An anonymous token (punctuation or keyword); its text is its kind.
    pub fn token(text: &str, span: Span) -> Self {
        Node {
            id: NodeId::fresh(),
            kind: Kind::from(text),
            field: None,
            named: false,
            value: None,
            span,
            children: Vec::new(),
        }
    }

    /// A named interior node.
    pub fn branch(kind: &str, children: Vec<Arc<Node>>, span: Span) -> Self {
        Node { id: NodeId::fresh(), kind: Kind::from(kind), field: None, named: true, value: None, span, children }
    }

    /// Builder-style field label.
    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(Kind::from(field));
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn is_named(&self) -> bool {
        self.named
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn children(&self) -> &[Arc<Node>] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Text of a leaf: its literal value, or the kind for keyword-like leaves.
    pub fn leaf_text(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.kind)
    }

    pub fn named_children(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.children.iter().filter(|c| c.named)
    }

    pub fn child_by_field(&self, field: &str) -> Option<&Arc<Node>> {
        self.children.iter().find(|c| c.field() == Some(field))
    }

    /// Same node (same id, span, field) with a new child list.
    pub(crate) fn with_children(&self, children: Vec<Arc<Node>>) -> Node {
        Node { children, ..self.clone() }
    }

    /// Same node relabeled for a new role in its parent.
    pub(crate) fn relabeled(&self, field: Option<&Kind>) -> Node {
        Node { field: field.cloned(), ..self.clone() }
    }

    /// Deep copy with fresh ids everywhere, used when a template places the
    /// same captured subtree twice.
    pub(crate) fn reidentified(&self) -> Node {
        Node {
            id: NodeId::fresh(),
            children: self.children.iter().map(|c| Arc::new(c.reidentified())).collect(),
            ..self.clone()
        }
    }

    /// Reference rendering: leaf texts in order joined by single spaces.
    ///
    /// Formatting belongs to the external printer; this is enough for regex
    /// constraints, change previews and tests.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        if self.is_leaf() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(self.leaf_text());
            return;
        }
        for child in &self.children {
            child.render_into(out);
        }
    }

    /// Pre-order visit of every node.
    pub fn walk<'a>(self: &'a Arc<Self>, f: &mut impl FnMut(&'a Arc<Node>)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// Root-to-node path of the node with `id`, if present.
    pub fn path_to<'a>(self: &'a Arc<Self>, id: NodeId) -> Option<Vec<&'a Arc<Node>>> {
        if self.id == id {
            return Some(vec![self]);
        }
        for child in &self.children {
            if let Some(mut path) = child.path_to(id) {
                path.insert(0, self);
                return Some(path);
            }
        }
        None
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(|c| c.count()).sum::<usize>()
    }
}

/// One immutable snapshot of the whole tree.
#[derive(Debug, Clone)]
pub struct Revision {
    pub number: usize,
    pub root: Arc<Node>,
}

impl Revision {
    pub fn initial(root: Arc<Node>) -> Self {
        Revision { number: 0, root }
    }

    pub(crate) fn next(&self, root: Arc<Node>) -> Self {
        Revision { number: self.number + 1, root }
    }
}

/// Replace every node listed in `edits` by its replacement list (empty means
/// delete) and path-copy the ancestors.
pub(crate) fn rebuild(node: &Arc<Node>, edits: &HashMap<NodeId, Vec<Arc<Node>>>, separators: &[String]) -> Vec<Arc<Node>> {
    if let Some(replacement) = edits.get(&node.id) {
        return replacement.clone();
    }
    if node.is_leaf() {
        return vec![Arc::clone(node)];
    }

    let results = node.children.iter().map(|c| rebuild(c, edits, separators)).collect();
    vec![assemble(node, results, separators)]
}

/// Rebuild `node` from per-child results (one list per original child, empty
/// for a deleted child), sharing `node` itself when nothing changed.
///
/// Deleting a named child also removes the anonymous tokens that belonged to
/// it: the keyword tokens in front of a trailing field (`else` before an
/// `alternative`), or one adjacent list separator. Deletions are settled
/// right to left so that removing `b, c` from `a, b, c` consumes the
/// separators on both sides of `b` rather than leaving one dangling.
pub(crate) fn assemble(node: &Arc<Node>, results: Vec<Vec<Arc<Node>>>, separators: &[String]) -> Arc<Node> {
    let unchanged = results.iter().zip(&node.children).all(|(r, c)| r.len() == 1 && Arc::ptr_eq(&r[0], c));
    if unchanged {
        return Arc::clone(node);
    }

    let is_separator = |c: &Node| !c.named && separators.iter().any(|s| s.as_str() == c.kind());
    let mut dropped = vec![false; node.children.len()];
    let deleted: Vec<usize> =
        (0..node.children.len()).filter(|&i| node.children[i].named && results[i].is_empty()).collect();

    for &i in deleted.iter().rev() {
        let child = &node.children[i];
        let trailing = !node.children[i + 1..].iter().any(|c| c.named);
        if child.field.is_some() && trailing {
            let mut j = i;
            let mut took = false;
            while j > 0 && !node.children[j - 1].named {
                j -= 1;
                if !dropped[j] && !is_separator(&node.children[j]) {
                    dropped[j] = true;
                    took = true;
                }
            }
            if took {
                continue;
            }
        }
        let next_is_free_separator = node.children.get(i + 1).is_some_and(|next| is_separator(next) && !dropped[i + 1]);
        if next_is_free_separator {
            dropped[i + 1] = true;
        } else if i > 0 && is_separator(&node.children[i - 1]) && !dropped[i - 1] {
            dropped[i - 1] = true;
        }
    }

    let mut children = Vec::with_capacity(node.children.len());
    for (i, (result, original)) in results.into_iter().zip(&node.children).enumerate() {
        if dropped[i] {
            continue;
        }
        if result.len() == 1 && result[0].field != original.field {
            children.push(Arc::new(result[0].relabeled(original.field.as_ref())));
        } else {
            children.extend(result);
        }
    }
    Arc::new(node.with_children(children))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexp;

    #[test]
    fn render_joins_leaf_texts() {
        let tree = sexp::parse(r#"(call function: (identifier = "f") arguments: (args "(" (int = "1") ")"))"#).unwrap();
        assert_eq!(tree.render(), "f ( 1 )");
        assert_eq!(tree.count(), 6);
    }

    #[test]
    fn rebuild_shares_untouched_subtrees() {
        let tree = sexp::parse(r#"(block (a) (b (c)))"#).unwrap();
        let a = Arc::clone(&tree.children()[0]);
        let c_id = tree.children()[1].children()[0].id();
        let edits = HashMap::from([(c_id, vec![Arc::new(Node::leaf("d", None, Span::default()))])]);

        let rebuilt = rebuild(&tree, &edits, &[]);
        assert_eq!(rebuilt.len(), 1);
        let root = &rebuilt[0];
        assert_eq!(root.id(), tree.id());
        assert!(Arc::ptr_eq(&root.children()[0], &a));
        assert_eq!(root.render(), "a d");
    }

    #[test]
    fn rebuild_removes_middle_list_element_with_its_separator() {
        let tree = sexp::parse(r#"(case_list (id = "a") "," (id = "b") "," (id = "c"))"#).unwrap();
        let b = tree.children()[2].id();
        let edits = HashMap::from([(b, vec![])]);

        let rebuilt = rebuild(&tree, &edits, &[",".to_string()]);
        assert_eq!(rebuilt[0].render(), "a , c");
    }

    #[test]
    fn rebuild_removes_two_trailing_elements_cleanly() {
        let tree = sexp::parse(r#"(case_list (id = "a") "," (id = "b") "," (id = "c"))"#).unwrap();
        let edits = HashMap::from([(tree.children()[2].id(), vec![]), (tree.children()[4].id(), vec![])]);

        let rebuilt = rebuild(&tree, &edits, &[",".to_string()]);
        assert_eq!(rebuilt[0].render(), "a");
    }

    #[test]
    fn rebuild_drops_keyword_of_trailing_field() {
        let tree =
            sexp::parse(r#"(if_statement "if" condition: (x) consequence: (block "{" "}") "else" alternative: (block "{" "}"))"#)
                .unwrap();
        let alt = tree.child_by_field("alternative").unwrap().id();
        let edits = HashMap::from([(alt, vec![])]);

        let rebuilt = rebuild(&tree, &edits, &[",".to_string()]);
        assert_eq!(rebuilt[0].render(), "if x { }");
    }

    #[test]
    fn replacement_inherits_field_label() {
        let tree = sexp::parse(r#"(if_statement condition: (call) consequence: (block))"#).unwrap();
        let cond = tree.child_by_field("condition").unwrap().id();
        let edits = HashMap::from([(cond, vec![Arc::new(Node::leaf("true", None, Span::default()))])]);

        let rebuilt = rebuild(&tree, &edits, &[]);
        assert_eq!(rebuilt[0].child_by_field("condition").unwrap().kind(), "true");
    }

    #[test]
    fn path_to_lists_ancestors() {
        let tree = sexp::parse(r#"(a (b (c)))"#).unwrap();
        let c = tree.children()[0].children()[0].id();
        let path: Vec<&str> = tree.path_to(c).unwrap().iter().map(|n| n.kind()).collect();
        assert_eq!(path, ["a", "b", "c"]);
    }
}
