//! Structural matching of a [`Pattern`] against one node.
//!
//! The matcher is a pure function of `(pattern, node, carried values)`: it
//! never mutates the tree and never looks outside the subtree rooted at the
//! candidate. A failed match is the ordinary "rule does not apply" outcome,
//! not an error.
//!
//! Sequences backtrack. A `Repeat` item is lazy (it consumes as few children
//! as possible), so the first binding found is the leftmost one:
//!
//! ```text
//! Seq [ Repeat(Any), Capture("x", Text("b")), Repeat(Any) ]
//! children:   a   b   c
//!             └┘  x   └┘      -> x = b
//! ```
//!
//! Bindings are only committed when the whole enclosing pattern succeeds, so
//! a failed alternative never leaks captures.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::tree::Node;
use crate::{Pattern, ScopeConstraint};

/// Capture name → node of the revision being matched.
pub(crate) type Bindings<'t> = BTreeMap<String, &'t Arc<Node>>;

/// Values a rule instance carries from its seeding edge and substitutions.
pub(crate) type Tags = BTreeMap<String, String>;

pub(crate) fn match_node<'t>(pattern: &Pattern, node: &'t Arc<Node>, tags: &Tags) -> Option<Bindings<'t>> {
    let mut bindings = Bindings::new();
    matches(pattern, node, tags, &mut bindings).then_some(bindings)
}

/// Check a rule's scope constraint against the ancestors of the candidate,
/// outermost first.
pub(crate) fn scope_allows(scope: Option<&ScopeConstraint>, node: &Node, ancestors: &[&Arc<Node>], tags: &Tags) -> bool {
    match scope {
        None => true,
        Some(ScopeConstraint::Field(field)) => node.field() == Some(field.as_str()),
        Some(ScopeConstraint::Within(p)) => ancestors.iter().any(|a| match_node(p, a, tags).is_some()),
        Some(ScopeConstraint::NotWithin(p)) => !ancestors.iter().any(|a| match_node(p, a, tags).is_some()),
    }
}

fn matches<'t>(pattern: &Pattern, node: &'t Arc<Node>, tags: &Tags, bindings: &mut Bindings<'t>) -> bool {
    match pattern {
        Pattern::Any => true,
        Pattern::Kind(kind) => node.kind() == kind,
        Pattern::Text(text) => text_equals(node, text),
        Pattern::Regex(re) => re.is_match(&node.render()),
        Pattern::Field(field) => node.field() == Some(field.as_str()),
        Pattern::Hole(name) => tags.get(name).is_some_and(|value| text_equals(node, value)),
        Pattern::Capture(name, inner) => {
            if !matches(inner, node, tags, bindings) {
                return false;
            }
            bindings.insert(name.clone(), node);
            true
        }
        Pattern::All(items) => {
            let mut trial = bindings.clone();
            if items.iter().all(|p| matches(p, node, tags, &mut trial)) {
                *bindings = trial;
                true
            } else {
                false
            }
        }
        Pattern::Not(inner) => !matches(inner, node, tags, &mut bindings.clone()),
        Pattern::Seq(items) => {
            let children: Vec<&'t Arc<Node>> = node.named_children().collect();
            match_seq(items, &children, tags, bindings)
        }
        Pattern::Unordered(items) => {
            let children: Vec<&'t Arc<Node>> = node.named_children().collect();
            let mut used = vec![false; children.len()];
            match_unordered(items, &children, &mut used, tags, bindings)
        }
        // Rejected by validation outside a sequence.
        Pattern::Repeat(_) => false,
        Pattern::Contains(inner) => node.children().iter().any(|child| match_descendant(inner, child, tags, bindings)),
    }
}

/// Pre-order search of `node`'s subtree; the first hit commits its bindings.
fn match_descendant<'t>(pattern: &Pattern, node: &'t Arc<Node>, tags: &Tags, bindings: &mut Bindings<'t>) -> bool {
    let mut trial = bindings.clone();
    if matches(pattern, node, tags, &mut trial) {
        *bindings = trial;
        return true;
    }
    node.children().iter().any(|child| match_descendant(pattern, child, tags, bindings))
}

fn text_equals(node: &Node, text: &str) -> bool {
    if node.is_leaf() { node.leaf_text() == text } else { node.render() == text }
}

fn match_seq<'t>(items: &[Pattern], children: &[&'t Arc<Node>], tags: &Tags, bindings: &mut Bindings<'t>) -> bool {
    let Some((first, rest)) = items.split_first() else {
        return children.is_empty();
    };

    if let Pattern::Repeat(inner) = first {
        for taken in 0..=children.len() {
            if taken > 0 && !matches(inner, children[taken - 1], tags, &mut bindings.clone()) {
                return false;
            }
            let mut trial = bindings.clone();
            if match_seq(rest, &children[taken..], tags, &mut trial) {
                *bindings = trial;
                return true;
            }
        }
        return false;
    }

    let Some((head, tail)) = children.split_first() else {
        return false;
    };
    let mut trial = bindings.clone();
    if matches(first, head, tags, &mut trial) && match_seq(rest, tail, tags, &mut trial) {
        *bindings = trial;
        true
    } else {
        false
    }
}

fn match_unordered<'t>(
    items: &[Pattern],
    children: &[&'t Arc<Node>],
    used: &mut [bool],
    tags: &Tags,
    bindings: &mut Bindings<'t>,
) -> bool {
    let Some((first, rest)) = items.split_first() else {
        return true;
    };
    for i in 0..children.len() {
        if used[i] {
            continue;
        }
        let mut trial = bindings.clone();
        if !matches(first, children[i], tags, &mut trial) {
            continue;
        }
        used[i] = true;
        if match_unordered(rest, children, used, tags, &mut trial) {
            *bindings = trial;
            return true;
        }
        used[i] = false;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexp;

    fn names(b: &Bindings) -> Vec<(String, String)> {
        b.iter().map(|(k, v)| (k.clone(), v.render())).collect()
    }

    #[test]
    fn picks_one_case_label_out_of_a_list() {
        let tree = sexp::parse(r#"(case_list (id = "a") "," (id = "b") "," (id = "c"))"#).unwrap();
        let pattern = node!(
            "case_list",
            [Pattern::Any.repeat(), Pattern::text("b").capture("label"), Pattern::Any.repeat()]
        );
        let bindings = match_node(&pattern, &tree, &Tags::new()).unwrap();
        assert_eq!(names(&bindings), [("label".to_string(), "b".to_string())]);
        assert_eq!(bindings["label"].id(), tree.children()[2].id());
    }

    #[test]
    fn sequence_requires_every_child_to_be_accounted_for() {
        let tree = sexp::parse(r#"(args (a) (b))"#).unwrap();
        assert!(match_node(&node!("args", [Pattern::Any]), &tree, &Tags::new()).is_none());
        assert!(match_node(&node!("args", [Pattern::Any, Pattern::Any]), &tree, &Tags::new()).is_some());
        assert!(match_node(&node!("args", [Pattern::Any.repeat()]), &tree, &Tags::new()).is_some());
    }

    #[test]
    fn failed_branches_do_not_leak_bindings() {
        let tree = sexp::parse(r#"(pair (a) (b))"#).unwrap();
        let pattern = Pattern::All(vec![
            Pattern::Seq(vec![Pattern::Any.capture("x"), Pattern::Any]),
            Pattern::kind("nope"),
        ]);
        let mut bindings = Bindings::new();
        assert!(!matches(&pattern, &tree, &Tags::new(), &mut bindings));
        assert!(bindings.is_empty());

        let negated = Pattern::Not(Box::new(Pattern::Any.capture("y")));
        let mut bindings = Bindings::new();
        assert!(!matches(&negated, &tree, &Tags::new(), &mut bindings));
        assert!(bindings.is_empty());
    }

    #[test]
    fn unordered_assigns_distinct_children() {
        let tree = sexp::parse(r#"(set (a) (b) (c))"#).unwrap();
        let pattern = Pattern::Unordered(vec![Pattern::kind("c").capture("c"), Pattern::kind("a").capture("a")]);
        let bindings = match_node(&pattern, &tree, &Tags::new()).unwrap();
        assert_eq!(bindings.len(), 2);

        let twice = Pattern::Unordered(vec![Pattern::kind("a"), Pattern::kind("a")]);
        assert!(match_node(&twice, &tree, &Tags::new()).is_none());
    }

    #[test]
    fn holes_compare_against_carried_values() {
        let tree = sexp::parse(r#"(identifier = "enabled")"#).unwrap();
        let tags = Tags::from([("var".to_string(), "enabled".to_string())]);
        assert!(match_node(&Pattern::hole("var"), &tree, &tags).is_some());
        assert!(match_node(&Pattern::hole("var"), &tree, &Tags::new()).is_none());
        assert!(match_node(&Pattern::hole("other"), &tree, &tags).is_none());
    }

    #[test]
    fn text_and_regex_use_rendered_text() {
        let tree = sexp::parse(
            r#"(call_expression function: (selector_expression (identifier = "exp") "." (field_identifier = "BoolValue")) arguments: (argument_list "(" (interpreted_string_literal = "\"stale\"") ")"))"#,
        )
        .unwrap();
        let function = Pattern::field("function").and(re!(r"^exp \. (BoolValue|StrValue)$"));
        let args = Pattern::field("arguments").and(Pattern::Seq(vec![Pattern::text("\"stale\"").capture("flag")]));
        let pattern = node!("call_expression", [function, args]);
        let bindings = match_node(&pattern, &tree, &Tags::new()).unwrap();
        assert_eq!(bindings["flag"].value(), Some("\"stale\""));
    }

    #[test]
    fn contains_searches_strict_descendants_in_preorder() {
        let tree = sexp::parse(r#"(block (if (x = "1")) (if (x = "2")))"#).unwrap();
        let pattern = Pattern::kind("x").capture("first").contains();
        let bindings = match_node(&pattern, &tree, &Tags::new()).unwrap();
        assert_eq!(bindings["first"].render(), "1");

        let leaf = sexp::parse(r#"(x = "1")"#).unwrap();
        assert!(match_node(&Pattern::kind("x").contains(), &leaf, &Tags::new()).is_none());
    }

    #[test]
    fn scope_constraints_consult_ancestors() {
        let tree = sexp::parse(r#"(if_statement condition: (call) consequence: (block (call)))"#).unwrap();
        let cond = tree.child_by_field("condition").unwrap();
        let body_call = &tree.child_by_field("consequence").unwrap().children()[0];
        let tags = Tags::new();

        let in_condition = ScopeConstraint::Field("condition".into());
        assert!(scope_allows(Some(&in_condition), cond, &[&tree], &tags));
        assert!(!scope_allows(Some(&in_condition), body_call, &[&tree], &tags));

        let in_block = ScopeConstraint::Within(Pattern::kind("block"));
        let consequence = tree.child_by_field("consequence").unwrap();
        assert!(scope_allows(Some(&in_block), body_call, &[&tree, consequence], &tags));
        assert!(!scope_allows(Some(&ScopeConstraint::NotWithin(Pattern::kind("block"))), body_call, &[&tree, consequence], &tags));
    }
}
