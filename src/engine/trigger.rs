//! Trigger scanning (tree pre-classification).
//!
//! Before each scan the driver takes a cheap inventory of the current
//! revision so it can skip rules that cannot possibly match anywhere:
//!
//! - **Kinds**: every node kind present. Rules whose pattern pins a root kind
//!   (`RuleIndex::by_kind`) are only tried when that kind exists.
//! - **Texts**: every leaf text. A rule that requires a literal token (for
//!   example a flag name) is skipped when the token is absent.
//! - **Traits** (`TreeTraits`): coarse booleans the simplifier uses to skip
//!   passes that have nothing to work on (no constant, or nothing to fold
//!   or prune).
//!
//! The scan is a heuristic: false positives are fine because the matcher
//! still has to accept the full pattern.

use std::collections::HashSet;
use std::sync::Arc;

use bitflags::bitflags;

use super::compiled_rules::{RuleGraph, RuleId, RuleMeta};
use crate::Trigger;
use crate::profile::LanguageProfile;
use crate::tree::Node;

bitflags! {
    /// Coarse structural facts about a tree.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TreeTraits: u8 {
        const HAS_BOOLEAN_LITERAL = 0b0000_0001;
        const HAS_CONDITIONAL     = 0b0000_0010;
        const HAS_TERMINATOR      = 0b0000_0100;
        const HAS_DECLARATION     = 0b0000_1000;
        const HAS_OPERATOR        = 0b0001_0000;
        const HAS_NIL_LITERAL     = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriggerInfo {
    pub kinds: HashSet<String>,
    pub texts: HashSet<String>,
    pub traits: TreeTraits,
}

impl TriggerInfo {
    pub fn scan(root: &Arc<Node>, profile: &LanguageProfile) -> Self {
        let mut info = TriggerInfo::default();
        root.walk(&mut |node| {
            if !info.kinds.contains(node.kind()) {
                info.kinds.insert(node.kind().to_string());
            }
            if node.is_leaf() && !info.texts.contains(node.leaf_text()) {
                info.texts.insert(node.leaf_text().to_string());
            }
            info.traits |= traits_of(node, profile);
        });
        info
    }

    /// Could a rule with these facts match somewhere in the scanned tree?
    pub fn admits(&self, meta: &RuleMeta) -> bool {
        meta.root_kind.as_ref().is_none_or(|k| self.kinds.contains(k))
            && meta.required_texts.iter().all(|t| self.texts.contains(t))
    }

    /// Global rules worth trying on this tree, in declaration order.
    pub fn active_rules(&self, graph: &RuleGraph) -> Vec<RuleId> {
        let mut ids: Vec<RuleId> = graph.index.always_on.clone();
        for kind in &self.kinds {
            if let Some(listed) = graph.index.by_kind.get(kind) {
                ids.extend(listed);
            }
        }
        ids.retain(|&id| graph.rules[id].trigger == Trigger::Global && self.admits(&graph.metas[id]));
        ids.sort_unstable();
        ids
    }
}

/// Traits of a whole tree, without the kind and text inventory.
pub(crate) fn tree_traits(root: &Node, profile: &LanguageProfile) -> TreeTraits {
    let mut traits = traits_of(root, profile);
    for child in root.children() {
        traits |= tree_traits(child, profile);
    }
    traits
}

fn traits_of(node: &Node, profile: &LanguageProfile) -> TreeTraits {
    let mut traits = TreeTraits::empty();
    if node.kind() == profile.true_literal || node.kind() == profile.false_literal {
        traits |= TreeTraits::HAS_BOOLEAN_LITERAL;
    }
    if profile.is_conditional(node) {
        traits |= TreeTraits::HAS_CONDITIONAL;
    }
    if profile.is_terminator(node) {
        traits |= TreeTraits::HAS_TERMINATOR;
    }
    if profile.is_declaration(node) {
        traits |= TreeTraits::HAS_DECLARATION;
    }
    if profile.is_nil(node) {
        traits |= TreeTraits::HAS_NIL_LITERAL;
    }
    if node.kind() == profile.binary_expression
        || node.kind() == profile.unary_expression
        || profile.is_parenthesized(node)
    {
        traits |= TreeTraits::HAS_OPERATOR;
    }
    traits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pattern, Rule, Template, sexp};

    #[test]
    fn scan_collects_kinds_texts_and_traits() {
        let tree = sexp::parse(
            r#"(block (if_statement "if" condition: (true) consequence: (block "{" (return_statement "return") "}")))"#,
        )
        .unwrap();
        let info = TriggerInfo::scan(&tree, &LanguageProfile::default());
        assert!(info.kinds.contains("if_statement"));
        assert!(info.texts.contains("return"));
        assert!(info.traits.contains(TreeTraits::HAS_BOOLEAN_LITERAL | TreeTraits::HAS_TERMINATOR));
        assert!(info.traits.contains(TreeTraits::HAS_CONDITIONAL));
        assert!(!info.traits.intersects(TreeTraits::HAS_DECLARATION | TreeTraits::HAS_OPERATOR));

        let check = sexp::parse(r#"(binary_expression left: (nil) operator: "!=" right: (nil))"#).unwrap();
        let traits = tree_traits(&check, &LanguageProfile::default());
        assert_eq!(traits, TreeTraits::HAS_NIL_LITERAL | TreeTraits::HAS_OPERATOR);
    }

    #[test]
    fn rules_are_gated_by_kind_and_required_text() {
        let graph = RuleGraph::new([
            Rule::new("calls", Pattern::kind("call_expression"), Template::Delete),
            Rule::new("stale", Pattern::text("stale_flag"), Template::Delete),
            Rule::new("ifs", Pattern::kind("if_statement"), Template::Delete),
        ])
        .unwrap();
        let tree = sexp::parse(r#"(block (if_statement (identifier = "stale_flag")))"#).unwrap();
        let info = TriggerInfo::scan(&tree, &LanguageProfile::default());
        assert_eq!(info.active_rules(&graph), vec![1, 2]);
    }
}
