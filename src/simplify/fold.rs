//! Pass A: constant folding and branch pruning, bottom-up.
//!
//! Children are simplified before their parent, so a condition is already
//! folded when its conditional is considered:
//!
//! ```text
//! if !(false || x && true) { a() } else { b() }
//!          └─ x && true  -> x
//!      └─ false || x     -> x          (condition is not constant: kept)
//!
//! if !(true) { a() } else { b() }
//!      └─ (true) -> true, !true -> false
//! └─ if false {..} else { b() }  -> b()   flattened into the enclosing block
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::Simplifier;
use crate::api::Change;
use crate::tree::{Node, NodeId, Span, assemble};

pub(super) struct Folder<'s, 'a> {
    simplifier: &'s Simplifier<'a>,
    changes: &'s mut Vec<Change>,
    /// Nodes that took the place of a pruned conditional.
    flattened: &'s mut HashSet<NodeId>,
}

impl<'s, 'a> Folder<'s, 'a> {
    pub(super) fn new(
        simplifier: &'s Simplifier<'a>,
        changes: &'s mut Vec<Change>,
        flattened: &'s mut HashSet<NodeId>,
    ) -> Self {
        Folder { simplifier, changes, flattened }
    }

    pub(super) fn run(&mut self, root: &Arc<Node>) -> Arc<Node> {
        match <[Arc<Node>; 1]>::try_from(self.visit(root, None)) {
            Ok([root]) => root,
            Err(_) => Arc::clone(root),
        }
    }

    fn visit(&mut self, node: &Arc<Node>, parent: Option<&Arc<Node>>) -> Vec<Arc<Node>> {
        if node.is_leaf() {
            return vec![Arc::clone(node)];
        }
        let results = node.children().iter().map(|c| self.visit(c, Some(node))).collect();
        let node = assemble(node, results, &self.simplifier.profile.separators);

        if let Some(folded) = self.fold(&node) {
            self.record("fold_boolean", &node, Some(folded.span()));
            return vec![folded];
        }
        if let Some(replacement) = self.prune(&node, parent) {
            self.record("prune_branch", &node, Span::covering(&replacement));
            return replacement;
        }
        vec![node]
    }

    fn record(&mut self, rule: &str, node: &Node, replacement: Option<Span>) {
        self.changes.push(Change { rule: rule.to_string(), original: node.span(), replacement });
    }

    fn operator<'n>(&self, node: &'n Node) -> Option<&'n str> {
        let profile = self.simplifier.profile;
        node.child_by_field(&profile.operator_field)
            .or_else(|| node.children().iter().find(|c| !c.is_named()))
            .map(|op| op.leaf_text())
    }

    fn literal(&self, value: bool, like: &Node) -> Arc<Node> {
        Arc::new(self.simplifier.profile.literal(value, like))
    }

    /// Fold one operator node whose operands are already folded.
    fn fold(&self, node: &Arc<Node>) -> Option<Arc<Node>> {
        let profile = self.simplifier.profile;

        if profile.is_parenthesized(node) {
            let value = profile.boolean_value(node)?;
            return Some(self.literal(value, node));
        }

        if node.kind() == profile.unary_expression {
            if self.operator(node)? != profile.not_operator {
                return None;
            }
            let operand =
                node.child_by_field(&profile.operand_field).or_else(|| node.named_children().next())?;
            let value = profile.boolean_value(operand)?;
            return Some(self.literal(!value, node));
        }

        if node.kind() != profile.binary_expression {
            return None;
        }
        let op = self.operator(node)?;
        let left = node.child_by_field(&profile.left_field)?;
        let right = node.child_by_field(&profile.right_field)?;
        let (lv, rv) = (profile.boolean_value(left), profile.boolean_value(right));

        if op == profile.and_operator {
            // The left operand always runs; the right one only when left is true.
            match (lv, rv) {
                (Some(false), _) => Some(self.literal(false, node)),
                (Some(true), _) => Some(Arc::clone(right)),
                (_, Some(true)) => Some(Arc::clone(left)),
                (_, Some(false)) if self.simplifier.effect_free(left) => Some(self.literal(false, node)),
                _ => None,
            }
        } else if op == profile.or_operator {
            match (lv, rv) {
                (Some(true), _) => Some(self.literal(true, node)),
                (Some(false), _) => Some(Arc::clone(right)),
                (_, Some(false)) => Some(Arc::clone(left)),
                (_, Some(true)) if self.simplifier.effect_free(left) => Some(self.literal(true, node)),
                _ => None,
            }
        } else if op == profile.eq_operator || op == profile.ne_operator {
            let equal = match (lv, rv) {
                (Some(l), Some(r)) => l == r,
                // `err != nil` once `err` was replaced by the nil a resolved
                // flag read returns.
                _ if profile.is_nil(left) && profile.is_nil(right) => true,
                _ => return None,
            };
            Some(self.literal(equal == (op == profile.eq_operator), node))
        } else {
            None
        }
    }

    /// Statements of a block, looking through a block whose only content is
    /// another block (`block { statement_list { .. } }`).
    fn statements(&self, block: &Arc<Node>) -> Vec<Arc<Node>> {
        let mut named = block.named_children();
        match (named.next(), named.next()) {
            (Some(only), None) if self.simplifier.profile.is_block(only) => self.statements(only),
            _ => block.named_children().cloned().collect(),
        }
    }

    /// Replace a conditional whose condition is constant by its taken branch.
    fn prune(&mut self, node: &Arc<Node>, parent: Option<&Arc<Node>>) -> Option<Vec<Arc<Node>>> {
        let profile = self.simplifier.profile;
        if !profile.is_conditional(node) {
            return None;
        }
        let condition = node.child_by_field(&profile.condition_field)?;
        let value = profile.boolean_value(condition)?;
        let consequence = node.child_by_field(&profile.consequence_field)?;
        let alternative = node.child_by_field(&profile.alternative_field);

        // An initializer (`if v := f(); true {..}`) may have effects.
        let known = |c: &&Arc<Node>| {
            c.id() == condition.id() || c.id() == consequence.id() || alternative.is_some_and(|a| a.id() == c.id())
        };
        if !node.named_children().all(|c| known(&c)) {
            debug!(span = %node.span(), "conditional has extra parts; not pruned");
            return None;
        }

        let in_block = parent.is_some_and(|p| profile.is_block(p));
        let taken = if value { Some(consequence) } else { alternative };
        let replacement = match taken {
            // Nothing can stand in for the root.
            None if parent.is_none() => return None,
            None => Vec::new(),
            Some(branch) if in_block && profile.is_block(branch) => self.statements(branch),
            Some(branch) => vec![Arc::clone(branch)],
        };

        self.flattened.extend(replacement.iter().map(|n| n.id()));
        Some(replacement)
    }
}
