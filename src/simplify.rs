//! Dead-code simplifier.
//!
//! Runs after a rewriting phase that put a constant where a non-constant
//! stood, and repeats its passes until a round changes nothing:
//!
//! ```text
//! A  fold + prune      bottom-up; `&&` `||` `!` `==` `!=` and parentheses on
//!                      boolean and nil constants, then constant
//!                      conditionals replaced by the taken branch (fold.rs)
//! B  unreachable       statements after a statement that pass A made
//!                      always-terminate, in the blocks around the pruned
//!                      branches                         (terminate.rs)
//! C  unused bindings   declarations whose names lost their last use and
//!                      whose initializer has no effects (bindings.rs)
//! ```
//!
//! Every deletion must be provable from the tree alone: a conditional with an
//! initializer, an operand that may have effects, or a statement that only
//! *may* terminate are all left untouched.
//!
//! Kinds come from the [`LanguageProfile`]; nothing here names a grammar.

#[path = "simplify/bindings.rs"]
mod bindings;
#[path = "simplify/fold.rs"]
mod fold;
#[path = "simplify/terminate.rs"]
mod terminate;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::api::Change;
use crate::engine::{TreeTraits, tree_traits};
use crate::profile::LanguageProfile;
use crate::tree::{Node, NodeId};

pub(crate) use bindings::Baseline;

pub(crate) struct Simplifier<'a> {
    profile: &'a LanguageProfile,
    /// Rendered texts of expressions a `pure` rule matched.
    pure_texts: &'a HashSet<String>,
    baseline: &'a Baseline,
}

impl<'a> Simplifier<'a> {
    pub(crate) fn new(profile: &'a LanguageProfile, pure_texts: &'a HashSet<String>, baseline: &'a Baseline) -> Self {
        Simplifier { profile, pure_texts, baseline }
    }

    /// Simplify `root`; `None` when nothing changed.
    pub(crate) fn run(&self, root: &Arc<Node>) -> Option<(Arc<Node>, Vec<Change>)> {
        let mut current = Arc::clone(root);
        let mut changes = Vec::new();

        loop {
            let before = changes.len();
            let traits = tree_traits(&current, self.profile);
            let mut flattened: HashSet<NodeId> = HashSet::new();

            let foldable = traits.intersects(TreeTraits::HAS_BOOLEAN_LITERAL | TreeTraits::HAS_NIL_LITERAL)
                && traits.intersects(TreeTraits::HAS_OPERATOR | TreeTraits::HAS_CONDITIONAL);
            if foldable {
                current = fold::Folder::new(self, &mut changes, &mut flattened).run(&current);
            }
            if !flattened.is_empty() && traits.contains(TreeTraits::HAS_TERMINATOR) {
                current = terminate::cleanup(&current, &flattened, self.profile, &mut changes);
            }
            if traits.contains(TreeTraits::HAS_DECLARATION) {
                current = bindings::remove_unused(&current, self, &mut changes);
            }

            trace!(changes = changes.len() - before, "simplifier round");
            if changes.len() == before {
                break;
            }
        }

        if changes.is_empty() { None } else { Some((current, changes)) }
    }

    /// No evaluation of `node` can have a side effect.
    fn effect_free(&self, node: &Node) -> bool {
        if !self.pure_texts.is_empty() && self.pure_texts.contains(&node.render()) {
            return true;
        }
        if node.is_leaf() {
            return self.profile.is_pure_leaf(node);
        }
        !self.profile.is_effect(node) && node.children().iter().all(|c| self.effect_free(c))
    }
}
