//! Pass B: statements after an always-terminating statement.
//!
//! Only a terminator that branch pruning introduced counts: a statement that
//! was flattened out of a pruned branch, or one that contains such a
//! statement and now always terminates. Code that was already unreachable in
//! the input is not ours to delete.
//!
//! ```text
//! if enabled { return X }          return X
//! sideEffect()             ──▶     (sideEffect() and return Y removed)
//! return Y
//! ```
//!
//! A conditional terminates only when both of its branches do; a missing
//! `else` means control can fall through.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::api::Change;
use crate::profile::LanguageProfile;
use crate::tree::{Node, NodeId, rebuild};

/// Blocks on the way to a flattened node, and every node on those paths.
struct Introduced {
    blocks: HashSet<NodeId>,
    on_path: HashSet<NodeId>,
}

pub(super) fn cleanup(
    root: &Arc<Node>,
    flattened: &HashSet<NodeId>,
    profile: &LanguageProfile,
    changes: &mut Vec<Change>,
) -> Arc<Node> {
    let mut introduced = Introduced { blocks: HashSet::new(), on_path: HashSet::new() };
    for &id in flattened {
        for node in root.path_to(id).into_iter().flatten() {
            introduced.on_path.insert(node.id());
            if profile.is_block(node) {
                introduced.blocks.insert(node.id());
            }
        }
    }

    let mut edits = HashMap::new();
    collect(root, &introduced, profile, &mut edits, changes);
    if edits.is_empty() {
        return Arc::clone(root);
    }
    rebuild(root, &edits, &profile.separators).pop().unwrap_or_else(|| Arc::clone(root))
}

/// Mark dead statements of the affected blocks, without descending into them.
fn collect(
    node: &Arc<Node>,
    introduced: &Introduced,
    profile: &LanguageProfile,
    edits: &mut HashMap<NodeId, Vec<Arc<Node>>>,
    changes: &mut Vec<Change>,
) {
    if introduced.blocks.contains(&node.id()) {
        let statements: Vec<&Arc<Node>> = node.named_children().collect();
        let cut = statements.iter().position(|s| introduced.on_path.contains(&s.id()) && terminates(s, profile));
        if let Some(last_live) = cut {
            for dead in &statements[last_live + 1..] {
                edits.insert(dead.id(), Vec::new());
                changes.push(Change { rule: "remove_unreachable".into(), original: dead.span(), replacement: None });
            }
        }
    }
    for child in node.children() {
        if !edits.contains_key(&child.id()) {
            collect(child, introduced, profile, edits, changes);
        }
    }
}

/// Control never reaches the end of `node`.
pub(super) fn terminates(node: &Node, profile: &LanguageProfile) -> bool {
    if profile.is_terminator(node) {
        return true;
    }
    if profile.is_block(node) {
        return node.named_children().any(|s| terminates(s, profile));
    }
    if profile.is_conditional(node) {
        let consequence = node.child_by_field(&profile.consequence_field);
        let alternative = node.child_by_field(&profile.alternative_field);
        return match (consequence, alternative) {
            (Some(c), Some(a)) => terminates(c, profile) && terminates(a, profile),
            _ => false,
        };
    }
    false
}
