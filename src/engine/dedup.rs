//! Fire marks that keep the fixpoint finite.
//!
//! A rule never fires twice on the same node. Replacement nodes get fresh
//! [`NodeId`]s, so a rule can still fire on what another rule produced; only
//! re-firing on an untouched (or path-copied) node is suppressed. Cyclic rule
//! graphs therefore either run out of fresh nodes or hit the iteration budget.
//!
//! Seeded and global instances of a rule share one mark: the key is the rule,
//! not the edge that made it eligible.

use std::collections::HashSet;

use super::compiled_rules::RuleId;
use crate::tree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FireKey {
    pub(crate) rule: RuleId,
    pub(crate) node: NodeId,
}

#[derive(Debug, Default)]
pub(crate) struct FireMarks {
    fired: HashSet<FireKey>,
}

impl FireMarks {
    pub(crate) fn has_fired(&self, rule: RuleId, node: NodeId) -> bool {
        self.fired.contains(&FireKey { rule, node })
    }

    pub(crate) fn mark(&mut self, rule: RuleId, node: NodeId) {
        self.fired.insert(FireKey { rule, node });
    }

    pub(crate) fn len(&self) -> usize {
        self.fired.len()
    }
}
