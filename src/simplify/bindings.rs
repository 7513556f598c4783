//! Pass C: unused-binding elimination.
//!
//! A declaration is removed when
//!
//! - every name it declares (blank names aside) had at least one use in the
//!   input revision ([`Baseline`]) and has none now, and
//! - its initializer cannot have side effects.
//!
//! The first condition keeps the pass from touching bindings that were
//! already unused before the run. Uses are counted per block ([`Scope`]):
//! identifier leaves with the same text in the statements after the
//! declaration, up to the statement that declares the name again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::Simplifier;
use crate::api::Change;
use crate::profile::LanguageProfile;
use crate::tree::{Node, NodeId, rebuild};

/// Declared names that had at least one use in the input revision, by the
/// `NodeId` of the name leaf.
#[derive(Debug, Default)]
pub(crate) struct Baseline {
    used: HashSet<NodeId>,
}

impl Baseline {
    pub(crate) fn of(root: &Arc<Node>, profile: &LanguageProfile) -> Self {
        let mut used = HashSet::new();
        root.walk(&mut |node| {
            if profile.is_block(node) {
                for declaration in Scope::of(node, profile).declarations {
                    used.extend(declaration.names.iter().filter(|n| n.uses > 0).map(|n| n.id));
                }
            }
        });
        Baseline { used }
    }

    pub(crate) fn had_uses(&self, name: NodeId) -> bool {
        self.used.contains(&name)
    }
}

/// Declarations of one block and how often each declared name is used
/// afterwards.
#[derive(Debug)]
pub(crate) struct Scope<'n> {
    pub(crate) declarations: Vec<Declaration<'n>>,
}

#[derive(Debug)]
pub(crate) struct Declaration<'n> {
    pub(crate) node: &'n Arc<Node>,
    pub(crate) names: Vec<Name>,
    pub(crate) initializer: Option<&'n Arc<Node>>,
}

#[derive(Debug)]
pub(crate) struct Name {
    pub(crate) id: NodeId,
    pub(crate) text: String,
    pub(crate) uses: usize,
}

impl<'n> Scope<'n> {
    pub(crate) fn of(block: &'n Arc<Node>, profile: &LanguageProfile) -> Self {
        let statements: Vec<&'n Arc<Node>> = block.named_children().collect();
        let mut declarations = Vec::new();
        for (i, &statement) in statements.iter().enumerate() {
            if !profile.is_declaration(statement) {
                continue;
            }
            let Some(left) = statement.child_by_field(&profile.names_field) else {
                continue;
            };
            let mut names = Vec::new();
            left.walk(&mut |n| {
                if profile.is_identifier(n) && n.leaf_text() != profile.blank_identifier {
                    let text = n.leaf_text().to_string();
                    let uses = uses_until_redeclared(&statements[i + 1..], &text, profile);
                    names.push(Name { id: n.id(), text, uses });
                }
            });
            declarations.push(Declaration {
                node: statement,
                names,
                initializer: statement.child_by_field(&profile.initializer_field),
            });
        }
        Scope { declarations }
    }
}

/// Uses of `name` in `statements`, up to and including the first statement
/// that declares it again (its initializer still sees the old binding).
fn uses_until_redeclared(statements: &[&Arc<Node>], name: &str, profile: &LanguageProfile) -> usize {
    let mut uses = 0;
    for &statement in statements {
        uses += count_uses(statement, name, profile);
        let redeclares = profile.is_declaration(statement)
            && profile.rebound_names(statement).is_some_and(|names| names.contains(&name));
        if redeclares {
            break;
        }
    }
    uses
}

fn count_uses(node: &Node, name: &str, profile: &LanguageProfile) -> usize {
    if profile.is_identifier(node) {
        return usize::from(node.leaf_text() == name);
    }
    let redeclared = |c: &Arc<Node>| profile.is_declaration(node) && c.field() == Some(profile.names_field.as_str());
    node.children().iter().filter(|c| !redeclared(c)).map(|c| count_uses(c, name, profile)).sum()
}

pub(super) fn remove_unused(root: &Arc<Node>, simplifier: &Simplifier, changes: &mut Vec<Change>) -> Arc<Node> {
    let profile = simplifier.profile;
    let mut edits: HashMap<NodeId, Vec<Arc<Node>>> = HashMap::new();
    root.walk(&mut |node| {
        if !profile.is_block(node) {
            return;
        }
        for declaration in Scope::of(node, profile).declarations {
            let unused = !declaration.names.is_empty()
                && declaration.names.iter().all(|n| n.uses == 0 && simplifier.baseline.had_uses(n.id));
            if unused && declaration.initializer.is_none_or(|init| simplifier.effect_free(init)) {
                tracing::debug!(names = ?declaration.names.iter().map(|n| &n.text).collect::<Vec<_>>(), "binding lost its last use");
                edits.insert(declaration.node.id(), Vec::new());
                changes.push(Change {
                    rule: "remove_unused_binding".into(),
                    original: declaration.node.span(),
                    replacement: None,
                });
            }
        }
    });
    if edits.is_empty() {
        return Arc::clone(root);
    }
    rebuild(root, &edits, &profile.separators).pop().unwrap_or_else(|| Arc::clone(root))
}
