//! Rule graph: registration, validation and indexing.
//!
//! This module holds the *static* side of the engine: everything derived from
//! the rule list once, before any tree is scanned, and shared read-only by
//! every file processed with it (a `RuleGraph` is `Send + Sync`).
//!
//! 1. **Register** rules (`RuleGraph::register`): local checks (duplicate
//!    names, captures used by the template or edges, misplaced repeats,
//!    invalid regexes) and per-rule metadata (`RuleMeta`).
//! 2. **Validate** the graph (`RuleGraph::validate`): successor names resolve,
//!    edges into forward-only rules are replaced by that rule's own edges,
//!    seeded-only rules have a predecessor, and holes no edge binds are
//!    remembered so the engine can demand them as substitutions.
//! 3. **Index**: rules whose pattern pins a root kind are listed under that
//!    kind; the rest are `always_on`. The driver only tries a rule at nodes
//!    whose kind can possibly match.
//!
//! ## Invariants
//!
//! - `RuleId` is an index into `RuleGraph::rules` and `RuleGraph::metas`.
//!   Those vectors stay aligned, in declaration order.
//! - Declaration order is the tie-break when several rules match one node.

use std::collections::{BTreeSet, HashMap};

use crate::error::ConfigError;
use crate::{EdgeScope, Pattern, Rule, ScopeConstraint, Template, Trigger};

/// Rule identifier (index into the rules vector, i.e. declaration order).
pub type RuleId = usize;

/// Static facts about one rule's pattern.
#[derive(Debug, Clone, Default)]
pub struct RuleMeta {
    /// Kinds the matched node must have, when the pattern pins one.
    pub root_kind: Option<String>,
    /// Single-token texts that must occur somewhere in the tree.
    pub required_texts: Vec<String>,
    /// Names bound by a successful match.
    pub captures: BTreeSet<String>,
    /// Values the rule expects from its seeding edge or substitutions.
    pub holes: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub to: RuleId,
    pub capture: String,
    pub scope: EdgeScope,
}

#[derive(Default, Debug)]
pub struct RuleIndex {
    pub always_on: Vec<RuleId>,
    pub by_kind: HashMap<String, Vec<RuleId>>,
}

/// The validated, indexed rule set.
#[derive(Debug, Default)]
pub struct RuleGraph {
    pub(crate) rules: Vec<Rule>,
    pub(crate) metas: Vec<RuleMeta>,
    pub(crate) index: RuleIndex,
    by_name: HashMap<String, RuleId>,
    edges: Vec<Vec<Edge>>,
    unbound_holes: Vec<BTreeSet<String>>,
    validated: bool,
}

impl RuleGraph {
    /// Register every rule in order, then validate the graph.
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Result<Self, ConfigError> {
        let mut graph = RuleGraph::default();
        for rule in rules {
            graph.register(rule)?;
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Add a rule after the existing ones. Edges are resolved by [`validate`].
    ///
    /// [`validate`]: RuleGraph::validate
    pub fn register(&mut self, rule: Rule) -> Result<RuleId, ConfigError> {
        if self.by_name.contains_key(&rule.name) {
            return Err(ConfigError::DuplicateRule(rule.name.clone()));
        }

        let mut meta = RuleMeta { root_kind: root_kind(&rule.pattern), ..RuleMeta::default() };
        check_pattern(&rule.name, &rule.pattern, false, false, &mut meta)?;
        if let Some(scope) = &rule.scope {
            let mut scratch = RuleMeta::default();
            match scope {
                ScopeConstraint::Field(_) => {}
                ScopeConstraint::Within(p) | ScopeConstraint::NotWithin(p) => {
                    check_pattern(&rule.name, p, false, false, &mut scratch)?;
                    meta.holes.extend(scratch.holes);
                }
            }
        }
        check_template(&rule.name, &rule.replacement, &meta)?;
        // A forward rule's edges name captures of whoever points at it.
        for succ in rule.successors.iter().filter(|_| !rule.forward_only) {
            if !meta.captures.contains(&succ.capture) {
                return Err(ConfigError::DanglingEdgeCapture {
                    rule: rule.name.clone(),
                    successor: succ.rule.clone(),
                    capture: succ.capture.clone(),
                });
            }
        }

        let id = self.rules.len();
        match &meta.root_kind {
            _ if rule.forward_only => {}
            Some(kind) => self.index.by_kind.entry(kind.clone()).or_default().push(id),
            None => self.index.always_on.push(id),
        }
        self.by_name.insert(rule.name.clone(), id);
        self.rules.push(rule);
        self.metas.push(meta);
        self.edges.push(Vec::new());
        self.unbound_holes.push(BTreeSet::new());
        self.validated = false;
        Ok(id)
    }

    /// Resolve successor edges and check graph-level constraints.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let mut direct = vec![Vec::new(); self.rules.len()];
        let mut pointed_at = vec![false; self.rules.len()];
        for (from, rule) in self.rules.iter().enumerate() {
            for succ in &rule.successors {
                let to = *self.by_name.get(&succ.rule).ok_or_else(|| ConfigError::UnknownSuccessor {
                    rule: rule.name.clone(),
                    successor: succ.rule.clone(),
                })?;
                direct[from].push(Edge { to, capture: succ.capture.clone(), scope: succ.scope.clone() });
                pointed_at[to] = true;
            }
        }

        let mut edges = Vec::with_capacity(self.rules.len());
        let mut incoming: Vec<Vec<RuleId>> = vec![Vec::new(); self.rules.len()];
        for from in 0..self.rules.len() {
            let mut out = Vec::new();
            self.flatten(&direct, from, &mut vec![from], &mut out)?;
            if !self.rules[from].forward_only {
                for edge in &out {
                    if !self.metas[from].captures.contains(&edge.capture) {
                        return Err(ConfigError::DanglingEdgeCapture {
                            rule: self.rules[from].name.clone(),
                            successor: self.rules[edge.to].name.clone(),
                            capture: edge.capture.clone(),
                        });
                    }
                    incoming[edge.to].push(from);
                }
            }
            edges.push(out);
        }

        for (id, rule) in self.rules.iter().enumerate() {
            let reachable = if rule.forward_only { pointed_at[id] } else { !incoming[id].is_empty() };
            if rule.trigger == Trigger::Seeded && !reachable {
                return Err(ConfigError::UnreachableRule { rule: rule.name.clone() });
            }
        }

        // Seeded instances carry their predecessor's captures and holes;
        // whatever no predecessor binds must come from substitutions.
        let mut unbound = vec![BTreeSet::new(); self.rules.len()];
        for (id, rule) in self.rules.iter().enumerate() {
            let meta = &self.metas[id];
            unbound[id] = match rule.trigger {
                Trigger::Global => meta.holes.clone(),
                Trigger::Seeded => meta
                    .holes
                    .iter()
                    .filter(|hole| {
                        !incoming[id].iter().all(|&p| {
                            self.metas[p].captures.contains(*hole) || self.metas[p].holes.contains(*hole)
                        })
                    })
                    .cloned()
                    .collect(),
            };
        }

        self.unbound_holes = unbound;
        self.edges = edges;
        self.validated = true;
        Ok(())
    }

    /// Edges of `from` with every edge into a forward-only rule replaced by
    /// that rule's own (flattened) edges. `trail` holds the forward rules
    /// being expanded, to reject cycles among them.
    fn flatten(
        &self,
        direct: &[Vec<Edge>],
        from: RuleId,
        trail: &mut Vec<RuleId>,
        out: &mut Vec<Edge>,
    ) -> Result<(), ConfigError> {
        for edge in &direct[from] {
            if !self.rules[edge.to].forward_only {
                out.push(edge.clone());
                continue;
            }
            if trail.contains(&edge.to) {
                return Err(ConfigError::ForwardCycle { rule: self.rules[edge.to].name.clone() });
            }
            trail.push(edge.to);
            self.flatten(direct, edge.to, trail, out)?;
            trail.pop();
        }
        Ok(())
    }

    /// Holes that no edge binds must come from caller substitutions.
    pub(crate) fn check_substitutions(&self, provided: impl Fn(&str) -> bool) -> Result<(), ConfigError> {
        for (rule, holes) in self.rules.iter().zip(&self.unbound_holes) {
            if let Some(hole) = holes.iter().find(|h| !provided(h.as_str())) {
                return Err(ConfigError::UnboundHole { rule: rule.name.clone(), hole: hole.clone() });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn id_of(&self, name: &str) -> Option<RuleId> {
        self.by_name.get(name).copied()
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Successor rules of `id`, in edge declaration order.
    pub fn successors_of(&self, id: RuleId) -> Vec<&Rule> {
        self.edges[id].iter().map(|e| &self.rules[e.to]).collect()
    }

    pub(crate) fn edges_of(&self, id: RuleId) -> &[Edge] {
        &self.edges[id]
    }

    /// Number of rules and edges, for logging.
    pub fn size(&self) -> (usize, usize) {
        (self.rules.len(), self.edges.iter().map(Vec::len).sum())
    }
}

/// Kind pinned by the top of a pattern, if any.
fn root_kind(pattern: &Pattern) -> Option<String> {
    match pattern {
        Pattern::Kind(kind) => Some(kind.clone()),
        Pattern::Capture(_, inner) => root_kind(inner),
        Pattern::All(items) => items.iter().find_map(root_kind),
        _ => None,
    }
}

/// Walk a pattern collecting captures/holes/required texts and rejecting
/// shapes the matcher does not support.
fn check_pattern(
    rule: &str,
    pattern: &Pattern,
    in_repeat: bool,
    negated: bool,
    meta: &mut RuleMeta,
) -> Result<(), ConfigError> {
    match pattern {
        Pattern::Any | Pattern::Kind(_) | Pattern::Field(_) | Pattern::Regex(_) => Ok(()),
        Pattern::Text(text) => {
            if !negated && !in_repeat && !text.is_empty() && !text.contains(char::is_whitespace) {
                meta.required_texts.push(text.clone());
            }
            Ok(())
        }
        Pattern::Hole(name) => {
            meta.holes.insert(name.clone());
            Ok(())
        }
        Pattern::Capture(name, inner) => {
            if in_repeat {
                return Err(ConfigError::CaptureInRepeat { rule: rule.to_string(), capture: name.clone() });
            }
            if !negated {
                meta.captures.insert(name.clone());
            }
            check_pattern(rule, inner, in_repeat, negated, meta)
        }
        Pattern::All(items) => items.iter().try_for_each(|p| check_pattern(rule, p, in_repeat, negated, meta)),
        Pattern::Unordered(items) => items.iter().try_for_each(|p| {
            if matches!(p, Pattern::Repeat(_)) {
                return Err(ConfigError::MisplacedRepeat { rule: rule.to_string() });
            }
            check_pattern(rule, p, in_repeat, negated, meta)
        }),
        Pattern::Not(inner) => check_pattern(rule, inner, in_repeat, true, meta),
        Pattern::Contains(inner) => check_pattern(rule, inner, in_repeat, negated, meta),
        Pattern::Seq(items) => items.iter().try_for_each(|p| match p {
            Pattern::Repeat(inner) => check_pattern(rule, inner, true, negated, meta),
            other => check_pattern(rule, other, in_repeat, negated, meta),
        }),
        Pattern::Repeat(_) => Err(ConfigError::MisplacedRepeat { rule: rule.to_string() }),
    }
}

fn check_template(rule: &str, template: &Template, meta: &RuleMeta) -> Result<(), ConfigError> {
    let dangling = |capture: &str| ConfigError::DanglingCapture { rule: rule.to_string(), capture: capture.to_string() };
    match template {
        Template::Delete | Template::Token(_) => Ok(()),
        Template::Capture(name) | Template::Splice(name) => {
            if meta.captures.contains(name) { Ok(()) } else { Err(dangling(name.as_str())) }
        }
        Template::Leaf { text, .. } => {
            for name in text.iter().flat_map(|t| super::template::placeholders(t)) {
                if !meta.captures.contains(name) && !meta.holes.contains(name) {
                    return Err(dangling(name));
                }
            }
            Ok(())
        }
        Template::Node { children, .. } | Template::Seq(children) => {
            children.iter().try_for_each(|t| check_template(rule, t, meta))
        }
        Template::Field(_, inner) => check_template(rule, inner, meta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pattern, Rule, Template};

    fn flag_call() -> Pattern {
        node!("call_expression", [Pattern::Any, Pattern::Any]).capture("call")
    }

    #[test]
    fn indexes_rules_by_root_kind() {
        let graph = RuleGraph::new([
            Rule::new("a", flag_call(), Template::leaf("true")),
            Rule::new("b", Pattern::text("x"), Template::Delete),
        ])
        .unwrap();
        assert_eq!(graph.index.by_kind["call_expression"], vec![0]);
        assert_eq!(graph.index.always_on, vec![1]);
        assert_eq!(graph.metas[1].required_texts, ["x"]);
    }

    #[test]
    fn successors_resolve_in_declaration_order() {
        let graph = RuleGraph::new([
            Rule::new("seed", flag_call(), Template::leaf("true"))
                .then("second", "call", EdgeScope::Parent)
                .then("first", "call", EdgeScope::Node),
            Rule::new("first", Pattern::Any, Template::Delete).seeded(),
            Rule::new("second", Pattern::Any, Template::Delete).seeded(),
        ])
        .unwrap();
        let names: Vec<&str> = graph.successors_of(0).iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["second", "first"]);
        assert_eq!(graph.size(), (3, 2));
    }

    #[test]
    fn rejects_dangling_template_capture() {
        let err = RuleGraph::new([Rule::new("r", flag_call(), Template::capture("missing"))]).unwrap_err();
        assert_eq!(err, ConfigError::DanglingCapture { rule: "r".into(), capture: "missing".into() });
    }

    #[test]
    fn rejects_unknown_successor_and_dangling_edge() {
        let err = RuleGraph::new([Rule::new("r", flag_call(), Template::Delete).then("nope", "call", EdgeScope::Node)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSuccessor { .. }));

        let err = RuleGraph::new([Rule::new("r", flag_call(), Template::Delete).then("r", "other", EdgeScope::Node)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DanglingEdgeCapture { .. }));
    }

    #[test]
    fn rejects_captures_inside_repeat_and_stray_repeat() {
        let pattern = Pattern::Seq(vec![Pattern::Any.capture("x").repeat()]);
        let err = RuleGraph::new([Rule::new("r", pattern, Template::Delete)]).unwrap_err();
        assert!(matches!(err, ConfigError::CaptureInRepeat { .. }));

        let err = RuleGraph::new([Rule::new("r", Pattern::Any.repeat(), Template::Delete)]).unwrap_err();
        assert!(matches!(err, ConfigError::MisplacedRepeat { .. }));
    }

    #[test]
    fn captures_under_not_are_not_bound() {
        let pattern = Pattern::Not(Box::new(Pattern::Any.capture("x")));
        let err = RuleGraph::new([Rule::new("r", pattern, Template::capture("x"))]).unwrap_err();
        assert!(matches!(err, ConfigError::DanglingCapture { .. }));
    }

    #[test]
    fn seeded_rules_need_a_predecessor_that_binds_their_holes() {
        let err = RuleGraph::new([Rule::new("lonely", Pattern::Any, Template::Delete).seeded()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnreachableRule { .. }));

        let graph = RuleGraph::new([
            Rule::new("seed", flag_call(), Template::Delete).then("use", "call", EdgeScope::Global),
            Rule::new("use", Pattern::hole("var"), Template::Delete).seeded(),
        ])
        .unwrap();
        let err = graph.check_substitutions(|_| false).unwrap_err();
        assert_eq!(err, ConfigError::UnboundHole { rule: "use".into(), hole: "var".into() });
        assert!(graph.check_substitutions(|name| name == "var").is_ok());
    }

    #[test]
    fn forward_rules_are_flattened_into_their_predecessors() {
        let graph = RuleGraph::new([
            Rule::new("seed", flag_call(), Template::Delete).then("junction", "call", EdgeScope::Node),
            Rule::forward("junction")
                .then("first", "call", EdgeScope::Parent)
                .then("second", "call", EdgeScope::Global),
            Rule::new("first", Pattern::Any, Template::Delete).seeded(),
            Rule::new("second", Pattern::hole("call"), Template::Delete).seeded(),
        ])
        .unwrap();

        let names: Vec<&str> = graph.successors_of(0).iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(graph.edges_of(0)[0].scope, EdgeScope::Parent);
        assert!(graph.index.always_on.iter().all(|&id| id != 1));
        assert!(graph.check_substitutions(|_| false).is_ok());
    }

    #[test]
    fn forward_edges_need_the_predecessor_capture_and_no_cycles() {
        let err = RuleGraph::new([
            Rule::new("seed", flag_call(), Template::Delete).then("junction", "call", EdgeScope::Node),
            Rule::forward("junction").then("use", "other", EdgeScope::Node),
            Rule::new("use", Pattern::Any, Template::Delete).seeded(),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DanglingEdgeCapture { rule: "seed".into(), successor: "use".into(), capture: "other".into() }
        );

        let err = RuleGraph::new([
            Rule::new("seed", flag_call(), Template::Delete).then("a", "call", EdgeScope::Node),
            Rule::forward("a").then("b", "call", EdgeScope::Node),
            Rule::forward("b").then("a", "call", EdgeScope::Node),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::ForwardCycle { .. }));

        let err = RuleGraph::new([Rule::forward("alone")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnreachableRule { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = RuleGraph::new([
            Rule::new("r", Pattern::Any, Template::Delete),
            Rule::new("r", Pattern::Any, Template::Delete),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateRule("r".into()));
    }
}
