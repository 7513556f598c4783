//! Fixpoint driver: the scan / rewrite loop.
//!
//! This module is the operational core of the engine. One iteration is:
//!
//! ```text
//! (0) trigger scan     -> kinds, texts, traits; active global rules
//! (1) Scanning         -> pre-order walk, every match collected first
//!                         (global rules, global-edge instances, seeds)
//! (2) budget check     -> iteration cap / deadline, else BudgetExhausted
//! (3) Rewriting        -> outermost first, claimed subtrees discarded,
//!                         one rebuild -> next Revision
//! (4) Simplifier       -> only when a constant replaced a non-constant
//! ```
//!
//! and the loop ends when a scan finds nothing (`Converged`).
//!
//! ## Seeds and instances
//!
//! When a rule fires, each of its successor edges makes the successor eligible
//! somewhere. `node`, `parent` and `enclosing` edges produce a [`Seed`]: a
//! one-shot event consumed by the next scan. `global` edges produce an
//! [`Instance`]: the successor becomes eligible everywhere for the rest of the
//! run, carrying the predecessor's captured texts for its holes.
//!
//! ```text
//! replace_flag_call ──parent──▶ bind_flag_variable ──enclosing──▶ inline_flag_variable
//!   exp.BoolValue("f")          x := true                          x  (uses in the block)
//! ```
//!
//! A seed whose target node was replaced follows the replacement (its first
//! node), or the parent when the node was deleted.
//!
//! An `enclosing` seed whose captured node is an identifier follows lexical
//! scope: from the first statement that declares or assigns that name again,
//! the rest of the block is out of its reach.
//!
//! ```text
//! { enabled, err := true, nil     <- seeds for `enabled` and `err`
//!   if err != nil { .. }          <- err reached
//!   s, err := exp.StrValue(..)    <- err rebound: region ends here
//!   if err != nil { .. }          <- err not reached
//! }
//! ```
//!
//! ## Determinism
//!
//! Candidates at one node are tried in declaration order and the first match
//! wins; the other matching rules are logged at debug level. Matches are
//! applied in pre-order, so an ancestor's rewrite always wins over its
//! descendants'.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use super::compiled_rules::{RuleGraph, RuleId};
use super::dedup::FireMarks;
use super::matcher::{Bindings, Tags, match_node, scope_allows};
use super::metrics::{PassMetrics, RunMetrics};
use super::template::instantiate;
use super::trigger::TriggerInfo;
use crate::api::{Change, Context, Options, Outcome};
use crate::error::RewriteError;
use crate::simplify::{Baseline, Simplifier};
use crate::tree::{Node, NodeId, Revision, Span, rebuild};
use crate::EdgeScope;

/// One-shot eligibility of a rule at a node, consumed by the next scan.
#[derive(Debug, Clone)]
pub(crate) struct Seed {
    rule: RuleId,
    target: NodeId,
    scope: EdgeScope,
    tags: Tags,
    /// Identifier text the captured node binds. An `enclosing` seed stops
    /// applying after a statement that declares or assigns it again.
    binding: Option<String>,
    /// Where the seed moves if `target` does not survive the rewrite.
    fallback: Option<NodeId>,
}

/// Run-long eligibility of a rule everywhere, with carried values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Instance {
    rule: RuleId,
    tags: Tags,
}

/// A match found by the scan, with everything the rewrite needs already
/// computed (bindings do not outlive the scanned revision).
#[derive(Debug)]
struct Found {
    rule: RuleId,
    node: Arc<Node>,
    /// Ids of the ancestors, outermost first.
    path: Vec<NodeId>,
    replacement: Vec<Arc<Node>>,
    seeds: Vec<Seed>,
    instances: Vec<Instance>,
    origin: Option<Seed>,
}

/// Everything the loop produced.
#[derive(Debug)]
pub(crate) struct Fixpoint {
    pub(crate) revision: Revision,
    pub(crate) changes: Vec<Change>,
    pub(crate) outcome: Outcome,
    pub(crate) metrics: RunMetrics,
}

/// Seeds sorted by where they apply, for one scan.
#[derive(Default)]
struct Pending {
    at_node: HashMap<NodeId, Vec<Seed>>,
    enclosing: HashMap<NodeId, Vec<Seed>>,
    consumed: usize,
}

/// Candidate rule at one node of the walk.
struct Candidate<'s> {
    rule: RuleId,
    tags: &'s Tags,
    origin: Option<&'s Seed>,
}

pub(crate) struct Driver<'g> {
    graph: &'g RuleGraph,
    context: &'g Context,
    options: &'g Options,
    substitutions: Tags,
    marks: FireMarks,
    seeds: Vec<Seed>,
    instances: Vec<Instance>,
    pure_texts: HashSet<String>,
}

impl<'g> Driver<'g> {
    pub(crate) fn new(graph: &'g RuleGraph, context: &'g Context, options: &'g Options) -> Self {
        let substitutions: Tags = context.substitutions.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Driver {
            graph,
            context,
            options,
            substitutions,
            marks: FireMarks::default(),
            seeds: Vec::new(),
            instances: Vec::new(),
            pure_texts: HashSet::new(),
        }
    }

    pub(crate) fn run(mut self, root: Arc<Node>) -> Fixpoint {
        let total_start = Instant::now();
        let context = self.context;
        let profile = &context.profile;
        let baseline = Baseline::of(&root, profile);
        let mut revision = Revision::initial(root);
        let mut changes = Vec::new();
        let mut metrics = RunMetrics::default();
        let mut iterations = 0;

        let outcome = loop {
            let pass_start = Instant::now();
            let info = TriggerInfo::scan(&revision.root, profile);
            let active = info.active_rules(self.graph);
            let pending = self.take_seeds(&revision.root);
            let found = self.scan(&revision.root, &active, &info, &pending);
            let mut pass = PassMetrics {
                active_rules: active.len(),
                seeds: pending.consumed,
                matches: found.len(),
                ..PassMetrics::default()
            };
            debug!(
                revision = revision.number,
                active = active.len(),
                seeds = pending.consumed,
                matches = found.len(),
                traits = ?info.traits,
                "scan"
            );

            if found.is_empty() {
                pass.duration = pass_start.elapsed();
                metrics.iterations.push(pass);
                break Outcome::Converged { iterations };
            }

            if let Some(diagnostic) = self.budget_exhausted(iterations) {
                warn!(iterations, %diagnostic, "rewrite budget exhausted");
                pass.duration = pass_start.elapsed();
                metrics.iterations.push(pass);
                break Outcome::BudgetExhausted { iterations, diagnostic };
            }

            let (next, mut pass_changes, wake) = self.rewrite(&revision, found, &mut pass);
            revision = next;

            if wake {
                let simplify_start = Instant::now();
                let simplifier = Simplifier::new(profile, &self.pure_texts, &baseline);
                if let Some((root, simplified)) = simplifier.run(&revision.root) {
                    debug!(revision = revision.number + 1, changes = simplified.len(), "simplified");
                    pass.simplified = simplified.len();
                    pass_changes.extend(simplified);
                    revision = revision.next(root);
                }
                metrics.simplify += simplify_start.elapsed();
            }
            self.relocate_seeds(&revision.root);

            iterations += 1;
            pass.duration = pass_start.elapsed();
            if self.options.collect_details {
                pass.changes = pass_changes.clone();
            }
            metrics.iterations.push(pass);
            changes.extend(pass_changes);
        };

        metrics.total = total_start.elapsed();
        debug!(
            fired = self.marks.len(),
            applied = metrics.applied(),
            simplified = metrics.simplified(),
            ?outcome,
            "run finished"
        );
        Fixpoint { revision, changes, outcome, metrics }
    }

    fn budget_exhausted(&self, iterations: usize) -> Option<String> {
        if iterations >= self.options.max_iterations {
            return Some(format!("iteration cap of {} reached with matches still pending", self.options.max_iterations));
        }
        match self.options.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(format!("deadline passed after {iterations} iterations with matches still pending"))
            }
            _ => None,
        }
    }

    /// Turn the queued seeds into per-node candidates for this scan.
    ///
    /// `parent` seeds are settled here: the captured node, then each ancestor,
    /// nearest first, until the rule matches.
    fn take_seeds(&mut self, root: &Arc<Node>) -> Pending {
        let mut pending = Pending::default();
        for seed in std::mem::take(&mut self.seeds) {
            pending.consumed += 1;
            let rule = self.graph.rule(seed.rule);
            let Some(path) = root.path_to(seed.target) else {
                debug!(rule = %rule.name, "seed target vanished");
                continue;
            };
            let slot = match &seed.scope {
                // Global edges register instances and never queue a seed.
                EdgeScope::Node | EdgeScope::Global => Some((&mut pending.at_node, seed.target)),
                EdgeScope::Parent => {
                    let hit = (0..path.len()).rev().find(|&i| {
                        let node = path[i];
                        !self.marks.has_fired(seed.rule, node.id())
                            && match_node(&rule.pattern, node, &seed.tags).is_some()
                            && scope_allows(rule.scope.as_ref(), node, &path[..i], &seed.tags)
                    });
                    if hit.is_none() {
                        debug!(rule = %rule.name, "no ancestor matched parent seed");
                    }
                    hit.map(|i| (&mut pending.at_node, path[i].id()))
                }
                EdgeScope::Enclosing(kind) => {
                    let scope_root = path.iter().rev().find(|n| n.kind() == kind);
                    if scope_root.is_none() {
                        debug!(rule = %rule.name, %kind, "no enclosing node for seed");
                    }
                    scope_root.map(|n| (&mut pending.enclosing, n.id()))
                }
            };
            if let Some((map, id)) = slot {
                map.entry(id).or_default().push(seed);
            }
        }
        pending
    }

    fn scan(&self, root: &Arc<Node>, active: &[RuleId], info: &TriggerInfo, pending: &Pending) -> Vec<Found> {
        let instances: Vec<&Instance> =
            self.instances.iter().filter(|i| info.admits(&self.graph.metas[i.rule])).collect();
        let mut walk = Walk {
            driver: self,
            active,
            instances: &instances,
            pending,
            ancestors: Vec::new(),
            enclosing: Vec::new(),
            found: Vec::new(),
        };
        walk.visit(root);
        walk.found
    }

    fn rewrite(&mut self, revision: &Revision, found: Vec<Found>, pass: &mut PassMetrics) -> (Revision, Vec<Change>, bool) {
        let context = self.context;
        let profile = &context.profile;
        let mut claimed: HashSet<NodeId> = HashSet::new();
        let mut edits: HashMap<NodeId, Vec<Arc<Node>>> = HashMap::new();
        let mut changes = Vec::new();
        let mut wake = false;

        for f in found {
            let rule = self.graph.rule(f.rule);
            if claimed.contains(&f.node.id()) || f.path.iter().any(|id| claimed.contains(id)) {
                trace!(rule = %rule.name, span = %f.node.span(), "discarded inside a claimed subtree");
                pass.discarded += 1;
                self.seeds.extend(f.origin);
                continue;
            }
            if f.path.is_empty() && f.replacement.len() != 1 {
                let err = RewriteError::RootNotSingle { rule: rule.name.clone(), produced: f.replacement.len() };
                warn!(%err, "skipping rewrite");
                self.marks.mark(f.rule, f.node.id());
                pass.discarded += 1;
                continue;
            }

            self.marks.mark(f.rule, f.node.id());
            pass.applied += 1;
            if rule.pure {
                self.pure_texts.insert(f.node.render());
            }

            let identity = f.replacement.len() == 1 && Arc::ptr_eq(&f.replacement[0], &f.node);
            if !identity {
                claimed.insert(f.node.id());
                wake |= !profile.is_constant(&f.node) && f.replacement.iter().any(|n| profile.is_constant(n));
                changes.push(Change {
                    rule: rule.name.clone(),
                    original: f.node.span(),
                    replacement: Span::covering(&f.replacement),
                });
                edits.insert(f.node.id(), f.replacement.clone());
            }

            let fallback = f.replacement.first().map(|n| n.id()).or_else(|| f.path.last().copied());
            for mut seed in f.seeds {
                debug!(from = %rule.name, to = %self.graph.rule(seed.rule).name, scope = ?seed.scope, "seed");
                if !identity {
                    seed.fallback = fallback;
                }
                self.seeds.push(seed);
            }
            for instance in f.instances {
                if !self.instances.contains(&instance) {
                    debug!(from = %rule.name, to = %self.graph.rule(instance.rule).name, tags = ?instance.tags, "global instance");
                    self.instances.push(instance);
                }
            }
        }

        if edits.is_empty() {
            return (revision.clone(), changes, false);
        }
        let rebuilt = rebuild(&revision.root, &edits, &profile.separators);
        match <[Arc<Node>; 1]>::try_from(rebuilt) {
            Ok([root]) => (revision.next(root), changes, wake),
            // Unreachable: root replacements of any other arity are skipped above.
            Err(_) => (revision.clone(), Vec::new(), false),
        }
    }

    /// Point seeds whose target vanished at their fallback; drop the rest.
    fn relocate_seeds(&mut self, root: &Arc<Node>) {
        let mut live = HashSet::new();
        root.walk(&mut |n| {
            live.insert(n.id());
        });
        self.seeds.retain_mut(|seed| {
            if live.contains(&seed.target) {
                return true;
            }
            match seed.fallback.take().filter(|id| live.contains(id)) {
                Some(id) => {
                    seed.target = id;
                    true
                }
                None => false,
            }
        });
    }

    /// Values a successor instance carries: substitutions, then what the
    /// predecessor carried, then the predecessor's captures (rendered).
    fn carried(&self, inherited: &Tags, bindings: &Bindings) -> Tags {
        let mut tags = self.substitutions.clone();
        tags.extend(inherited.iter().map(|(k, v)| (k.clone(), v.clone())));
        tags.extend(bindings.iter().map(|(k, n)| (k.clone(), n.render())));
        tags
    }
}

/// Pre-order walk state for one scan.
struct Walk<'s, 'g, 't> {
    driver: &'s Driver<'g>,
    active: &'s [RuleId],
    instances: &'s [&'s Instance],
    pending: &'s Pending,
    ancestors: Vec<&'t Arc<Node>>,
    /// Seeds made eligible by an `enclosing` edge on some ancestor.
    enclosing: Vec<&'s Seed>,
    found: Vec<Found>,
}

impl<'s, 't> Walk<'s, '_, 't> {
    fn visit(&mut self, node: &'t Arc<Node>) {
        let pending = self.pending;
        let entry = self.enclosing.clone();
        if let Some(list) = pending.enclosing.get(&node.id()) {
            self.enclosing.extend(list.iter());
        }

        if let Some(found) = self.try_node(node) {
            self.found.push(found);
        }

        self.ancestors.push(node);
        for child in node.children() {
            self.end_rebound(child);
            self.visit(child);
        }
        self.ancestors.pop();
        self.enclosing = entry;
    }

    /// Drop enclosing seeds whose name `statement` declares or assigns again,
    /// for the rest of the current node. The statement that holds the
    /// captured name itself does not count.
    fn end_rebound(&mut self, statement: &Arc<Node>) {
        if self.enclosing.iter().all(|s| s.binding.is_none()) {
            return;
        }
        let Some(names) = self.driver.context.profile.rebound_names(statement) else {
            return;
        };
        self.enclosing.retain(|seed| match &seed.binding {
            Some(name) if names.contains(&name.as_str()) => {
                let own = statement.path_to(seed.target).is_some();
                if !own {
                    trace!(name = %name, span = %statement.span(), "name rebound; seed region ends");
                }
                own
            }
            _ => true,
        });
    }

    fn candidates(&self, node: &Node) -> Vec<Candidate<'s>> {
        let driver = self.driver;
        let graph = driver.graph;
        let fits = |id: RuleId| graph.metas[id].root_kind.as_deref().is_none_or(|k| k == node.kind());
        let mut candidates: Vec<Candidate<'s>> = Vec::new();

        for &rule in self.active.iter().filter(|&&id| fits(id)) {
            candidates.push(Candidate { rule, tags: &driver.substitutions, origin: None });
        }
        for &instance in self.instances.iter().filter(|i| fits(i.rule)) {
            candidates.push(Candidate { rule: instance.rule, tags: &instance.tags, origin: None });
        }
        let seeded = self.pending.at_node.get(&node.id()).into_iter().flatten();
        for seed in seeded.chain(self.enclosing.iter().copied()).filter(|s| fits(s.rule)) {
            candidates.push(Candidate { rule: seed.rule, tags: &seed.tags, origin: Some(seed) });
        }
        candidates.sort_by_key(|c| c.rule);
        candidates
    }

    fn try_node(&self, node: &'t Arc<Node>) -> Option<Found> {
        let graph = self.driver.graph;
        let candidates = self.candidates(node);
        let mut winner: Option<(&Candidate<'s>, Bindings<'t>)> = None;
        let mut also: Vec<&str> = Vec::new();

        for candidate in &candidates {
            if self.driver.marks.has_fired(candidate.rule, node.id()) {
                continue;
            }
            let rule = graph.rule(candidate.rule);
            let Some(bindings) = match_node(&rule.pattern, node, candidate.tags) else {
                continue;
            };
            if !scope_allows(rule.scope.as_ref(), node, &self.ancestors, candidate.tags) {
                continue;
            }
            if let Some((first, _)) = &winner {
                if first.rule != candidate.rule && !also.contains(&rule.name.as_str()) {
                    also.push(&rule.name);
                }
                continue;
            }
            winner = Some((candidate, bindings));
            if !tracing::enabled!(tracing::Level::DEBUG) {
                break;
            }
        }

        let (candidate, bindings) = winner?;
        let rule = graph.rule(candidate.rule);
        if !also.is_empty() {
            debug!(chosen = %rule.name, shadowed = ?also, span = %node.span(), "several rules match; first declared wins");
        }
        trace!(rule = %rule.name, span = %node.span(), text = %node.render(), "match");

        let replacement = instantiate(&rule.replacement, &bindings, candidate.tags, node);
        let mut seeds = Vec::new();
        let mut instances = Vec::new();
        for edge in graph.edges_of(candidate.rule) {
            let Some(captured) = bindings.get(&edge.capture) else {
                continue;
            };
            let tags = self.driver.carried(candidate.tags, &bindings);
            let profile = &self.driver.context.profile;
            match &edge.scope {
                EdgeScope::Global => instances.push(Instance { rule: edge.to, tags }),
                scope => seeds.push(Seed {
                    rule: edge.to,
                    target: captured.id(),
                    scope: scope.clone(),
                    tags,
                    binding: profile.is_identifier(captured).then(|| captured.leaf_text().to_string()),
                    fallback: None,
                }),
            }
        }

        Some(Found {
            rule: candidate.rule,
            node: Arc::clone(node),
            path: self.ancestors.iter().map(|a| a.id()).collect(),
            replacement,
            seeds,
            instances,
            origin: candidate.origin.cloned(),
        })
    }
}
