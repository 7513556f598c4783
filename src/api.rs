use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::engine::{self, RuleGraph};
use crate::error::{ConfigError, RewriteError};
use crate::profile::LanguageProfile;
use crate::tree::{Node, Span};

/// What the engine knows about the code being rewritten.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Which node kinds play which role for the simplifier.
    pub profile: LanguageProfile,
    /// Values for rule holes no edge binds (for example the flag name).
    pub substitutions: BTreeMap<String, String>,
}

impl Context {
    pub fn with_profile(profile: LanguageProfile) -> Self {
        Context { profile, substitutions: BTreeMap::new() }
    }

    pub fn substitute(mut self, hole: &str, value: &str) -> Self {
        self.substitutions.insert(hole.to_string(), value.to_string());
        self
    }
}

/// Run limits and reporting switches.
#[derive(Debug, Clone)]
pub struct Options {
    /// Scan/rewrite iterations before the run is cut short.
    pub max_iterations: usize,
    /// Wall-clock limit, checked before each rewriting phase.
    pub deadline: Option<Instant>,
    /// Keep per-pass change lists in [`RewriteResult::details`].
    pub collect_details: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { max_iterations: 100, deadline: None, collect_details: false }
    }
}

/// One entry of the change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Rule name, or the simplifier step (`fold_boolean`, `prune_branch`,
    /// `remove_unreachable`, `remove_unused_binding`).
    pub rule: String,
    /// Span of the node that was replaced or deleted.
    pub original: Span,
    /// Span covered by the replacement; `None` for a deletion.
    pub replacement: Option<Span>,
}

/// How a run ended. Running out of budget is not an error: the tree is
/// whatever the last completed rewrite produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Converged { iterations: usize },
    BudgetExhausted { iterations: usize, diagnostic: String },
}

impl Outcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, Outcome::Converged { .. })
    }

    pub fn iterations(&self) -> usize {
        match self {
            Outcome::Converged { iterations } | Outcome::BudgetExhausted { iterations, .. } => *iterations,
        }
    }
}

/// A compact per-pass trace.
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub pass: usize,
    pub duration: Duration,
    /// Global rules the trigger scan left active.
    pub active_rules: usize,
    /// Seeds consumed by the scan.
    pub seeds: usize,
    pub matches: usize,
    pub applied: usize,
    pub discarded: usize,
    pub simplified: usize,
    pub changes: Vec<Change>,
}

/// Extra details returned when [`Options::collect_details`] is set.
#[derive(Debug, Clone)]
pub struct RewriteDetails {
    pub total: Duration,
    /// Time spent in the dead-code simplifier.
    pub simplify: Duration,
    pub passes: Vec<PassSummary>,
    /// Rules and edges of the graph used.
    pub rules: usize,
    pub edges: usize,
}

#[derive(Debug, Clone)]
pub struct RewriteResult {
    /// Root of the final revision.
    pub tree: Arc<Node>,
    /// Number of the final revision (0 when nothing changed).
    pub revision: usize,
    pub changes: Vec<Change>,
    pub outcome: Outcome,
    pub elapsed: Duration,
    pub details: Option<RewriteDetails>,
}

/// A validated rule graph bound to a context, ready to rewrite any number of
/// trees.
#[derive(Debug)]
pub struct Engine<'g> {
    graph: &'g RuleGraph,
    context: Context,
    options: Options,
}

impl<'g> Engine<'g> {
    /// Check that the graph is validated and that every hole no edge binds
    /// has a substitution.
    pub fn new(graph: &'g RuleGraph, context: Context, options: Options) -> Result<Self, ConfigError> {
        if !graph.is_validated() {
            return Err(ConfigError::Unvalidated);
        }
        graph.check_substitutions(|hole| context.substitutions.contains_key(hole))?;
        Ok(Engine { graph, context, options })
    }

    pub fn rewrite(&self, root: Arc<Node>) -> RewriteResult {
        let run = engine::Driver::new(self.graph, &self.context, &self.options).run(root);
        self.finish(run)
    }

    fn finish(&self, run: engine::Fixpoint) -> RewriteResult {
        let details = self.options.collect_details.then(|| {
            let (rules, edges) = self.graph.size();
            RewriteDetails {
                total: run.metrics.total,
                simplify: run.metrics.simplify,
                passes: run
                    .metrics
                    .iterations
                    .iter()
                    .enumerate()
                    .map(|(idx, pass)| PassSummary {
                        pass: idx + 1,
                        duration: pass.duration,
                        active_rules: pass.active_rules,
                        seeds: pass.seeds,
                        matches: pass.matches,
                        applied: pass.applied,
                        discarded: pass.discarded,
                        simplified: pass.simplified,
                        changes: pass.changes.clone(),
                    })
                    .collect(),
                rules,
                edges,
            }
        });

        RewriteResult {
            tree: run.revision.root,
            revision: run.revision.number,
            changes: run.changes,
            outcome: run.outcome,
            elapsed: run.metrics.total,
            details,
        }
    }
}

/// Rewrite one tree.
///
/// # Example
/// ```
/// use flagsweep::{Context, Options, Pattern, Rule, RuleGraph, Template, rewrite, sexp};
///
/// let graph = RuleGraph::new([Rule::new("drop_x", Pattern::text("x"), Template::Delete)]).unwrap();
/// let tree = sexp::parse(r#"(list (id = "x") "," (id = "y"))"#).unwrap();
/// let out = rewrite(&graph, tree, Context::default(), Options::default()).unwrap();
/// assert_eq!(out.tree.render(), "y");
/// ```
pub fn rewrite(
    graph: &RuleGraph,
    root: Arc<Node>,
    context: Context,
    options: Options,
) -> Result<RewriteResult, ConfigError> {
    Ok(Engine::new(graph, context, options)?.rewrite(root))
}

/// Rewrite many trees in parallel with one shared graph.
///
/// Each tree is processed independently; a fault in one (a panic in a
/// pathological pattern, say) is reported in its own slot and does not
/// affect the others.
pub fn rewrite_batch(
    graph: &RuleGraph,
    roots: Vec<Arc<Node>>,
    context: Context,
    options: Options,
) -> Result<Vec<Result<RewriteResult, RewriteError>>, ConfigError> {
    let engine = Engine::new(graph, context, options)?;
    let start = Instant::now();
    let results: Vec<_> = roots
        .into_par_iter()
        .enumerate()
        .map(|(index, root)| {
            catch_unwind(AssertUnwindSafe(|| engine.rewrite(root))).map_err(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let err = RewriteError::Aborted { index, message };
                warn!(%err, "file skipped");
                err
            })
        })
        .collect();
    info!(files = results.len(), elapsed = ?start.elapsed(), "batch finished");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdgeScope, Pattern, Rule, Template, sexp};
    use pretty_assertions::assert_eq;

    fn flag_graph() -> RuleGraph {
        RuleGraph::new([Rule::new(
            "flag_call",
            node!("call_expression", [Pattern::hole("flag")]),
            Template::leaf("true"),
        )])
        .unwrap()
    }

    #[test]
    fn engine_demands_substitutions_for_free_holes() {
        let graph = flag_graph();
        let err = Engine::new(&graph, Context::default(), Options::default()).unwrap_err();
        assert_eq!(err, ConfigError::UnboundHole { rule: "flag_call".into(), hole: "flag".into() });
        assert!(Engine::new(&graph, Context::default().substitute("flag", "stale"), Options::default()).is_ok());
    }

    #[test]
    fn rewrite_reports_changes_and_outcome() {
        let graph = flag_graph();
        let tree = sexp::parse(
            r#"(block (if_statement "if" condition: (call_expression (identifier = "stale")) consequence: (block "{" (call_expression (identifier = "a")) "}")))"#,
        )
        .unwrap();
        let options = Options { collect_details: true, ..Options::default() };
        let out = rewrite(&graph, tree, Context::default().substitute("flag", "stale"), options).unwrap();

        assert_eq!(out.tree.render(), "a");
        assert_eq!(out.outcome, Outcome::Converged { iterations: 1 });
        let rules: Vec<&str> = out.changes.iter().map(|c| c.rule.as_str()).collect();
        assert_eq!(rules, ["flag_call", "prune_branch"]);
        let details = out.details.unwrap();
        assert_eq!(details.passes.len(), 2);
        assert_eq!(details.passes[0].applied, 1);
        assert_eq!(details.passes[0].simplified, 1);
        assert_eq!((details.rules, details.edges), (1, 0));
    }

    #[test]
    fn unvalidated_graph_is_rejected() {
        let mut graph = flag_graph();
        graph
            .register(Rule::new("more", Pattern::kind("x"), Template::Delete).then("flag_call", "x", EdgeScope::Node))
            .unwrap_err();
        graph.register(Rule::new("more", Pattern::kind("x"), Template::Delete)).unwrap();
        let err = Engine::new(&graph, Context::default().substitute("flag", "f"), Options::default()).unwrap_err();
        assert_eq!(err, ConfigError::Unvalidated);
        graph.validate().unwrap();
        assert!(Engine::new(&graph, Context::default().substitute("flag", "f"), Options::default()).is_ok());
    }

    #[test]
    fn batch_results_are_independent_and_ordered() {
        let graph = RuleGraph::new([Rule::new("drop_b", Pattern::text("b"), Template::Delete)]).unwrap();
        let trees = vec![
            sexp::parse(r#"(list (id = "a") "," (id = "b"))"#).unwrap(),
            sexp::parse(r#"(list (id = "c"))"#).unwrap(),
            sexp::parse(r#"(list (id = "b") "," (id = "d"))"#).unwrap(),
        ];
        let out = rewrite_batch(&graph, trees, Context::default(), Options::default()).unwrap();
        let rendered: Vec<String> = out.into_iter().map(|r| r.unwrap().tree.render()).collect();
        assert_eq!(rendered, ["a", "c", "d"]);
    }
}
