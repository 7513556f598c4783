//! Engine run metrics.
//!
//! Every run records one `PassMetrics` per scan/rewrite iteration. The
//! counters are cheap and always collected; callers that want the per-pass
//! change lists ask for them through `Options::collect_details`.

use std::time::Duration;

use crate::api::Change;

#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    /// Total elapsed time for the run.
    pub total: Duration,
    /// One entry per scan (the last one is the scan that found nothing, unless
    /// the budget ran out first).
    pub iterations: Vec<PassMetrics>,
    /// Cumulative time spent in the dead-code simplifier.
    pub simplify: Duration,
}

#[derive(Debug, Default, Clone)]
pub struct PassMetrics {
    /// Scan + rewrite + simplify time for this iteration.
    pub duration: Duration,
    /// Global rules the trigger scan left active.
    pub active_rules: usize,
    /// Seeds consumed by this scan.
    pub seeds: usize,
    /// Matches the scan found.
    pub matches: usize,
    /// Matches that were rewritten.
    pub applied: usize,
    /// Matches dropped because an outer match claimed their subtree, or
    /// because the rewrite was faulty.
    pub discarded: usize,
    /// Changes made by the simplifier after the rewrite.
    pub simplified: usize,
    /// Change records of this pass (only with `collect_details`).
    pub changes: Vec<Change>,
}

impl RunMetrics {
    pub fn applied(&self) -> usize {
        self.iterations.iter().map(|p| p.applied).sum()
    }

    pub fn simplified(&self) -> usize {
        self.iterations.iter().map(|p| p.simplified).sum()
    }
}
