//! Rule-graph rewriting engine.
//!
//! This module is the entry point for the matching and rewriting machinery.
//! It is split into focused submodules under `src/engine/` while keeping the
//! public paths (`crate::RuleGraph`, `crate::RuleId`) stable.
//!
//! ## How the parts work together
//!
//! ```text
//! rules (all) ──┐
//!               │  RuleGraph::new              (compiled_rules.rs)
//!               └──────────────┬─────────────
//!                              │
//! tree ── TriggerInfo::scan ───┼─ active rules (kind index + required texts)
//!         (trigger.rs)         │
//!                              v
//!                    Driver::run (driver.rs)
//!                      - scan: match_node       (matcher.rs)
//!                      - rewrite: instantiate   (template.rs)
//!                      - fire marks             (dedup.rs)
//!                      - simplify               (crate::simplify)
//!                              │
//!                              v
//!                 final Revision + change log + RunMetrics (metrics.rs)
//! ```
//!
//! The engine rewrites to a **fixpoint**: it keeps scanning and rewriting
//! until a scan finds nothing to do, or the iteration budget runs out. Rules
//! compose through their successor edges (one rule's rewrite makes another
//! rule eligible at a captured node) and through the tree itself (a rewrite
//! can create a node another global rule matches).
//!
//! ## Responsibilities by module
//!
//! - `compiled_rules.rs`: registration, validation and the kind index.
//! - `matcher.rs`: structural pattern matching, scope constraints.
//! - `template.rs`: replacement instantiation.
//! - `trigger.rs`: per-scan inventory used to skip impossible rules.
//! - `driver.rs`: the scan/rewrite loop, seeds and global instances.
//! - `dedup.rs`: (rule, node) fire marks that keep the loop finite.
//! - `metrics.rs`: timing and counters per iteration.
//!
//! ## Debugging
//!
//! Everything is traced with `tracing`: `debug` for rule choice, seeding and
//! per-scan summaries, `trace` for every match. The binary reads its filter
//! from `FLAGSWEEP_LOG`.

#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/driver.rs"]
mod driver;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/template.rs"]
mod template;
#[cfg(test)]
#[path = "engine/tests.rs"]
mod tests;
#[path = "engine/trigger.rs"]
mod trigger;

pub use compiled_rules::{RuleGraph, RuleId};
pub(crate) use driver::{Driver, Fixpoint};
pub(crate) use trigger::{TreeTraits, tree_traits};
