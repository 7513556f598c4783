//! Ready-made rule sets.
//!
//! Each set is a plain list of [`Rule`](crate::Rule)s, so it can be
//! registered next to hand-written rules in one [`RuleGraph`](crate::RuleGraph)
//! (rule documents do this through their `flags` section).

pub mod flags;

pub use flags::FlagCleanup;
