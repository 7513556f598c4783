extern crate self as flagsweep;

#[macro_use]
mod macros;
mod api;
pub mod config;
mod engine;
pub mod error;
pub mod profile;
pub mod rules;
pub mod sexp;
mod simplify;
pub mod tree;

pub use api::{Change, Context, Engine, Options, Outcome, PassSummary, RewriteDetails, RewriteResult, rewrite, rewrite_batch};
pub use engine::{RuleGraph, RuleId};
pub use error::{ConfigError, Error, RewriteError, TreeError};
pub use profile::LanguageProfile;
pub use tree::{Kind, Node, NodeId, Revision, Span};

use regex::Regex;

// --- Rule model -------------------------------------------------------------

/// A structural pattern: a closed tree of constraints evaluated against one
/// node and, through `Seq`/`Unordered`/`Contains`, its subtree.
///
/// Matching is local: nothing outside the candidate's subtree is consulted
/// (scope constraints on a [`Rule`] handle ancestry).
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Wildcard: matches any single node.
    Any,
    /// Kind equality.
    Kind(String),
    /// Literal equality against the node's rendered text.
    Text(String),
    /// Regular expression against the node's rendered text.
    Regex(Regex),
    /// The node occupies this field (role) of its parent.
    Field(String),
    /// Text equals a value carried by the seeding edge (or a substitution).
    Hole(String),
    /// Bind the matched node under a name.
    Capture(String, Box<Pattern>),
    /// Every sub-pattern matches the same node.
    All(Vec<Pattern>),
    /// The sub-pattern does not match (its captures are discarded).
    Not(Box<Pattern>),
    /// Ordered named children; items may be `Repeat`.
    Seq(Vec<Pattern>),
    /// Each sub-pattern matches a distinct named child, in any order.
    Unordered(Vec<Pattern>),
    /// Zero or more children; only meaningful as a `Seq` item.
    Repeat(Box<Pattern>),
    /// Some strict descendant matches.
    Contains(Box<Pattern>),
}

impl Pattern {
    pub fn kind(kind: &str) -> Self {
        Pattern::Kind(kind.to_string())
    }

    pub fn text(text: &str) -> Self {
        Pattern::Text(text.to_string())
    }

    pub fn field(field: &str) -> Self {
        Pattern::Field(field.to_string())
    }

    pub fn hole(name: &str) -> Self {
        Pattern::Hole(name.to_string())
    }

    pub fn capture(self, name: &str) -> Self {
        Pattern::Capture(name.to_string(), Box::new(self))
    }

    pub fn repeat(self) -> Self {
        Pattern::Repeat(Box::new(self))
    }

    pub fn negate(self) -> Self {
        Pattern::Not(Box::new(self))
    }

    pub fn contains(self) -> Self {
        Pattern::Contains(Box::new(self))
    }

    /// Conjunction with another constraint, flattening nested `All`s.
    pub fn and(self, other: Pattern) -> Self {
        match self {
            Pattern::All(mut items) => {
                items.push(other);
                Pattern::All(items)
            }
            Pattern::Any => other,
            first => Pattern::All(vec![first, other]),
        }
    }
}

/// Replacement template: a tree fragment with capture placeholders, or a
/// deletion marker.
#[derive(Debug, Clone)]
pub enum Template {
    /// Remove the matched node.
    Delete,
    /// The captured node itself.
    Capture(String),
    /// The named children of the captured node (e.g. a block's statements).
    Splice(String),
    /// A named leaf. `@name` in the text is replaced by the rendered capture
    /// (or carried value) of that name; `None` renders as the kind.
    Leaf { kind: String, text: Option<String> },
    /// An anonymous token.
    Token(String),
    /// A named interior node.
    Node { kind: String, children: Vec<Template> },
    /// Label the produced node with a field.
    Field(String, Box<Template>),
    /// Several nodes in place of one.
    Seq(Vec<Template>),
}

impl Template {
    pub fn leaf(kind: &str) -> Self {
        Template::Leaf { kind: kind.to_string(), text: None }
    }

    pub fn capture(name: &str) -> Self {
        Template::Capture(name.to_string())
    }

    pub fn splice(name: &str) -> Self {
        Template::Splice(name.to_string())
    }
}

/// Where a rule may apply, beyond its own pattern.
#[derive(Debug, Clone)]
pub enum ScopeConstraint {
    /// The node occupies this field of its parent (e.g. `condition`).
    Field(String),
    /// Some ancestor matches the pattern.
    Within(Pattern),
    /// No ancestor matches the pattern.
    NotWithin(Pattern),
}

/// Where a successor looks once its predecessor has fired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeScope {
    /// Exactly the captured node.
    #[default]
    Node,
    /// The captured node, then each ancestor, nearest first.
    Parent,
    /// Anywhere inside the nearest ancestor of this kind, for one scan.
    Enclosing(String),
    /// Anywhere, for the rest of the run.
    Global,
}

/// Rule graph edge: after the owning rule fires, `rule` becomes eligible at
/// the node bound to `capture`.
#[derive(Debug, Clone)]
pub struct Successor {
    pub rule: String,
    pub capture: String,
    pub scope: EdgeScope,
}

/// How a rule becomes eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Considered at every node of every scan, and through edges.
    #[default]
    Global,
    /// Only through an edge from a rule that fired.
    Seeded,
}

/// A rewrite rule: pattern, replacement template, optional scope constraint
/// and outgoing edges.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub pattern: Pattern,
    pub replacement: Template,
    pub scope: Option<ScopeConstraint>,
    pub successors: Vec<Successor>,
    pub trigger: Trigger,
    /// The matched expression is a side-effect-free lookup (e.g. a resolved
    /// flag read); declarations initialized by it may be removed once unused.
    pub pure: bool,
    /// Never matched: an edge into this rule continues along its own edges
    /// instead (a named junction in the graph).
    pub forward_only: bool,
}

impl Rule {
    pub fn new(name: &str, pattern: Pattern, replacement: Template) -> Self {
        Rule {
            name: name.to_string(),
            pattern,
            replacement,
            scope: None,
            successors: Vec::new(),
            trigger: Trigger::Global,
            pure: false,
            forward_only: false,
        }
    }

    /// A rule with no pattern of its own that hands every edge it receives
    /// on to its successors.
    pub fn forward(name: &str) -> Self {
        Rule { trigger: Trigger::Seeded, forward_only: true, ..Rule::new(name, Pattern::Any, Template::Delete) }
    }

    pub fn scoped(mut self, scope: ScopeConstraint) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn seeded(mut self) -> Self {
        self.trigger = Trigger::Seeded;
        self
    }

    pub fn pure(mut self) -> Self {
        self.pure = true;
        self
    }

    pub fn then(mut self, rule: &str, capture: &str, scope: EdgeScope) -> Self {
        self.successors.push(Successor { rule: rule.to_string(), capture: capture.to_string(), scope });
        self
    }
}
