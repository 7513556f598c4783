use std::path::PathBuf;

use thiserror::Error;

/// A damaged rule set. Reported before any scanning begins, since a broken
/// rule could otherwise silently mismatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate rule name '{0}'")]
    DuplicateRule(String),

    #[error("rule '{rule}': successor '{successor}' is not a registered rule")]
    UnknownSuccessor { rule: String, successor: String },

    #[error("rule '{rule}': replacement references capture '@{capture}' which the pattern never binds")]
    DanglingCapture { rule: String, capture: String },

    #[error("rule '{rule}': edge to '{successor}' seeds from capture '@{capture}' which the pattern never binds")]
    DanglingEdgeCapture { rule: String, successor: String, capture: String },

    #[error("rule '{rule}': capture '@{capture}' appears inside a repeated sub-pattern")]
    CaptureInRepeat { rule: String, capture: String },

    #[error("rule '{rule}': a repeat is only valid as an item of a child sequence")]
    MisplacedRepeat { rule: String },

    #[error("rule '{rule}': hole '@{hole}' is not bound by every predecessor edge")]
    UnboundHole { rule: String, hole: String },

    #[error("rule '{rule}': seeded-only rule has no predecessor")]
    UnreachableRule { rule: String },

    #[error("rule '{rule}': forward rules form a cycle")]
    ForwardCycle { rule: String },

    #[error("rule '{rule}': invalid regex: {message}")]
    InvalidRegex { rule: String, message: String },

    #[error("rule '{rule}': invalid pattern: {message}")]
    InvalidPattern { rule: String, message: String },

    #[error("rule graph was changed after validation")]
    Unvalidated,

    #[error("malformed rule document: {0}")]
    Document(String),
}

/// A tree document that could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed tree at byte {offset}: {message}")]
pub struct TreeError {
    pub offset: usize,
    pub message: String,
}

/// Top-level error for loading inputs from disk.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
}

/// A fault contained to one rewrite or one file. Logged and skipped; the
/// rest of the run goes on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("rule '{rule}' would replace the root with {produced} nodes")]
    RootNotSingle { rule: String, produced: usize },

    #[error("file #{index} aborted: {message}")]
    Aborted { index: usize, message: String },
}
