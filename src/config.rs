//! JSON rule documents.
//!
//! A document is a list of rules plus an optional language profile and
//! substitutions. Patterns and templates have a short string form for the
//! common leaves and an object form for everything else:
//!
//! ```text
//! pattern   "_"            any node
//!           "@name"        capture any node
//!           "..."          zero or more children (sequence item only)
//!           "text"         literal text
//!           { "kind", "field", "text", "regex", "hole", "children",
//!             "unordered", "contains", "not", "all", "capture" }
//!           { "repeat": pattern }
//!
//! template  "delete"       remove the match
//!           "@name"        the captured node
//!           "token"        an anonymous token
//!           { "kind", "text", "children", "field" } | { "capture" }
//!           { "splice" } | { "token" } | { "seq": [...] }
//! ```
//!
//! A rule with `"forward": true` has neither pattern nor template: it only
//! names a junction, and edges into it continue along its `successors`.
//!
//! Documents are converted into a validated [`RuleGraph`]; every error is a
//! [`ConfigError`] naming the rule.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::api::Context;
use crate::engine::RuleGraph;
use crate::error::{ConfigError, Error};
use crate::profile::LanguageProfile;
use crate::rules::FlagCleanup;
use crate::tree::Node;
use crate::{EdgeScope, Pattern, Rule, ScopeConstraint, Successor, Template, Trigger, sexp};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDocument {
    #[serde(default)]
    pub profile: Option<LanguageProfile>,
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,
    /// Built-in flag rule sets, registered before `rules`.
    #[serde(default)]
    pub flags: Vec<FlagCleanup>,
    #[serde(default)]
    pub rules: Vec<RuleDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDoc {
    pub name: String,
    #[serde(default)]
    pub pattern: Option<PatternDoc>,
    #[serde(default)]
    pub replace: Option<TemplateDoc>,
    /// No pattern of its own; edges into it continue along `successors`.
    #[serde(default)]
    pub forward: bool,
    #[serde(default)]
    pub scope: Option<ScopeDoc>,
    #[serde(default)]
    pub successors: Vec<SuccessorDoc>,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub pure: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PatternDoc {
    Short(String),
    Node(Box<PatternNode>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternNode {
    pub kind: Option<String>,
    pub field: Option<String>,
    pub text: Option<String>,
    pub regex: Option<String>,
    pub hole: Option<String>,
    pub children: Option<Vec<PatternDoc>>,
    pub unordered: Option<Vec<PatternDoc>>,
    pub contains: Option<PatternDoc>,
    pub not: Option<PatternDoc>,
    pub all: Option<Vec<PatternDoc>>,
    pub repeat: Option<PatternDoc>,
    pub capture: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TemplateDoc {
    Short(String),
    Node(Box<TemplateNode>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateNode {
    pub kind: Option<String>,
    pub text: Option<String>,
    pub children: Option<Vec<TemplateDoc>>,
    pub field: Option<String>,
    pub capture: Option<String>,
    pub splice: Option<String>,
    pub token: Option<String>,
    pub seq: Option<Vec<TemplateDoc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeDoc {
    Field(String),
    Within(PatternDoc),
    NotWithin(PatternDoc),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuccessorDoc {
    pub rule: String,
    pub capture: String,
    #[serde(default)]
    pub scope: EdgeScope,
}

/// A loaded document: the validated graph and the context to run it with.
#[derive(Debug)]
pub struct RuleSet {
    pub graph: RuleGraph,
    pub context: Context,
}

impl RuleDocument {
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Document(e.to_string()))
    }

    /// Replace the document's profile. The flag rule sets are built from the
    /// profile, so this has to happen before [`into_rule_set`].
    ///
    /// [`into_rule_set`]: RuleDocument::into_rule_set
    pub fn with_profile(mut self, profile: LanguageProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Build every rule, register them in document order and validate.
    pub fn into_rule_set(self) -> Result<RuleSet, ConfigError> {
        let profile = self.profile.unwrap_or_default();
        let mut graph = RuleGraph::default();
        for flag in &self.flags {
            for rule in flag.rules(&profile)? {
                graph.register(rule)?;
            }
        }
        for doc in self.rules {
            graph.register(doc.into_rule()?)?;
        }
        graph.validate()?;

        let (rules, edges) = graph.size();
        debug!(rules, edges, flags = self.flags.len(), "rule document loaded");
        let mut context = Context::with_profile(profile);
        context.substitutions = self.substitutions;
        Ok(RuleSet { graph, context })
    }
}

impl RuleDoc {
    fn into_rule(self) -> Result<Rule, ConfigError> {
        let name = self.name;
        let successors =
            self.successors.into_iter().map(|s| Successor { rule: s.rule, capture: s.capture, scope: s.scope }).collect();
        if self.forward {
            if self.pattern.is_some() || self.replace.is_some() || self.scope.is_some() {
                return Err(invalid(&name, "a forward rule has no pattern, replacement or scope"));
            }
            return Ok(Rule { successors, ..Rule::forward(&name) });
        }
        let (Some(pattern_doc), Some(replace_doc)) = (self.pattern, self.replace) else {
            return Err(invalid(&name, "a rule needs both 'pattern' and 'replace'"));
        };
        let scope = self
            .scope
            .map(|scope| {
                Ok::<_, ConfigError>(match scope {
                    ScopeDoc::Field(field) => ScopeConstraint::Field(field),
                    ScopeDoc::Within(p) => ScopeConstraint::Within(pattern(&name, p)?),
                    ScopeDoc::NotWithin(p) => ScopeConstraint::NotWithin(pattern(&name, p)?),
                })
            })
            .transpose()?;
        Ok(Rule {
            pattern: pattern(&name, pattern_doc)?,
            replacement: template(&name, replace_doc)?,
            scope,
            successors,
            trigger: self.trigger,
            pure: self.pure,
            forward_only: false,
            name,
        })
    }
}

fn invalid(rule: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidPattern { rule: rule.to_string(), message: message.into() }
}

fn pattern(rule: &str, doc: PatternDoc) -> Result<Pattern, ConfigError> {
    let node = match doc {
        PatternDoc::Short(s) => {
            return Ok(if s == "_" {
                Pattern::Any
            } else if s == "..." {
                Pattern::Any.repeat()
            } else if let Some(name) = s.strip_prefix('@') {
                Pattern::Any.capture(name)
            } else {
                Pattern::Text(s)
            });
        }
        PatternDoc::Node(node) => *node,
    };

    if let Some(inner) = node.repeat {
        if node.capture.is_some() || node.kind.is_some() || node.children.is_some() {
            return Err(invalid(rule, "'repeat' cannot be combined with other constraints"));
        }
        return Ok(pattern(rule, inner)?.repeat());
    }

    let list = |items: Vec<PatternDoc>| items.into_iter().map(|p| pattern(rule, p)).collect::<Result<Vec<_>, _>>();
    let mut parts = Vec::new();
    if let Some(kind) = node.kind {
        parts.push(Pattern::Kind(kind));
    }
    if let Some(field) = node.field {
        parts.push(Pattern::Field(field));
    }
    if let Some(text) = node.text {
        parts.push(Pattern::Text(text));
    }
    if let Some(source) = node.regex {
        let regex = Regex::new(&source)
            .map_err(|e| ConfigError::InvalidRegex { rule: rule.to_string(), message: e.to_string() })?;
        parts.push(Pattern::Regex(regex));
    }
    if let Some(hole) = node.hole {
        parts.push(Pattern::Hole(hole));
    }
    if let Some(children) = node.children {
        parts.push(Pattern::Seq(list(children)?));
    }
    if let Some(items) = node.unordered {
        parts.push(Pattern::Unordered(list(items)?));
    }
    if let Some(inner) = node.contains {
        parts.push(pattern(rule, inner)?.contains());
    }
    if let Some(inner) = node.not {
        parts.push(pattern(rule, inner)?.negate());
    }
    if let Some(items) = node.all {
        parts.extend(list(items)?);
    }

    let combined = match parts.len() {
        0 => Pattern::Any,
        1 => parts.remove(0),
        _ => Pattern::All(parts),
    };
    Ok(match node.capture {
        Some(name) => combined.capture(&name),
        None => combined,
    })
}

fn template(rule: &str, doc: TemplateDoc) -> Result<Template, ConfigError> {
    let node = match doc {
        TemplateDoc::Short(s) if s == "delete" => return Ok(Template::Delete),
        TemplateDoc::Short(s) => {
            return Ok(if let Some(name) = s.strip_prefix('@') { Template::capture(name) } else { Template::Token(s) });
        }
        TemplateDoc::Node(node) => *node,
    };

    let list = |items: Vec<TemplateDoc>| items.into_iter().map(|t| template(rule, t)).collect::<Result<Vec<_>, _>>();
    let shapes = [node.kind.is_some(), node.capture.is_some(), node.splice.is_some(), node.token.is_some(), node.seq.is_some()];
    if shapes.iter().filter(|&&s| s).count() != 1 {
        return Err(invalid(rule, "replacement needs exactly one of 'kind', 'capture', 'splice', 'token', 'seq'"));
    }

    let built = if let Some(kind) = node.kind {
        match node.children {
            Some(children) => Template::Node { kind, children: list(children)? },
            None => Template::Leaf { kind, text: node.text },
        }
    } else if let Some(name) = node.capture {
        Template::Capture(name)
    } else if let Some(name) = node.splice {
        Template::Splice(name)
    } else if let Some(token) = node.token {
        Template::Token(token)
    } else {
        Template::Seq(list(node.seq.unwrap_or_default())?)
    };

    Ok(match node.field {
        Some(field) => Template::Field(field, Box::new(built)),
        None => built,
    })
}

/// Parse and validate a rule document.
pub fn load_rules(json: &str) -> Result<RuleSet, ConfigError> {
    RuleDocument::parse(json)?.into_rule_set()
}

fn read(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })
}

pub fn read_document(path: &Path) -> Result<RuleDocument, Error> {
    Ok(RuleDocument::parse(&read(path)?)?)
}

/// Read a JSON language profile; missing keys take the default's values.
pub fn read_profile(path: &Path) -> Result<LanguageProfile, Error> {
    let json = read(path)?;
    serde_json::from_str(&json).map_err(|e| ConfigError::Document(format!("{}: {e}", path.display())).into())
}

/// Read a tree in S-expression form.
pub fn read_tree(path: &Path) -> Result<Arc<Node>, Error> {
    Ok(sexp::parse(&read(path)?)?)
}
