//! Feature-flag cleanup for tree-sitter-go shaped trees.
//!
//! Nine rules, chained by edges:
//!
//! ```text
//! replace_flag_declaration   v, err := exp.BoolValue("stale")  ->  v, err := true, nil   (global)
//!        │ enclosing block: @var, @err
//!        v
//! inline_flag_variable       if v { .. }      ->  if true { .. }   (seeded)
//! inline_flag_error          if err != nil    ->  if nil != nil    (seeded)
//!
//! replace_flag_call          exp.BoolValue("stale")  ->  true      (global, pure)
//!        │ parent: @call
//!        v
//! bind_flag_variable         v := true        (matched, kept)      (seeded)
//!        │ enclosing block: @var
//!        v
//! inline_flag_variable
//!
//! bind_flag_constant         const staleFlag = "stale"  (kept)     (global)
//!        │ global: @const
//!        v
//! flag_constant_reads        (forward only)
//!        ├── replace_flag_declaration_by_constant   exp.BoolValue(staleFlag) in v, err := ..
//!        └── replace_flag_call_by_constant          exp.BoolValue(staleFlag)
//! ```
//!
//! The call rules put the treatment value where the flag read stood. If the
//! read initialized a variable, the declaration rules hand the variable name
//! (and the error name of the two-value form) to the inline rules, which
//! replace later reads inside the declaring block until the name is bound
//! again. The simplifier then prunes the dead branches and drops the
//! declaration once its last use is gone.

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::profile::LanguageProfile;
use crate::{EdgeScope, Pattern, Rule, ScopeConstraint, Template};

const CALL: &str = "call_expression";
const FUNCTION_FIELD: &str = "function";
const ARGUMENTS_FIELD: &str = "arguments";
const DECLARATION: &str = "short_var_declaration";
const DECLARE_TOKEN: &str = ":=";
const EXPRESSION_LIST: &str = "expression_list";
const CONST_SPEC: &str = "const_spec";
const NAME_FIELD: &str = "name";
const VALUE_FIELD: &str = "value";

/// One stale flag: which API reads it, its name, and the value it is fixed to.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagCleanup {
    /// Method (or function) name of the flag read, e.g. `BoolValue`; matched
    /// against the end of the rendered callee.
    pub api: String,
    /// Flag name as written inside the string literal argument.
    pub flag: String,
    /// Value the flag is resolved to.
    pub treated: bool,
    /// Prefix for the rule names, to register several flags in one graph.
    #[serde(default)]
    pub prefix: String,
}

impl FlagCleanup {
    pub fn new(api: &str, flag: &str, treated: bool) -> Self {
        FlagCleanup { api: api.to_string(), flag: flag.to_string(), treated, prefix: String::new() }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    fn name(&self, base: &str) -> String {
        format!("{}{base}", self.prefix)
    }

    fn regex(&self, rule: &str, source: &str) -> Result<Regex, ConfigError> {
        Regex::new(source).map_err(|e| ConfigError::InvalidRegex { rule: self.name(rule), message: e.to_string() })
    }

    /// The rules, in registration order.
    pub fn rules(&self, profile: &LanguageProfile) -> Result<Vec<Rule>, ConfigError> {
        let declare = self.name("replace_flag_declaration");
        let replace = self.name("replace_flag_call");
        let bind = self.name("bind_flag_variable");
        let inline = self.name("inline_flag_variable");
        let inline_error = self.name("inline_flag_error");
        let bind_constant = self.name("bind_flag_constant");
        let constant_reads = self.name("flag_constant_reads");
        let declare_by_constant = self.name("replace_flag_declaration_by_constant");
        let replace_by_constant = self.name("replace_flag_call_by_constant");

        let literal = if self.treated { &profile.true_literal } else { &profile.false_literal };
        let callee = self.regex("replace_flag_call", &format!(r"(?:^|\s){}$", regex::escape(&self.api)))?;
        let flag_name = self.regex("replace_flag_call", &format!(r#"^["`]{}["`]$"#, regex::escape(&self.flag)))?;

        let by_name = flag_read(&callee, Pattern::Regex(flag_name.clone()));
        let by_constant = flag_read(&callee, Pattern::kind(&profile.identifier).and(Pattern::hole("const")));
        let constant = Pattern::All(vec![
            Pattern::kind(CONST_SPEC),
            Pattern::Unordered(vec![
                Pattern::field(NAME_FIELD).and(Pattern::kind(&profile.identifier)).capture("const"),
                Pattern::field(VALUE_FIELD).and(node!(EXPRESSION_LIST, [Pattern::Regex(flag_name)])),
            ]),
        ])
        .capture("spec");

        let block = EdgeScope::Enclosing(profile.local_scope.clone());
        let declared_names = Pattern::field(&profile.names_field).and(Pattern::kind(EXPRESSION_LIST));
        let variable = Pattern::kind(&profile.identifier).and(Pattern::hole("var"));
        let error = Pattern::All(vec![
            Pattern::kind(&profile.identifier),
            Pattern::hole("err"),
            Pattern::text(&profile.blank_identifier).negate(),
        ]);

        Ok(vec![
            Rule::new(&declare, two_value_read(profile, by_name.clone()), resolved_pair(profile, literal))
                .then(&inline, "var", block.clone())
                .then(&inline_error, "err", block.clone()),
            Rule::new(&replace, by_name, Template::leaf(literal)).pure().then(&bind, "call", EdgeScope::Parent),
            Rule::new(&bind, single_value(profile, literal), Template::capture("decl"))
                .seeded()
                .then(&inline, "var", block.clone()),
            Rule::new(&inline, variable, Template::leaf(literal))
                .seeded()
                .scoped(ScopeConstraint::NotWithin(declared_names.clone())),
            Rule::new(&inline_error, error, Template::leaf(&profile.nil_literal))
                .seeded()
                .scoped(ScopeConstraint::NotWithin(declared_names)),
            Rule::new(&bind_constant, constant, Template::capture("spec")).then(
                &constant_reads,
                "const",
                EdgeScope::Global,
            ),
            Rule::forward(&constant_reads)
                .then(&declare_by_constant, "const", EdgeScope::Global)
                .then(&replace_by_constant, "const", EdgeScope::Global),
            Rule::new(&declare_by_constant, two_value_read(profile, by_constant.clone()), resolved_pair(profile, literal))
                .seeded()
                .then(&inline, "var", block.clone())
                .then(&inline_error, "err", block),
            Rule::new(&replace_by_constant, by_constant, Template::leaf(literal))
                .seeded()
                .pure()
                .then(&bind, "call", EdgeScope::Parent),
        ])
    }
}

/// A call to the flag API whose arguments contain `argument`.
fn flag_read(callee: &Regex, argument: Pattern) -> Pattern {
    Pattern::All(vec![
        Pattern::kind(CALL),
        Pattern::Unordered(vec![
            Pattern::field(FUNCTION_FIELD).and(Pattern::Regex(callee.clone())),
            Pattern::field(ARGUMENTS_FIELD).and(argument.contains()),
        ]),
    ])
    .capture("call")
}

/// `v := <literal>`, what a resolved single-value read leaves behind.
fn single_value(profile: &LanguageProfile, literal: &str) -> Pattern {
    Pattern::All(vec![
        Pattern::kind(DECLARATION),
        Pattern::Seq(vec![
            Pattern::field(&profile.names_field)
                .and(node!(EXPRESSION_LIST, [Pattern::kind(&profile.identifier).capture("var")])),
            Pattern::field(&profile.initializer_field).and(node!(EXPRESSION_LIST, [Pattern::kind(literal)])),
        ]),
    ])
    .capture("decl")
}

/// `v, err := <read>`.
fn two_value_read(profile: &LanguageProfile, read: Pattern) -> Pattern {
    let name = || Pattern::kind(&profile.identifier);
    Pattern::All(vec![
        Pattern::kind(DECLARATION),
        Pattern::Seq(vec![
            Pattern::field(&profile.names_field)
                .and(node!(EXPRESSION_LIST, [name().capture("var"), name().capture("err")]))
                .capture("names"),
            Pattern::field(&profile.initializer_field).and(node!(EXPRESSION_LIST, [read])),
        ]),
    ])
}

/// `v, err := <literal>, nil`. The names are kept as they were so later
/// passes still know the declaration.
fn resolved_pair(profile: &LanguageProfile, literal: &str) -> Template {
    let values = Template::Node {
        kind: EXPRESSION_LIST.into(),
        children: vec![Template::leaf(literal), Template::Token(",".into()), Template::leaf(&profile.nil_literal)],
    };
    Template::Node {
        kind: DECLARATION.into(),
        children: vec![
            Template::Field(profile.names_field.clone(), Box::new(Template::capture("names"))),
            Template::Token(DECLARE_TOKEN.into()),
            Template::Field(profile.initializer_field.clone(), Box::new(values)),
        ],
    }
}
