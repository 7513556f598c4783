//! Language profile: which node kinds play which role for the simplifier.
//!
//! The engine itself never names a kind. Everything the dead-code simplifier
//! needs to know about a grammar (what a boolean literal looks like, which
//! node is a conditional, which statements terminate a block) is data held
//! here, so one engine serves every grammar whose parser exposes the
//! [`Node`](crate::tree::Node) interface.
//!
//! The default follows tree-sitter-go naming, which is also what the bundled
//! flag rules in [`crate::rules::flags`] expect.

use std::sync::Arc;

use serde::Deserialize;

use crate::tree::Node;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LanguageProfile {
    pub true_literal: String,
    pub false_literal: String,
    /// The null value; two of them compare equal. Empty when the grammar has
    /// none.
    pub nil_literal: String,
    /// String literal kinds; a rewrite producing one of these (or a boolean)
    /// wakes up the simplifier.
    pub string_literals: Vec<String>,
    /// Leaf kinds that can never have side effects besides the literals above.
    pub pure_leaves: Vec<String>,

    pub binary_expression: String,
    pub unary_expression: String,
    pub parenthesized: Vec<String>,
    pub operator_field: String,
    pub left_field: String,
    pub right_field: String,
    pub operand_field: String,
    pub and_operator: String,
    pub or_operator: String,
    pub not_operator: String,
    pub eq_operator: String,
    pub ne_operator: String,

    pub conditionals: Vec<String>,
    pub condition_field: String,
    pub consequence_field: String,
    pub alternative_field: String,

    /// Statement lists; pruned branches are flattened into these.
    pub blocks: Vec<String>,
    /// Unconditional control transfers out of a block.
    pub terminators: Vec<String>,

    pub declarations: Vec<String>,
    /// Statements that store into the names of their `names_field`.
    pub assignments: Vec<String>,
    /// Node kind bounding the scope of a local variable.
    pub local_scope: String,
    pub names_field: String,
    pub initializer_field: String,
    pub identifier: String,
    pub blank_identifier: String,

    /// Kinds that may have side effects when evaluated (calls, assignments).
    pub effect_kinds: Vec<String>,
    /// Anonymous list separators removed together with a deleted element.
    pub separators: Vec<String>,
}

impl Default for LanguageProfile {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        LanguageProfile {
            true_literal: "true".into(),
            false_literal: "false".into(),
            nil_literal: "nil".into(),
            string_literals: strings(&["interpreted_string_literal", "raw_string_literal"]),
            pure_leaves: strings(&["identifier", "int_literal", "float_literal", "nil", "rune_literal"]),
            binary_expression: "binary_expression".into(),
            unary_expression: "unary_expression".into(),
            parenthesized: strings(&["parenthesized_expression"]),
            operator_field: "operator".into(),
            left_field: "left".into(),
            right_field: "right".into(),
            operand_field: "operand".into(),
            and_operator: "&&".into(),
            or_operator: "||".into(),
            not_operator: "!".into(),
            eq_operator: "==".into(),
            ne_operator: "!=".into(),
            conditionals: strings(&["if_statement"]),
            condition_field: "condition".into(),
            consequence_field: "consequence".into(),
            alternative_field: "alternative".into(),
            blocks: strings(&["block", "statement_list"]),
            terminators: strings(&["return_statement", "break_statement", "continue_statement", "goto_statement"]),
            declarations: strings(&["short_var_declaration"]),
            assignments: strings(&["assignment_statement"]),
            local_scope: "block".into(),
            names_field: "left".into(),
            initializer_field: "right".into(),
            identifier: "identifier".into(),
            blank_identifier: "_".into(),
            effect_kinds: strings(&[
                "call_expression",
                "assignment_statement",
                "inc_statement",
                "dec_statement",
                "send_statement",
                "receive_expression",
                "go_statement",
                "defer_statement",
            ]),
            separators: strings(&[","]),
        }
    }
}

fn contains(list: &[String], kind: &str) -> bool {
    list.iter().any(|k| k == kind)
}

impl LanguageProfile {
    /// Boolean value of a literal, looking through parentheses.
    pub fn boolean_value(&self, node: &Node) -> Option<bool> {
        if node.kind() == self.true_literal {
            return Some(true);
        }
        if node.kind() == self.false_literal {
            return Some(false);
        }
        if self.is_parenthesized(node) {
            let mut inner = node.named_children();
            let only = inner.next()?;
            if inner.next().is_none() {
                return self.boolean_value(only);
            }
        }
        None
    }

    pub fn is_nil(&self, node: &Node) -> bool {
        !self.nil_literal.is_empty() && node.kind() == self.nil_literal
    }

    /// Boolean, nil or string literal.
    pub fn is_constant(&self, node: &Node) -> bool {
        self.boolean_value(node).is_some() || self.is_nil(node) || contains(&self.string_literals, node.kind())
    }

    pub fn is_parenthesized(&self, node: &Node) -> bool {
        contains(&self.parenthesized, node.kind())
    }

    pub fn is_conditional(&self, node: &Node) -> bool {
        contains(&self.conditionals, node.kind())
    }

    pub fn is_block(&self, node: &Node) -> bool {
        contains(&self.blocks, node.kind())
    }

    pub fn is_terminator(&self, node: &Node) -> bool {
        contains(&self.terminators, node.kind())
    }

    pub fn is_declaration(&self, node: &Node) -> bool {
        contains(&self.declarations, node.kind())
    }

    /// Names a declaration or assignment stores into; `None` for any other
    /// statement.
    pub fn rebound_names<'n>(&self, statement: &'n Arc<Node>) -> Option<Vec<&'n str>> {
        if !self.is_declaration(statement) && !contains(&self.assignments, statement.kind()) {
            return None;
        }
        let mut names = Vec::new();
        if let Some(left) = statement.child_by_field(&self.names_field) {
            left.walk(&mut |n| {
                if self.is_identifier(n) {
                    names.push(n.leaf_text());
                }
            });
        }
        Some(names)
    }

    pub fn is_identifier(&self, node: &Node) -> bool {
        node.kind() == self.identifier
    }

    pub fn is_effect(&self, node: &Node) -> bool {
        contains(&self.effect_kinds, node.kind())
    }

    pub fn is_pure_leaf(&self, node: &Node) -> bool {
        node.is_leaf() && (contains(&self.pure_leaves, node.kind()) || self.is_constant(node) || !node.is_named())
    }

    /// Literal node for `value`, taking over `like`'s span.
    pub fn literal(&self, value: bool, like: &Node) -> Node {
        let kind = if value { &self.true_literal } else { &self.false_literal };
        Node::leaf(kind, None, like.span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexp;

    #[test]
    fn boolean_value_sees_through_parentheses() {
        let profile = LanguageProfile::default();
        let tree = sexp::parse(r#"(parenthesized_expression "(" (parenthesized_expression "(" (false) ")") ")")"#).unwrap();
        assert_eq!(profile.boolean_value(&tree), Some(false));
        assert!(profile.is_constant(&tree));
    }

    #[test]
    fn rebound_names_cover_declarations_and_assignments() {
        let profile = LanguageProfile::default();
        let declaration = sexp::parse(
            r#"(short_var_declaration left: (expression_list (identifier = "s") "," (identifier = "err")) ":=" right: (expression_list (call_expression)))"#,
        )
        .unwrap();
        assert_eq!(profile.rebound_names(&declaration), Some(vec!["s", "err"]));

        let assignment =
            sexp::parse(r#"(assignment_statement left: (expression_list (identifier = "on")) "=" right: (expression_list (false)))"#)
                .unwrap();
        assert_eq!(profile.rebound_names(&assignment), Some(vec!["on"]));

        let call = sexp::parse(r#"(call_expression function: (identifier = "on"))"#).unwrap();
        assert_eq!(profile.rebound_names(&call), None);
    }

    #[test]
    fn profile_deserializes_with_defaults() {
        let profile: LanguageProfile =
            serde_json::from_str(r#"{"true_literal": "True", "blocks": ["suite"]}"#).unwrap();
        assert_eq!(profile.true_literal, "True");
        assert_eq!(profile.false_literal, "false");
        assert_eq!(profile.blocks, ["suite"]);
    }
}
