//! Whole-loop behaviour: edges, claiming, budgets, convergence.

use pretty_assertions::assert_eq;

use crate::rules::FlagCleanup;
use crate::{
    Context, EdgeScope, LanguageProfile, Options, Outcome, Pattern, RewriteResult, Rule, RuleGraph, Template, rewrite,
    sexp,
};

fn run_with(rules: Vec<Rule>, src: &str, options: Options) -> RewriteResult {
    let graph = RuleGraph::new(rules).unwrap();
    rewrite(&graph, sexp::parse(src).unwrap(), Context::default(), options).unwrap()
}

fn run(rules: Vec<Rule>, src: &str) -> RewriteResult {
    run_with(rules, src, Options { collect_details: true, ..Options::default() })
}

fn rule_names(result: &RewriteResult) -> Vec<&str> {
    result.changes.iter().map(|c| c.rule.as_str()).collect()
}

fn drop_text(text: &str) -> Rule {
    Rule::new(&format!("drop_{text}"), Pattern::kind("id").and(Pattern::text(text)), Template::Delete)
}

const LIST: &str = r#"(list (id = "a") "," (id = "b") "," (id = "c"))"#;

#[test]
fn list_elements_take_one_separator_with_them() {
    assert_eq!(run(vec![drop_text("b")], LIST).tree.render(), "a , c");
    assert_eq!(run(vec![drop_text("a")], LIST).tree.render(), "b , c");
    assert_eq!(run(vec![drop_text("c")], LIST).tree.render(), "a , b");
    assert_eq!(run(vec![drop_text("b"), drop_text("c")], LIST).tree.render(), "a");
}

#[test]
fn parent_edge_climbs_to_the_nearest_matching_ancestor() {
    let rules = vec![
        rule! {
            name: "resolve",
            pattern: Pattern::kind("call").and(Pattern::text("f")).capture("c"),
            replace: Template::leaf("resolved"),
            successors: [("drop_stmt", "c", EdgeScope::Parent)],
        },
        rule! { name: "drop_stmt", pattern: Pattern::kind("stmt"), replace: Template::Delete, seeded: true },
    ];
    let out = run(rules, r#"(block (stmt (call = "f")) (stmt (call = "g")))"#);
    assert_eq!(out.tree.render(), "g");
    assert_eq!(rule_names(&out), ["resolve", "drop_stmt"]);
}

#[test]
fn enclosing_edge_is_limited_to_the_enclosing_node() {
    let rules = vec![
        Rule::new(
            "rename",
            Pattern::kind("name").and(Pattern::text("a")).capture("n"),
            Template::Leaf { kind: "name".into(), text: Some("v2_@n".into()) },
        )
        .then("drop_x", "n", EdgeScope::Enclosing("func".into())),
        Rule::new("drop_x", Pattern::kind("use").and(Pattern::text("x")), Template::Delete).seeded(),
    ];
    let out = run(
        rules,
        r#"(file
            (func (name = "a") (block (use = "x") (use = "y")))
            (func (name = "b") (block (use = "x"))))"#,
    );
    assert_eq!(out.tree.render(), "v2_a y b x");
    assert_eq!(rule_names(&out), ["rename", "drop_x"]);
}

#[test]
fn global_edge_carries_captured_text_to_every_use() {
    let rules = vec![
        Rule::new("find_alias", node!("alias", [Pattern::kind("id").capture("name")]), Template::Delete)
            .then("replace_use", "name", EdgeScope::Global),
        Rule::new("replace_use", Pattern::kind("use").and(Pattern::hole("name")), Template::leaf("const")).seeded(),
    ];
    let out = run(rules, r#"(file (alias (id = "x")) (use = "x") (use = "y") (func (use = "x")))"#);
    assert_eq!(out.tree.render(), "const y const");
    assert_eq!(rule_names(&out), ["find_alias", "replace_use", "replace_use"]);
    assert_eq!(out.outcome, Outcome::Converged { iterations: 2 });
}

#[test]
fn outermost_match_claims_its_subtree() {
    let rules = vec![
        Rule::new("drop_inner", Pattern::kind("inner"), Template::Delete),
        Rule::new("flatten_outer", Pattern::kind("outer"), Template::leaf("flat")),
    ];
    let out = run(rules, r#"(root (outer (inner = "i") (keep = "k")))"#);
    assert_eq!(out.tree.render(), "flat");
    assert_eq!(rule_names(&out), ["flatten_outer"]);
    assert_eq!(out.details.unwrap().passes[0].discarded, 1);
}

#[test]
fn first_declared_rule_wins_at_a_node() {
    let rules = vec![
        Rule::new("first", Pattern::kind("id"), Template::leaf("one")),
        Rule::new("second", Pattern::kind("id"), Template::leaf("two")),
    ];
    let out = run(rules, r#"(list (id = "a"))"#);
    assert_eq!(out.tree.render(), "one");
    assert_eq!(rule_names(&out), ["first"]);
}

#[test]
fn root_cannot_be_deleted() {
    let out = run(vec![Rule::new("drop_root", Pattern::kind("root"), Template::Delete)], r#"(root (x))"#);
    assert_eq!(out.tree.render(), "x");
    assert!(out.changes.is_empty());
    assert_eq!(out.revision, 0);
    assert!(out.outcome.is_converged());
}

#[test]
fn self_edge_on_an_identity_rule_terminates() {
    let rules = vec![
        Rule::new("touch", Pattern::kind("id").capture("n"), Template::capture("n")).then("touch", "n", EdgeScope::Node),
    ];
    let out = run(rules, r#"(list (id = "a"))"#);
    assert!(out.changes.is_empty());
    assert_eq!(out.outcome, Outcome::Converged { iterations: 1 });
}

#[test]
fn rewrite_cycle_stops_at_the_iteration_cap() {
    let rules = vec![
        Rule::new("a_to_b", Pattern::kind("a"), Template::leaf("b")),
        Rule::new("b_to_a", Pattern::kind("b"), Template::leaf("a")),
    ];
    let out = run_with(rules, r#"(list (a))"#, Options { max_iterations: 5, ..Options::default() });
    match &out.outcome {
        Outcome::BudgetExhausted { iterations, diagnostic } => {
            assert_eq!(*iterations, 5);
            assert!(diagnostic.contains("iteration cap of 5"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(out.changes.len(), 5);
    assert_eq!(out.tree.render(), "b");
}

#[test]
fn acyclic_chain_converges_within_its_length() {
    let rules = vec![
        Rule::new("a_to_b", Pattern::kind("a").capture("n"), Template::leaf("b")).then("b_to_c", "n", EdgeScope::Node),
        Rule::new("b_to_c", Pattern::kind("b").capture("n"), Template::leaf("c"))
            .seeded()
            .then("c_to_d", "n", EdgeScope::Node),
        Rule::new("c_to_d", Pattern::kind("c"), Template::leaf("d")).seeded(),
    ];
    let out = run(rules, r#"(list (a) "," (a) "," (a))"#);
    assert_eq!(out.tree.render(), "d , d , d");
    assert!(out.outcome.is_converged());
    assert!(out.outcome.iterations() <= 3);
    assert_eq!(out.changes.len(), 9);
}

fn flag_source() -> &'static str {
    r#"(block
        (short_var_declaration
            left: (expression_list (identifier = "on"))
            ":="
            right: (expression_list (call_expression
                function: (selector_expression operand: (identifier = "exp") "." field: (field_identifier = "BoolValue"))
                arguments: (argument_list "(" (interpreted_string_literal = "\"f\"") ")"))))
        (if_statement "if" condition: (identifier = "on")
            consequence: (block "{" (return_statement "return" (identifier = "x")) "}"))
        (call_expression function: (identifier = "side_effect") arguments: (argument_list "(" ")"))
        (return_statement "return" (identifier = "y")))"#
}

fn flag_graph() -> RuleGraph {
    RuleGraph::new(FlagCleanup::new("BoolValue", "f", true).rules(&LanguageProfile::default()).unwrap()).unwrap()
}

#[test]
fn flag_return_makes_the_rest_of_the_block_unreachable() {
    let out = rewrite(&flag_graph(), sexp::parse(flag_source()).unwrap(), Context::default(), Options::default())
        .unwrap();
    assert_eq!(out.tree.render(), "return x");
    assert_eq!(
        rule_names(&out),
        [
            "replace_flag_call",
            "inline_flag_variable",
            "prune_branch",
            "remove_unreachable",
            "remove_unreachable",
            "remove_unused_binding"
        ]
    );
}

#[test]
fn false_flag_keeps_the_code_after_the_branch() {
    let graph =
        RuleGraph::new(FlagCleanup::new("BoolValue", "f", false).rules(&LanguageProfile::default()).unwrap()).unwrap();
    let out = rewrite(&graph, sexp::parse(flag_source()).unwrap(), Context::default(), Options::default()).unwrap();
    assert_eq!(out.tree.render(), "side_effect ( ) return y");
    assert_eq!(
        rule_names(&out),
        ["replace_flag_call", "inline_flag_variable", "prune_branch", "remove_unused_binding"]
    );
}

#[test]
fn enclosing_seed_ends_where_its_name_is_bound_again() {
    let rules = vec![
        Rule::new("declare", node!("decl", [Pattern::kind("identifier").capture("n")]), Template::capture("n"))
            .then("replace_use", "n", EdgeScope::Enclosing("block".into())),
        Rule::new("replace_use", Pattern::kind("use").and(Pattern::hole("n")), Template::leaf("const")).seeded(),
    ];
    let out = run(
        rules,
        r#"(block
            (decl (identifier = "x"))
            (use = "x")
            (short_var_declaration left: (expression_list (identifier = "x")) ":=" right: (expression_list (call = "g")))
            (use = "x"))"#,
    );
    assert_eq!(out.tree.render(), "x const x := g x");
}

#[test]
fn rewriting_is_idempotent() {
    let graph = flag_graph();
    let first = rewrite(&graph, sexp::parse(flag_source()).unwrap(), Context::default(), Options::default()).unwrap();
    let second = rewrite(&graph, first.tree.clone(), Context::default(), Options::default()).unwrap();
    assert!(second.changes.is_empty());
    assert_eq!(second.revision, 0);
    assert_eq!(sexp::print(&second.tree), sexp::print(&first.tree));
}

#[test]
fn rewriting_is_deterministic() {
    let graph = flag_graph();
    let runs: Vec<RewriteResult> = (0..3)
        .map(|_| rewrite(&graph, sexp::parse(flag_source()).unwrap(), Context::default(), Options::default()).unwrap())
        .collect();
    for other in &runs[1..] {
        assert_eq!(other.changes, runs[0].changes);
        assert_eq!(sexp::print(&other.tree), sexp::print(&runs[0].tree));
        assert_eq!(other.outcome, runs[0].outcome);
    }
}
