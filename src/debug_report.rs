use std::path::Path;

use flagsweep::{Change, Outcome, RewriteResult};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            self.paint(s, BOLD)
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            self.paint(s, DIM)
        }
    }
}

/// Simplifier steps are shown apart from rule rewrites.
const SIMPLIFIER_STEPS: [&str; 4] = ["fold_boolean", "prune_branch", "remove_unreachable", "remove_unused_binding"];

pub fn print_run(path: &Path, result: &RewriteResult, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Rewriting: {}", path.display()), ansi::CYAN)));

    if let Some(details) = &result.details {
        println!("\n{}", palette.paint("━━━ Passes ━━━", ansi::GRAY));
        for pass in &details.passes {
            println!(
                "  {} {}  {} {}  {}",
                palette.paint(format!("Pass {}:", pass.pass), ansi::BLUE),
                if pass.applied > 0 {
                    palette.paint(format!("✓ {} applied", pass.applied), ansi::GREEN)
                } else {
                    palette.dim(format!("✗ {} applied", pass.applied))
                },
                palette.dim("│ matches:"),
                palette.paint(pass.matches.to_string(), ansi::YELLOW),
                palette.dim(format!(
                    "rules: {}  seeds: {}  discarded: {}  simplified: {}  {:?}",
                    pass.active_rules, pass.seeds, pass.discarded, pass.simplified, pass.duration
                )),
            );
        }
    }

    println!("\n{}", palette.paint("━━━ Changes ━━━", ansi::GRAY));
    if result.changes.is_empty() {
        println!("{}", palette.dim("  No rule applied"));
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • No node has a kind some rule's pattern pins");
        println!("  • Holes did not match (check --set substitutions)");
        println!("  • Scope constraints excluded every match");
        println!("\n{}", palette.dim("  Tip: Set FLAGSWEEP_LOG=flagsweep=debug to see rule choice and seeding"));
    } else {
        for (idx, change) in result.changes.iter().enumerate() {
            println!("  {} {}", palette.paint(format!("[{idx}]"), ansi::GRAY), fmt_change(change, &palette));
        }
    }

    println!("\n{}", palette.paint("━━━ Result ━━━", ansi::GRAY));
    match &result.outcome {
        Outcome::Converged { iterations } => println!(
            "  {} after {} iteration(s), revision {}",
            palette.paint("converged", ansi::GREEN),
            iterations,
            result.revision
        ),
        Outcome::BudgetExhausted { iterations, diagnostic } => println!(
            "  {} after {} iteration(s): {}",
            palette.paint("budget exhausted", ansi::YELLOW),
            iterations,
            palette.dim(diagnostic)
        ),
    }
    println!("  {}", palette.bold(result.tree.render()));

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    match &result.details {
        Some(details) => println!(
            "  Total: {}  │  Simplify: {}  │  Rules: {}  Edges: {}",
            palette.paint(format!("{:?}", details.total), ansi::GREEN),
            palette.paint(format!("{:?}", details.simplify), ansi::CYAN),
            palette.dim(details.rules.to_string()),
            palette.dim(details.edges.to_string()),
        ),
        None => println!("  Total: {}", palette.paint(format!("{:?}", result.elapsed), ansi::GREEN)),
    }
    println!();
}

fn fmt_change(change: &Change, palette: &ansi::Palette) -> String {
    let color = if SIMPLIFIER_STEPS.contains(&change.rule.as_str()) { ansi::MAGENTA } else { ansi::BLUE };
    let replacement = match change.replacement {
        Some(span) => palette.paint(span.to_string(), ansi::YELLOW),
        None => palette.dim("deleted"),
    };
    format!(
        "{} {} {} {} {}",
        palette.paint(&change.rule, color),
        palette.dim("│"),
        palette.paint(change.original.to_string(), ansi::YELLOW),
        palette.dim("→"),
        replacement,
    )
}
