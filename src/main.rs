mod debug_report;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use flagsweep::config::{read_document, read_profile, read_tree};
use flagsweep::{Options, rewrite_batch, sexp};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Rule-graph driven feature-flag cleanup.
///
/// Reads trees in S-expression form, rewrites them with the rules of a JSON
/// rule document until nothing changes, and prints a report per file (or
/// the rewritten trees with --emit).
#[derive(Parser, Debug)]
#[command(name = "flagsweep", version)]
struct Cli {
    /// JSON rule document.
    #[arg(short, long, value_name = "FILE")]
    rules: PathBuf,

    /// JSON language profile, replacing the document's (or the default).
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Substitution for a rule hole, e.g. --set flag=stale_feature.
    #[arg(long = "set", value_name = "HOLE=VALUE", value_parser = parse_substitution)]
    substitutions: Vec<(String, String)>,

    /// Scan/rewrite iterations before a file is cut short.
    #[arg(long, default_value_t = 100)]
    max_iterations: usize,

    /// Print only the rewritten trees, as S-expressions.
    #[arg(long)]
    emit: bool,

    /// Force ANSI color output.
    #[arg(long, conflicts_with = "no_color")]
    color: bool,

    /// Disable ANSI color output.
    #[arg(long)]
    no_color: bool,

    /// Tree files (S-expressions).
    #[arg(required = true, value_name = "TREE")]
    files: Vec<PathBuf>,
}

fn parse_substitution(arg: &str) -> Result<(String, String), String> {
    let (hole, value) = arg.split_once('=').ok_or_else(|| format!("expected HOLE=VALUE, got '{arg}'"))?;
    if hole.is_empty() {
        return Err(format!("empty hole name in '{arg}'"));
    }
    Ok((hole.to_string(), value.to_string()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("FLAGSWEEP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

/// `Ok(false)` when at least one file could not be processed.
fn run(cli: &Cli) -> Result<bool, flagsweep::Error> {
    let mut document = read_document(&cli.rules)?;
    if let Some(path) = &cli.profile {
        document = document.with_profile(read_profile(path)?);
    }
    let mut set = document.into_rule_set()?;
    set.context.substitutions.extend(cli.substitutions.iter().cloned());

    let trees = cli.files.iter().map(|path| read_tree(path)).collect::<Result<Vec<_>, _>>()?;
    let options = Options { max_iterations: cli.max_iterations, collect_details: !cli.emit, ..Options::default() };
    let results = rewrite_batch(&set.graph, trees, set.context, options)?;

    let color = (cli.color || io::stdout().is_terminal()) && !cli.no_color;
    let mut all_ok = true;
    for (path, result) in cli.files.iter().zip(results) {
        match result {
            Ok(result) if cli.emit => println!("{}", sexp::print(&result.tree)),
            Ok(result) => debug_report::print_run(path, &result, color),
            Err(err) => {
                error!(file = %path.display(), %err, "rewrite failed");
                all_ok = false;
            }
        }
    }
    Ok(all_ok)
}
