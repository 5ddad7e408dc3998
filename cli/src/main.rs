//! swroute CLI: driving adapter for the swroute rule engine.
//!
//! Subcommands:
//! - `check <rules>`: validate a rule document the way the router admits it
//! - `eval <rules> --url <url> [...]`: show which rule a request selects
//! - `info`: print source types and admission limits
//!
//! Rule documents are JSON (`.json`) or YAML (anything else) and hold a
//! single rule, a list, or `{"rules": [...]}`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use swroute::prelude::*;
use swroute::{system_now_ms, RuleDocument, MAX_CHAIN_LENGTH, MAX_CONDITION_DEPTH};
use tracing_subscriber::EnvFilter;

/// Check and explain swroute rule documents
#[derive(Parser, Debug)]
#[command(name = "swroute", version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Router settings (JSON or YAML)
    #[arg(long, global = true, env = "SWROUTE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a rule document
    Check {
        /// Rule document
        rules: PathBuf,
    },
    /// Show which rule a request selects
    Eval {
        /// Rule document
        rules: PathBuf,

        #[command(flatten)]
        request: RequestArgs,

        /// Print the evaluation trace of every rule consulted
        #[arg(long)]
        trace: bool,
    },
    /// Print source types and admission limits
    Info,
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    /// Request URL
    #[arg(long)]
    url: String,

    /// Request method
    #[arg(long, default_value = "GET")]
    method: String,

    /// Request mode
    #[arg(long)]
    mode: Option<String>,

    /// Request destination
    #[arg(long)]
    destination: Option<String>,

    /// Round-trip-time estimate, ms
    #[arg(long, default_value_t = 0)]
    rtt: u64,

    /// Treat the fetch handler as not running
    #[arg(long)]
    not_running: bool,

    /// Wall-clock time, ms since the Unix epoch (defaults to now)
    #[arg(long)]
    now: Option<u64>,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_document::<RouterConfig>(path)?,
        None => RouterConfig::default(),
    };

    match args.command {
        Command::Check { rules } => cmd_check(&rules, &config),
        Command::Eval {
            rules,
            request,
            trace,
        } => cmd_eval(&rules, &config, &request, trace),
        Command::Info => {
            cmd_info(&config);
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_check(path: &Path, config: &RouterConfig) -> Result<()> {
    let set = load_rule_set(path, config)?;
    println!("{} rule(s) valid", set.len());
    Ok(())
}

fn cmd_eval(path: &Path, config: &RouterConfig, args: &RequestArgs, trace: bool) -> Result<()> {
    let set = load_rule_set(path, config)?;
    let request = build_request(args)?;
    let context = build_context(args);

    let (found, selection) = set.explain(&request, &context, &GlobMatcher);
    if trace {
        for step in &selection.steps {
            let verdict = if step.matched() { "matched" } else { "no match" };
            println!("rule {}: {verdict}", step.index);
            println!("{}", step.condition);
        }
    }

    match found {
        Some((index, rule)) => println!("rule {index} -> {}", rule.source),
        None => println!("(no match: falls back to the fetch handler)"),
    }
    Ok(())
}

fn cmd_info(config: &RouterConfig) {
    println!("Source types:");
    for source_type in SourceType::ALL {
        println!("  {source_type}");
    }

    println!("\nLimits:");
    println!("  max rules:            {}", config.max_rules);
    println!("  max chain length:     {MAX_CHAIN_LENGTH}");
    println!("  max condition depth:  {MAX_CONDITION_DEPTH}");
    println!("  default cache name:   {}", config.default_cache_name);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request assembly
// ═══════════════════════════════════════════════════════════════════════════════

fn build_request(args: &RequestArgs) -> Result<RequestSnapshot> {
    let mut builder = RequestSnapshot::builder(args.url.as_str()).method(args.method.as_str());
    if let Some(mode) = &args.mode {
        builder = builder.mode(mode.as_str());
    }
    if let Some(destination) = &args.destination {
        builder = builder.destination(destination.as_str());
    }
    builder
        .build()
        .with_context(|| format!("invalid request URL \"{}\"", args.url))
}

fn build_context(args: &RequestArgs) -> RuntimeContext {
    let status = if args.not_running {
        RunningStatus::NotRunning
    } else {
        RunningStatus::Running
    };
    RuntimeContext::at(args.now.unwrap_or_else(system_now_ms))
        .with_rtt_ms(args.rtt)
        .with_running_status(status)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Document loading
// ═══════════════════════════════════════════════════════════════════════════════

fn load_rule_set(path: &Path, config: &RouterConfig) -> Result<RuleSet> {
    let rules = load_document::<RuleDocument>(path)?
        .compile()
        .with_context(|| format!("rules in \"{}\" do not compile", path.display()))?;

    let mut set = RuleSet::new();
    set.add_rules(rules, config.max_rules)
        .with_context(|| format!("rules in \"{}\" are invalid", path.display()))?;
    tracing::debug!(path = %path.display(), rules = set.len(), "rules loaded");
    Ok(set)
}

fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read \"{}\"", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).context("JSON parse error")
    } else {
        // Default to YAML (handles .yaml and .yml)
        serde_yaml::from_str(&content).context("YAML parse error")
    }
}
