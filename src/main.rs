use anyhow::{bail, Context, Result};
use callpath_context::assembler::Assembly;
use callpath_context::config::{load_config, Config, PathRewriteRule};
use callpath_context::pipeline::{analyze, build_assembler, build_index};
use callpath_context::profile::ProfileTree;
use callpath_context::reasoning::OpenAiCompatibleClient;
use callpath_context::xml_builder::build_context_xml;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "callpath-context")]
#[command(version)]
#[command(about = "Extract per-call-path source context from a profile and ask an LLM for its complexity")]
struct Cli {
    /// Map a recorded module-path prefix to a local one. Repeatable; tried in order,
    /// before any rules from the config file.
    #[arg(long = "map", value_name = "SRC=DST", global = true)]
    maps: Vec<String>,

    /// Token budget override for the source context of one call path
    #[arg(long, global = true)]
    budget_tokens: Option<usize>,

    /// Keep region names as recorded (no C++/Rust demangling)
    #[arg(long, global = true)]
    no_demangle: bool,

    /// tiktoken encoding used for the budget (o200k_base, cl100k_base, ...)
    #[arg(long, global = true)]
    encoding: Option<String>,

    /// Directory holding `.callpath-context.json` (defaults to the current dir)
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every call path of the profile as a JSON array
    Callpaths {
        /// Profile tree exported as JSON
        profile: PathBuf,
    },
    /// Print the assembled source context for one call path
    Context {
        profile: PathBuf,
        #[arg(long, value_name = "CALL_PATH")]
        call_path: String,
        /// Emit XML instead of JSON
        #[arg(long)]
        xml: bool,
    },
    /// Ask the reasoning service about every call path
    Analyze {
        profile: PathBuf,
        /// Also write all results as JSON to this file
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Chat-completions base URL (e.g. http://localhost:8000/v1)
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("callpath_context=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let dir = match &cli.config_dir {
        Some(d) => d.clone(),
        None => std::env::current_dir().context("Failed to get current dir")?,
    };
    let mut cfg = load_config(&dir)?;

    let mut rules = cli
        .maps
        .iter()
        .map(|m| PathRewriteRule::parse(m))
        .collect::<Result<Vec<_>>>()?;
    rules.append(&mut cfg.rewrite_rules);
    cfg.rewrite_rules = rules;

    if let Some(budget) = cli.budget_tokens {
        cfg.budget_tokens = budget;
    }
    if cli.no_demangle {
        cfg.demangle = false;
    }
    if let Some(enc) = &cli.encoding {
        cfg.token_counter.encoding = enc.clone();
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut cfg = resolve_config(&cli)?;

    match cli.cmd {
        Command::Callpaths { profile } => {
            let tree = ProfileTree::load_json(&profile)?;
            let index = build_index(&tree, &cfg);
            let paths: Vec<&str> = index.call_paths().collect();
            println!("{}", serde_json::to_string_pretty(&paths)?);
        }
        Command::Context { profile, call_path, xml } => {
            let tree = ProfileTree::load_json(&profile)?;
            let index = build_index(&tree, &cfg);
            let mut assembler = build_assembler(&tree, &index, &cfg)?;
            match assembler.assemble(&call_path)? {
                Assembly::Emit(ctx) if xml => print!("{}", build_context_xml(&ctx)?),
                Assembly::Emit(ctx) => println!("{}", serde_json::to_string_pretty(&ctx)?),
                Assembly::Skip(reason) => bail!("no context for {call_path}: {reason:?}"),
            }
        }
        Command::Analyze {
            profile,
            output,
            base_url,
            model,
        } => {
            if let Some(url) = base_url {
                cfg.reasoning.base_url = url;
            }
            if model.is_some() {
                cfg.reasoning.model = model;
            }

            let tree = ProfileTree::load_json(&profile)?;
            let client = OpenAiCompatibleClient::connect(&cfg.reasoning)
                .with_context(|| format!("Failed to reach reasoning service at {}", cfg.reasoning.base_url))?;
            tracing::info!(model = client.model(), nodes = tree.len(), "starting analysis");

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")?
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
            spinner.enable_steady_tick(std::time::Duration::from_millis(80));
            spinner.set_message("analyzing call paths...");

            let mut answered = 0usize;
            let summary = analyze(&tree, &cfg, &client, |r| {
                answered += 1;
                spinner.suspend(|| {
                    println!("{} : {}", r.call_path, r.complexity.as_deref().unwrap_or("<none>"));
                });
                spinner.set_message(format!("{answered} call paths answered"));
            })?;
            spinner.finish_with_message(format!(
                "{} answered, {} skipped of {}",
                summary.results.len(),
                summary.skipped,
                summary.total_call_paths
            ));

            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_vec_pretty(&summary)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
    }

    Ok(())
}
