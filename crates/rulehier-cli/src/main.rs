//! Rulehier CLI
//!
//! Command-line driver for hierarchical rule mining:
//! - `learn`: specialize every target's templates into rule indexes
//! - `apply`: apply the indexes and elect a rule subset per target
//! - `run`: learn, then apply
//! - `order-rules`: re-sort an existing `rules.txt`

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rulehier_core::persist::order_rule_file;
use rulehier_core::specialize::OutputFiles;
use rulehier_core::{ApplicationReport, Coverage, GlobalAnalysis, Model, ModelSelection, TargetMiner};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::Level;

mod dataset;

use dataset::{Dataset, RunConfig};

#[derive(Parser)]
#[command(name = "rulehier")]
#[command(
    author,
    version,
    about = "Rulehier: rule mining over a template hierarchy"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn rules for every target and write the rule indexes.
    Learn {
        /// JSON run configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Apply learned rule indexes and run model selection.
    Apply {
        /// JSON run configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Learn, then apply.
    Run {
        /// JSON run configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Sort `<dir>/rules.txt` by quality.
    OrderRules {
        /// Output directory holding `rules.txt`
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Learn { config } => {
            let config = RunConfig::load(&config)?;
            let dataset = Dataset::load(&config.home)?;
            cmd_learn(&config, &dataset)?;
        }
        Commands::Apply { config } => {
            let config = RunConfig::load(&config)?;
            let dataset = Dataset::load(&config.home)?;
            cmd_apply(&config, &dataset)?;
        }
        Commands::Run { config } => {
            let config = RunConfig::load(&config)?;
            let dataset = Dataset::load(&config.home)?;
            cmd_learn(&config, &dataset)?;
            cmd_apply(&config, &dataset)?;
        }
        Commands::OrderRules { dir } => {
            let path = dir.join("rules.txt");
            let rules = order_rule_file(&path)?;
            println!(
                "{} {} rules in {}",
                "sorted".green().bold(),
                rules,
                path.display().to_string().bold()
            );
        }
    }
    Ok(())
}

// ============================================================================
// Learn
// ============================================================================

fn cmd_learn(config: &RunConfig, dataset: &Dataset) -> Result<GlobalAnalysis> {
    let started = Instant::now();
    let rules = config.rules_file();
    if let Some(parent) = rules.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    File::create(&rules).with_context(|| format!("truncating {}", rules.display()))?;

    let miner = TargetMiner::new(&dataset.graph, config.miner.clone());
    let mut global = GlobalAnalysis::default();
    for target in dataset.targets(&config.targets) {
        let templates = dataset.templates(&target);
        if templates.is_empty() {
            tracing::warn!(predicate = %target, "no templates for target");
            continue;
        }
        let filter = dataset.filter_set(&target, &config.miner);
        let files = OutputFiles {
            index: config.index_file(&target),
            rules: rules.clone(),
        };
        let analysis = miner
            .learn(&target, templates, &filter, &files)
            .with_context(|| format!("learning {target}"))?;
        println!(
            "{} {} {} ins rules from {}/{} templates in {:.2}s{}",
            "learned".green().bold(),
            target.bold(),
            analysis.qualified_ins_rules,
            analysis.qualified_templates,
            analysis.templates,
            analysis.duration.as_secs_f64(),
            if analysis.constraints_triggered() {
                " (constrained)".yellow().to_string()
            } else {
                String::new()
            }
        );
        global.add(analysis);
    }

    let ordered = order_rule_file(&rules)?;
    print_summary(&global);
    println!("  {} {} ({} rules)", "→".cyan(), rules.display(), ordered);
    println!(
        "  {} learning took {:.2}s",
        "→".cyan(),
        started.elapsed().as_secs_f64()
    );
    Ok(global)
}

fn print_summary(global: &GlobalAnalysis) {
    println!("{}", "Summary".bold());
    println!("  targets:            {}", global.targets.len());
    println!(
        "  templates:          {} (avg {:.1})",
        global.total(|t| t.templates),
        global.average(|t| t.templates)
    );
    println!(
        "  qualified:          {} (avg {:.1})",
        global.total(|t| t.qualified_templates),
        global.average(|t| t.qualified_templates)
    );
    println!(
        "  prior pruned:       {}",
        global.total(|t| t.prior_pruned)
    );
    println!(
        "  ins rules:          {} (avg {:.1})",
        global.total(|t| t.qualified_ins_rules),
        global.average(|t| t.qualified_ins_rules)
    );
    println!("  post pruned:        {}", global.total(|t| t.post_pruned));
    println!("  constrained:        {}", global.constrained_targets());
    println!(
        "  specialization:     {:.2}s",
        global.duration().as_secs_f64()
    );
}

// ============================================================================
// Apply
// ============================================================================

/// Written to `<out>/selection/<target>.json`.
#[derive(Serialize)]
struct SelectionReport<'a> {
    target: &'a str,
    application: ApplicationReport,
    /// Labels of the elected rules, in ranking order.
    best_rules: Vec<&'a str>,
    best_f1: Option<f64>,
    best_weighted_f1: Option<f64>,
    coverage: Option<Coverage>,
    selection: Option<&'a ModelSelection>,
}

fn cmd_apply(config: &RunConfig, dataset: &Dataset) -> Result<()> {
    let started = Instant::now();
    let miner = TargetMiner::new(&dataset.graph, config.miner.clone());
    for target in dataset.targets(&config.targets) {
        let index = config.index_file(&target);
        if !index.exists() {
            tracing::warn!(predicate = %target, path = %index.display(), "rule index missing");
            continue;
        }
        let filter = dataset.filter_set(&target, &config.miner);
        let applied = miner
            .apply(&target, &index, &filter)
            .with_context(|| format!("applying {target}"))?;

        let best = applied.selection.as_ref().map(ModelSelection::best);
        match best {
            Some(model) => print_model(&target, model, applied.coverage.as_ref()),
            None => println!("{} {} no model evaluated", "applied".green().bold(), target.bold()),
        }

        let best_rules = best
            .map(|model| {
                model
                    .rules
                    .iter()
                    .map(|&i| applied.predictions.rules()[i].label.as_str())
                    .collect()
            })
            .unwrap_or_default();
        let report = SelectionReport {
            target: &target,
            application: applied.report,
            best_rules,
            best_f1: best.map(Model::f1),
            best_weighted_f1: best.map(Model::weighted_f1),
            coverage: applied.coverage,
            selection: applied.selection.as_ref(),
        };
        write_json(&config.selection_file(&target), &report)?;
    }
    println!(
        "  {} applying took {:.2}s",
        "→".cyan(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn print_model(target: &str, model: &Model, coverage: Option<&Coverage>) {
    println!(
        "{} {} size={} {}",
        "selected".green().bold(),
        target.bold(),
        model.size,
        model
    );
    if let Some(c) = coverage {
        println!(
            "  {} known: all={} explained={} ratio={:.3}",
            "→".cyan(),
            c.known_all,
            c.explained,
            c.explained_ratio()
        );
        println!(
            "  {} inferred: all={} quality={} ratio={:.3}",
            "→".cyan(),
            c.inferred_all,
            c.inferred_quality,
            c.inferred_ratio()
        );
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
