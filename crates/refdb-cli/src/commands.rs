use colored::Colorize;
use refdb_batch::{classify, BatchVerdict, CommandResult};
use refdb_types::ProjectName;
use serde::Serialize;

use crate::cli::*;
use crate::config::RefDbConfig;
use crate::simulate::{self, SimulationParams, SimulationReport};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = RefDbConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Classify(args) => cmd_classify(args, cli.format),
        Command::Simulate(args) => cmd_simulate(args, &config, cli.format),
        Command::Config(_) => cmd_config(&config, cli.format),
    }
}

#[derive(Debug, Serialize)]
struct ClassifyReport {
    verdict: BatchVerdict,
    retryable: bool,
    hard_failure: bool,
}

fn classify_report(results: &[CommandResult]) -> ClassifyReport {
    let verdict = classify(results.iter().copied());
    ClassifyReport {
        verdict,
        retryable: verdict == BatchVerdict::Retryable,
        hard_failure: verdict.is_hard_failure(),
    }
}

fn cmd_classify(args: ClassifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let report = classify_report(&args.results);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            for (i, result) in args.results.iter().enumerate() {
                println!("  cmd{} {}", i + 1, result_label(*result));
            }
            let line = match report.verdict {
                BatchVerdict::Success => format!("{} all commands applied", "✓".green().bold()),
                BatchVerdict::Retryable => {
                    format!("{} lock failure, retry the batch", "↻".yellow().bold())
                }
                BatchVerdict::PartialFailure => {
                    format!("{} update partially applied", "✗".red().bold())
                }
                BatchVerdict::Rejected => format!("{} update failed", "✗".red().bold()),
                BatchVerdict::Unresolved => {
                    format!("{} some commands were never attempted", "?".dimmed())
                }
            };
            println!("{line}");
        }
    }
    match report.verdict {
        BatchVerdict::PartialFailure | BatchVerdict::Rejected => {
            anyhow::bail!("batch failed: {:?}", report.verdict)
        }
        BatchVerdict::Unresolved => anyhow::bail!("batch has commands that were never attempted"),
        BatchVerdict::Success | BatchVerdict::Retryable => {}
    }
    Ok(())
}

fn result_label(result: CommandResult) -> colored::ColoredString {
    match result {
        CommandResult::Ok => result.as_str().green(),
        CommandResult::LockFailure | CommandResult::Aborted => result.as_str().yellow(),
        CommandResult::RejectedOtherReason => result.as_str().red(),
        CommandResult::NotAttempted => result.as_str().dimmed(),
    }
}

fn cmd_simulate(args: SimulateArgs, config: &RefDbConfig, format: OutputFormat) -> anyhow::Result<()> {
    anyhow::ensure!(args.replicas > 0, "at least one replica is required");
    let params = SimulationParams {
        project: ProjectName::new(&args.project)?,
        replicas: args.replicas,
        batches: args.batches,
        refs: args.refs,
    };
    let db = refdb_global::open(&config.global_ref_db);
    let report = simulate::run(params, db, &config.retry)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_simulation(&report),
    }
    Ok(())
}

fn print_simulation(report: &SimulationReport) {
    println!("Project {}", report.project.as_str().bold());
    for stats in &report.replicas {
        println!(
            "  replica {}: {} applied, {} retries, {} exhausted, {} failed, {} lost updates",
            stats.replica.to_string().cyan(),
            stats.succeeded.to_string().green(),
            stats.retries.to_string().yellow(),
            stats.exhausted.to_string().yellow(),
            stats.failed.to_string().red(),
            stats.lost_updates.to_string().red(),
        );
    }
    for r in &report.refs {
        let value = match r.id {
            Some(id) => id.short_hex().yellow(),
            None => "(absent)".dimmed(),
        };
        println!("  {} {}", r.name, value);
    }
    let failed = report.total(|s| s.failed);
    let lost = report.total(|s| s.lost_updates);
    if lost > 0 {
        println!("{} {} ref updates overwritten unseen", "✗".red().bold(), lost);
    }
    if failed == 0 {
        println!(
            "{} {} batches applied, no partial updates",
            "✓".green().bold(),
            report.total(|s| s.succeeded)
        );
    } else {
        println!("{} {} batches failed", "✗".red().bold(), failed);
    }
}

fn cmd_config(config: &RefDbConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", config.to_toml()?),
    }
    Ok(())
}
