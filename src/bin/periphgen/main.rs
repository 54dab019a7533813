use anyhow::{Context, Result};
use colored::*;
use std::process::ExitCode;

use periphgen::pipeline::{Pipeline, PipelineStatus, PipelineState};
use periphgen::providers::create_provider;
use periphgen::{AppConfig, PipelineId};

mod args;
use args::CliArgs;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = match CliArgs::parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{} {e}", "✗".red().bold());
            eprintln!("{}", CliArgs::usage().dimmed());
            return Ok(ExitCode::from(2));
        }
    };

    periphgen::observability::init_logging(if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    });

    let config = match &cli.config {
        Some(path) => AppConfig::load_at(path)?,
        None => AppConfig::load()?,
    };
    let documentation = std::fs::read_to_string(&cli.doc)
        .with_context(|| format!("reading documentation {}", cli.doc.display()))?;

    let provider = create_provider(&config.provider).await?;
    println!(
        "{} {} | {} | {}",
        ">>".bold(),
        "periphgen".bold(),
        format!("{}/{}", provider.name(), provider.model()).cyan(),
        cli.name.dimmed()
    );

    let mut pipeline = Pipeline::new(&config, provider);
    let state = pipeline
        .run(
            &cli.name,
            &documentation,
            cli.resume_from.as_deref(),
            cli.pipeline_id.clone().map(PipelineId::new),
        )
        .await?;

    print_summary(&state);

    if let Some(dir) = &cli.export {
        let exported = pipeline.export_results(dir)?;
        for (kind, path) in exported {
            println!("  {} {kind}: {}", "↳".dimmed(), path.display());
        }
    }

    if state.status == PipelineStatus::Completed {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_summary(state: &PipelineState) {
    let status = match state.status {
        PipelineStatus::Completed => state.status.as_str().green().bold(),
        PipelineStatus::Halted => state.status.as_str().yellow().bold(),
        _ => state.status.as_str().red().bold(),
    };
    println!("\n{} {} [{}]", "●".bold(), state.pipeline_id, status);
    println!(
        "  {}",
        format!(
            "cost ${:.4} | {} tokens",
            state.total_cost, state.total_tokens
        )
        .dimmed()
    );

    for (step, result) in &state.step_results {
        let score = result
            .score()
            .map_or_else(|| "-".to_string(), |s| format!("{s:.1}"));
        let mark = if result.is_failed() {
            "✗".red()
        } else {
            "✓".green()
        };
        println!("  {mark} {:<22} {score:>6}", step.as_str());
        if let Some(err) = &result.error {
            println!("      {}", err.red());
        }
    }

    if let Some(err) = state.metadata.get("error").and_then(|v| v.as_str()) {
        eprintln!("{} {}", "✗".red().bold(), err.red());
    }
}
