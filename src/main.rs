//! Persona Pipeline - audience personas from research data
//!
//! Entry point for the `persona-pipeline` binary: persona generation from
//! survey/interview files, marketing-copy scoring, and configuration commands.

mod backend;
mod chart;
mod cli;
mod config;
mod error;
mod logging;
mod parser;
mod persona;
mod pipeline;
mod progress;
mod prompt;
mod resilience;
mod text;
mod types;
mod version;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::create_client;
use crate::cli::{Cli, Commands, ConfigSubcommand, PersonasSubcommand};
use crate::config::{AppConfig, ProviderKind};
use crate::error::{Error, Result};
use crate::persona::PersonaStore;
use crate::pipeline::{GenerationOutcome, GenerationPipeline, ScoringPipeline};
use crate::resilience::{ResilientCaller, RetryPolicy};
use crate::types::{Feedback, Namespace, Persona};

fn main() {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    // Commands that don't need the full logging stack
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone(), cli.config.as_deref());
        }
        _ => {}
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting persona pipeline"
    );

    match cli.command {
        Commands::Generate {
            namespace,
            inputs,
            output,
        } => {
            if let Some(dir) = output {
                config.storage.output_dir = dir;
            }
            block_on(run_generate(config, namespace, inputs))
        }
        Commands::Score {
            personas,
            copy,
            copy_file,
            output,
        } => {
            let copy = match (copy, copy_file) {
                (Some(text), _) => text,
                (None, Some(path)) => text::read_source(&path)?,
                (None, None) => return Err(Error::EmptyInput("no marketing copy given".into())),
            };
            block_on(run_score(config, personas, copy, output))
        }
        Commands::Personas { subcommand } => handle_personas_command(&config, subcommand),
        Commands::Version | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    }
}

/// Build the tokio runtime and drive `fut` to completion
fn block_on<F>(fut: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(1, 4))
        .thread_name("persona-pipeline")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(fut)
}

fn build_caller(config: &AppConfig) -> Result<ResilientCaller> {
    if config.model.provider == ProviderKind::Openai && config.credential().is_empty() {
        warn!("No API key configured; set PERSONA_API_KEY or model.api_key");
    }

    let client = create_client(&config.model)?;
    info!(
        client = client.name(),
        model = %config.model.model,
        base_url = %config.model.base_url,
        "Model client ready"
    );
    Ok(ResilientCaller::new(
        client,
        RetryPolicy::from_settings(&config.retry, &config.model),
    ))
}

// ─────────────────────────────────────────────────────────────────
// generate
// ─────────────────────────────────────────────────────────────────

async fn run_generate(config: AppConfig, namespace: Namespace, inputs: Vec<PathBuf>) -> Result<()> {
    let document = text::load_document(namespace, &inputs)?;
    let caller = build_caller(&config)?;
    let store = PersonaStore::new(config.output_dir());
    let pipeline = GenerationPipeline::new(caller, config.generation.clone(), store);

    let report = pipeline.run(namespace, &document, &config.credential()).await?;

    if !report.chunks_failed.is_empty() {
        warn!(
            failed = ?report.chunks_failed,
            total = report.chunks_total,
            "Some chunks produced no personas"
        );
    }

    match &report.outcome {
        GenerationOutcome::Empty => {
            println!(
                "No usable personas were generated ({} record(s) discarded).",
                report.discarded_records
            );
        }
        GenerationOutcome::Persisted { personas, paths } => {
            println!("Generated {} persona(s) for '{}':", personas.len(), namespace);
            for persona in personas {
                println!("  {}", summary_line(persona));
            }
            println!();
            println!("Personas:         {}", paths.combined.display());
            println!("Archive:          {}", paths.archive.display());
            println!("Conversation log: {}", paths.conversation_log.display());
        }
    }
    if report.dropped_blocks > 0 {
        println!("Dropped {} unparseable JSON block(s).", report.dropped_blocks);
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// score
// ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ScoreOutput<'a> {
    feedback: &'a [Feedback],
    avg_score: f64,
    chart: String,
}

async fn run_score(
    config: AppConfig,
    ids: Vec<String>,
    copy: String,
    output: Option<PathBuf>,
) -> Result<()> {
    if copy.trim().is_empty() {
        return Err(Error::EmptyInput("marketing copy is empty".into()));
    }

    let store = PersonaStore::new(config.output_dir());
    let personas = store.load_selected(&ids)?;
    let caller = build_caller(&config)?;
    let pipeline = Arc::new(ScoringPipeline::new(caller, &config.scoring));

    let stream = progress::spawn_scoring(pipeline, personas, copy, config.credential());
    let report = stream
        .wait(|update| {
            info!(
                completed = update.completed,
                total = update.total,
                batch = update.batch_completed,
                batches = update.batch_total,
                "Scoring progress"
            );
        })
        .await?;

    let chart = chart::render(&report.feedback, report.avg_score);
    for f in &report.feedback {
        println!("{} ({:.1})", f.persona_id, f.score);
        if !f.reasons_to_buy.is_empty() {
            println!("  + {}", f.reasons_to_buy.join("\n  + "));
        }
        if !f.reasons_not_to_buy.is_empty() {
            println!("  - {}", f.reasons_not_to_buy.join("\n  - "));
        }
    }
    println!();
    print!("{}", chart);

    if let Some(path) = output {
        let out = ScoreOutput {
            feedback: &report.feedback,
            avg_score: report.avg_score,
            chart,
        };
        fs::write(&path, serde_json::to_string_pretty(&out)?).map_err(|e| Error::IoWrite {
            path: path.clone(),
            source: e,
        })?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// personas / config
// ─────────────────────────────────────────────────────────────────

fn summary_line(persona: &Persona) -> String {
    let description = persona.text("description").unwrap_or_default();
    let short: String = description.chars().take(72).collect();
    format!("{:<10} {}", persona.id().unwrap_or("?"), short)
}

fn handle_personas_command(config: &AppConfig, subcommand: PersonasSubcommand) -> Result<()> {
    let store = PersonaStore::new(config.output_dir());

    match subcommand {
        PersonasSubcommand::List { json } => {
            let personas = store.load_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&personas)?);
            } else if personas.is_empty() {
                println!("No saved personas in {}", store.root().display());
            } else {
                for persona in &personas {
                    println!("{}", summary_line(persona));
                    let resources: Vec<String> =
                        persona.resources().into_iter().map(|r| r.feature_name).collect();
                    if !resources.is_empty() {
                        println!("{:<10} resources: {}", "", resources.join(", "));
                    }
                    if let Some(batch) = persona.batch_info() {
                        println!("{:<10} from {}", "", batch);
                    }
                }
                println!();
                println!("{} persona(s) in {}", personas.len(), store.root().display());
            }
        }
    }

    Ok(())
}

fn handle_config_command(subcommand: ConfigSubcommand, config_path: Option<&str>) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = AppConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg.redacted())?);
        }
        ConfigSubcommand::Init { path, force } => {
            let path = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", path.display());
        }
        ConfigSubcommand::Validate => {
            AppConfig::load(config_path)?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
