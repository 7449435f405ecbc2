//! CLI entry point for schemagen

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use schemagen::config::ProjectConfig;

#[derive(Parser)]
#[command(name = "schemagen")]
#[command(about = "Provision and migrate a database schema, then run a code generator against it")]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML format, defaults to ./schemagen.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project directory; relative paths in the configuration resolve against it
    #[arg(short, long)]
    project_dir: Option<PathBuf>,

    /// Only handle the named task (repeatable)
    #[arg(short, long = "task")]
    tasks: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the selected tasks (default)
    Generate,
    /// Print the fingerprint of each selected task
    Fingerprint,
    /// Show what each task would do without touching anything
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (before logging, so we can use config.log_level)
    let config = ProjectConfig::load(cli.config.as_deref())?;

    // Initialize logging
    // Priority: RUST_LOG env var > config.log_level > default (debug for dev, info for release)
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };
    let log_level = config.log_level.as_deref().unwrap_or(default_level);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    config.validate()?;

    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match cli.command.unwrap_or(Commands::Generate) {
        Commands::Generate => {
            let failed = schemagen::generate_project(&config, &project_dir, &cli.tasks).await?;
            if failed > 0 {
                bail!("{} task(s) failed", failed);
            }
            info!("Generation completed successfully");
        }
        Commands::Fingerprint => {
            for task in schemagen::select_tasks(&config, &project_dir, &cli.tasks)? {
                println!(
                    "{} {} all_inputs_declared={}",
                    task.name(),
                    task.fingerprint()?,
                    task.all_inputs_declared()
                );
            }
        }
        Commands::Plan => {
            for task in schemagen::select_tasks(&config, &project_dir, &cli.tasks)? {
                println!("Task: {}", task.name());
                println!("  Output:     {}", task.output_dir().display());
                println!("  Document:   {}", task.document_path().display());
                if task.engages_container() {
                    println!("  Database:   ephemeral container");
                    println!("  Migrations: {}", task.migrations_dir().display());
                } else {
                    println!("  Database:   configured connection");
                    println!("  Migrations: skipped");
                }
                let generator = task.generator_command();
                println!(
                    "  Generator:  {} {}",
                    generator.program,
                    generator.args.join(" ")
                );
            }
        }
    }

    Ok(())
}
