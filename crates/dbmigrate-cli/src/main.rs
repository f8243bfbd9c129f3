//! dbmigrate CLI - directory-driven migrations for MySQL and SQL Server.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dbmigrate::migration::{MemoryStore, ModuleBuildResult, RegistrationSummary};
use dbmigrate::{load_registry, Config, DriverCatalog, MigrateError, Orchestrator};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "dbmigrate")]
#[command(about = "Scan, track and run database migration scripts")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "dbmigrate.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the modules root and register new modules and files
    Scan {
        /// Only rescan the module in this directory
        #[arg(long)]
        module: Option<String>,

        /// Report what would be registered without touching the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Run pending migration files
    Build {
        /// Only build this module
        #[arg(long)]
        module: Option<String>,
    },

    /// List registered modules
    Modules,

    /// List the tracked files of a module
    Files {
        /// Module id
        fileid: String,
    },

    /// List loaded entity schemas
    Schemas,

    /// Test the store connection and modules root
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(format!("Failed to setup logging: {}", e)))?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Scan { module, dry_run } => {
            let orchestrator = if dry_run {
                info!("Dry run: registering into an in-memory store");
                Orchestrator::with_parts(
                    config,
                    Arc::new(MemoryStore::new()),
                    Arc::new(DriverCatalog::with_builtins()),
                )?
            } else {
                Orchestrator::new(config).await?
            };

            let summary = match module {
                Some(name) => orchestrator.reload_module(&name).await,
                None => orchestrator.load_modules().await,
            };
            orchestrator.close().await?;
            let summary = summary?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary, dry_run);
            }
        }

        Commands::Build { module } => {
            let orchestrator = Orchestrator::new(config).await?;
            let results = match module {
                Some(fileid) => orchestrator.build_module(&fileid).await.map(|r| vec![r]),
                None => orchestrator.build_modules().await,
            };
            orchestrator.close().await?;
            let results = results?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_build_results(&results);
            }

            if let Some(failure) = results.iter().find_map(|r| r.failure.as_ref()) {
                return Err(MigrateError::statement(&failure.file, &failure.error));
            }
        }

        Commands::Modules => {
            let orchestrator = Orchestrator::new(config).await?;
            let modules = orchestrator.modules().await;
            orchestrator.close().await?;
            let modules = modules?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&modules)?);
            } else {
                println!("Modules ({}):", modules.len());
                for module in &modules {
                    println!(
                        "  {:<24} db={:<20} last={}",
                        module.fileid,
                        module.dbname,
                        module.lastfileid.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Files { fileid } => {
            let orchestrator = Orchestrator::new(config).await?;
            let groups = orchestrator.module_files(&fileid).await;
            orchestrator.close().await?;
            let groups = groups?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                for group in &groups {
                    println!("{}:", group.name);
                    for file in &group.files {
                        println!("  [{}] {}", file.state, file.filename);
                        if let Some(ref err) = file.errors {
                            println!("    Error: {}", err);
                        }
                    }
                }
            }
        }

        Commands::Schemas => {
            let registry = load_registry(&config)?;
            let mut schemas = Vec::with_capacity(registry.len());
            for name in registry.names() {
                schemas.push(registry.get(name)?);
            }

            if cli.output_json {
                let listing: Vec<_> = schemas
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "name": s.name(),
                            "tablename": s.table_name(),
                            "fields": s.fields(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                println!("Schemas ({}):", schemas.len());
                for schema in &schemas {
                    println!(
                        "  {} -> {} ({} fields)",
                        schema.name(),
                        schema.table_name(),
                        schema.fields().len()
                    );
                }
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;
            orchestrator.close().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let store = &orchestrator.config().store;
                println!("Health Check Results:");
                println!(
                    "  Store ({} {}/{}): {} ({}ms)",
                    store.r#type,
                    store.host,
                    store.database,
                    if result.store_connected { "OK" } else { "FAILED" },
                    result.store_latency_ms
                );
                if let Some(ref err) = result.store_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Modules root ({}): {}",
                    orchestrator.config().paths.root.display(),
                    if result.modules_root_exists { "OK" } else { "MISSING" }
                );
                println!("  Schemas loaded: {}", result.schemas_loaded);
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &RegistrationSummary, dry_run: bool) {
    println!("{}", if dry_run { "Scan (dry run):" } else { "Scan complete:" });
    println!("  Modules created: {}", summary.modules_created);
    println!("  Modules refreshed: {}", summary.modules_refreshed);
    println!("  New files: {}", summary.files_added);
    println!("  Already tracked: {}", summary.files_existing);
}

fn print_build_results(results: &[ModuleBuildResult]) {
    println!("Build Results:");
    for result in results {
        match &result.failure {
            None => println!(
                "  {}: OK ({} files)",
                result.module, result.files_processed
            ),
            Some(failure) => {
                println!(
                    "  {}: FAILED after {} files, {} pending",
                    result.module, result.files_processed, result.files_remaining
                );
                println!("    {}: {}", failure.file, failure.error);
            }
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
