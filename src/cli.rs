//! # Command Line Interface
//!
//! Runs the engine (sweeper loop until Ctrl+C), a single expiry pass, or
//! database migration management.

use crate::config::AppConfig;
use crate::observability::{init_observability, log_config_info};
use crate::startup::Engine;
use crate::storage::{
    create_pool, get_migration_version, list_applied_migrations, pending_migrations,
    run_migrations, MigrationInfo,
};
use crate::{APP_NAME, VERSION};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "leasekeeper")]
#[command(about = "Dynamic secret leasing engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path (overrides LEASEKEEPER_CONFIG_FILE)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Database URL override
    #[arg(long)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the expiry sweeper until interrupted
    Run,

    /// Run one expiry pass and exit
    Sweep,

    /// Database management commands
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },
}

#[derive(Subcommand)]
pub enum DatabaseCommands {
    /// Apply pending migrations
    Migrate {
        /// Only show how many migrations are pending
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the current schema version
    Status,

    /// List all applied migrations
    List,
}

/// Parse arguments and run the selected command
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    config.validate()?;

    init_observability(&config.observability).await?;
    info!(app_name = APP_NAME, version = VERSION, "Starting leasekeeper");
    log_config_info(&config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_engine(&config).await?,
        Commands::Sweep => {
            let engine = Engine::build(&config).await?;
            let expired = engine.sweeper.sweep().await?;
            println!("Expired {} lease(s)", expired);
        }
        Commands::Database { command } => handle_database_command(command, &config).await?,
    }

    Ok(())
}

async fn run_engine(config: &AppConfig) -> anyhow::Result<()> {
    let engine = Engine::build(config).await?;
    let shutdown = CancellationToken::new();
    let sweeper = engine.sweeper.spawn(shutdown.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    sweeper.await?;
    engine.pool.close().await;

    info!("Leasekeeper shutdown completed");
    Ok(())
}

async fn handle_database_command(command: DatabaseCommands, config: &AppConfig) -> anyhow::Result<()> {
    let mut database = config.database.clone();
    database.auto_migrate = false;
    let pool = create_pool(&database).await?;

    match command {
        DatabaseCommands::Migrate { dry_run } => {
            let pending = pending_migrations(&pool).await?;
            if dry_run {
                println!("{} migration(s) pending", pending);
            } else {
                run_migrations(&pool).await?;
                println!("Applied {} migration(s)", pending);
            }
        }

        DatabaseCommands::Status => {
            let version = get_migration_version(&pool).await?;
            let pending = pending_migrations(&pool).await?;
            println!("Schema version: {}", version);
            if pending > 0 {
                println!("{} migration(s) pending", pending);
            } else {
                println!("Database schema is up to date");
            }
        }

        DatabaseCommands::List => {
            let migrations = list_applied_migrations(&pool).await?;
            if migrations.is_empty() {
                println!("No migrations have been applied");
            } else {
                print_migrations_table(&migrations);
            }
        }
    }

    pool.close().await;
    Ok(())
}

fn print_migrations_table(migrations: &[MigrationInfo]) {
    println!("{:<15} {:<50} {:<25} {:<10}", "Version", "Description", "Applied On", "Time (ms)");
    println!("{}", "-".repeat(100));

    for migration in migrations {
        println!(
            "{:<15} {:<50} {:<25} {:<10}",
            migration.version,
            truncate_string(&migration.description, 48),
            migration.installed_on.format("%Y-%m-%d %H:%M:%S"),
            migration.execution_time
        );
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
