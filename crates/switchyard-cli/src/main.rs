mod config;
mod goal_cmds;
mod plan_cmd;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use switchyard_core::events::EventBroker;
use switchyard_core::generation::GoalLeases;
use switchyard_core::provider::{OpenAiProvider, PlanProvider};
use switchyard_db::pool;

use config::SwitchyardConfig;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Turns goals into validated route-DAG execution plans"
)]
struct Cli {
    /// Database URL (overrides SWITCHYARD_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a switchyard config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/switchyard")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the switchyard database (create + migrate)
    DbInit,
    /// Goal management
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Generate and apply a plan for a goal
    Plan {
        /// Goal ID to plan
        goal_id: String,
        /// Free-text context forwarded to the provider
        #[arg(long, default_value = "")]
        context: String,
    },
    /// Run the HTTP/SSE server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8600)]
        port: u16,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Create a new goal
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List all goals
    List,
    /// Show a goal and its route graph
    Show {
        goal_id: String,
    },
    /// Delete a goal and its graph
    Delete {
        goal_id: String,
    },
}

/// Execute the `switchyard init` command: write the config file.
fn cmd_init(db_url: &str, force: bool) -> Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        provider: config::ProviderSection::default(),
        generation: config::GenerationSection::default(),
        events: config::EventsSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Set SWITCHYARD_API_KEY (or [provider] api_key) to enable plan generation.");
    println!("Next: run `switchyard db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `switchyard db-init` command: create database and run
/// migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> Result<()> {
    let resolved = SwitchyardConfig::resolve(cli_db_url)?;

    println!("Initializing switchyard database...");

    // 1. Create the database if it does not exist.
    pool::ensure_database_exists(&resolved.db_config).await?;

    // 2. Connect to the target database.
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    // 3. Run migrations.
    pool::run_migrations(&db_pool).await?;

    // 4. Print success with table counts.
    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    // 5. Clean shutdown.
    db_pool.close().await;

    println!("switchyard db-init complete.");
    Ok(())
}

fn parse_goal_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("{raw:?} is not a valid goal id"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => cmd_init(&db_url, force),

        Commands::DbInit => cmd_db_init(cli.database_url.as_deref()).await,

        Commands::Goal { command } => {
            let resolved = SwitchyardConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;

            let result = match command {
                GoalCommands::Create { title, description } => {
                    goal_cmds::cmd_goal_create(&db_pool, &title, &description).await
                }
                GoalCommands::List => goal_cmds::cmd_goal_list(&db_pool).await,
                GoalCommands::Show { goal_id } => {
                    goal_cmds::cmd_goal_show(&db_pool, parse_goal_id(&goal_id)?).await
                }
                GoalCommands::Delete { goal_id } => {
                    goal_cmds::cmd_goal_delete(&db_pool, parse_goal_id(&goal_id)?).await
                }
            };

            db_pool.close().await;
            result
        }

        Commands::Plan { goal_id, context } => {
            let resolved = SwitchyardConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;

            let result =
                plan_cmd::cmd_plan(&db_pool, &resolved, parse_goal_id(&goal_id)?, context).await;

            db_pool.close().await;
            result
        }

        Commands::Serve { bind, port } => {
            let resolved = SwitchyardConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            pool::run_migrations(&db_pool).await?;

            let provider = resolved
                .provider
                .clone()
                .map(|cfg| Arc::new(OpenAiProvider::new(cfg)) as Arc<dyn PlanProvider>);
            if provider.is_none() {
                tracing::warn!(
                    "no plan provider configured; /api/goals/{{id}}/plan will return 503"
                );
            }

            let state = serve_cmd::AppState {
                pool: db_pool.clone(),
                broker: Arc::new(EventBroker::with_buffer_size(resolved.events_buffer_size)),
                leases: GoalLeases::new(),
                provider,
                generation: resolved.generation.clone(),
                events_enabled: resolved.events_enabled,
            };

            let result = serve_cmd::run_serve(state, &bind, port).await;
            db_pool.close().await;
            result
        }
    }
}
