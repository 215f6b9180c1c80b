//! Userfiles CLI: run the upload pipeline for a local file.
//!
//! Reads its configuration from the environment (see `Config::from_env`).
//! DATABASE_URL must point at the Postgres database holding `user_files`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use userfiles_cli::{actor_from_args, init_tracing, original_name, stage_upload};
use userfiles_core::Config;
use userfiles_db::{PostgresFileRepository, MIGRATOR};
use userfiles_services::{
    SourceRegistry, UploadOrchestrator, UploadRequest, UploadedFile,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "userfiles", about = "User file upload pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Client file name (defaults to the file name of FILE)
        #[arg(long)]
        name: Option<String>,
        /// Destination id
        #[arg(long)]
        source: Option<i64>,
        #[arg(long)]
        parent: Option<i64>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        list: Option<String>,
        #[arg(long)]
        context: Option<String>,
        /// Upload as this user
        #[arg(long, conflicts_with = "session")]
        user: Option<Uuid>,
        /// Upload anonymously within this session
        #[arg(long)]
        session: Option<String>,
        /// Replace the content of an existing record
        #[arg(long)]
        crop: Option<Uuid>,
    },
    /// Run database migrations
    Migrate,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(url)
        .await
        .context("Failed to connect to database")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    match cli.command {
        Commands::Migrate => {
            let pool = connect(&config).await?;
            MIGRATOR.run(&pool).await.context("Failed to run migrations")?;
            tracing::info!("Migrations applied");
        }
        Commands::Upload {
            file,
            name,
            source,
            parent,
            class,
            list,
            context,
            user,
            session,
            crop,
        } => {
            // the process exits right after the upload
            config.defer_thumbnails = false;

            let pool = connect(&config).await?;
            let repository = Arc::new(PostgresFileRepository::new(pool));
            let registry = Arc::new(SourceRegistry::from_config(&config));
            let orchestrator = UploadOrchestrator::new(&config, registry, repository);

            let staged = stage_upload(&file)?;
            let request = UploadRequest {
                file: Some(UploadedFile::new(staged, original_name(&file, name))),
                source,
                parent,
                class,
                list,
                context,
                crop,
            };
            let actor = actor_from_args(user, session);

            let response = orchestrator.handle(&actor, request).await;
            print_json(&response)?;
            if !response.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
