use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod error;
mod lookup;
mod models;
mod render;
mod rest;

use config::{PgConfig, RestConfig};
use lookup::GradeSource;

const QUIT_COMMAND: &str = ":q";

#[derive(Parser)]
#[command(name = "grade-lookup")]
#[command(about = "Look up a student's grade record by ID or email", long_about = None)]
struct Cli {
    /// Where grade records are read from
    #[arg(long, value_enum, default_value_t = Backend::Rest, global = true)]
    backend: Backend,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Supabase/PostgREST endpoint (SUPABASE_URL, SUPABASE_KEY)
    Rest,
    /// Direct Postgres connection (DATABASE_URL)
    Postgres,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one student by ID or email
    Lookup {
        term: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read search terms from stdin, one per line
    Interactive,
    /// Create or upgrade the grade table (postgres)
    InitDb,
    /// Load sample grade records (postgres)
    Seed,
    /// Upsert grade records from a CSV file (postgres)
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("grade_lookup=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Lookup { term, json } => {
            let source = build_source(cli.backend).await?;
            match lookup::lookup(source.as_ref(), &term).await {
                Ok(outcome) if json => println!("{}", render::render_json(&outcome)?),
                Ok(outcome) => print!("{}", render::render_outcome(&outcome)),
                Err(err) => {
                    warn!(error = %err, "lookup failed");
                    if json {
                        println!("{}", render::render_json_error(&err)?);
                    } else {
                        print!("{}", render::render_error(&err));
                    }
                    std::process::exit(2);
                }
            }
        }
        Commands::Interactive => {
            let source = build_source(cli.backend).await?;
            let input = BufReader::new(tokio::io::stdin());
            run_interactive(source.as_ref(), input, &mut std::io::stdout()).await?;
        }
        Commands::InitDb => {
            let (pool, _) = connect_postgres().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let (pool, config) = connect_postgres().await?;
            db::seed(&pool, &config.table).await?;
            println!("Sample grades inserted into {}.", config.table);
        }
        Commands::Import { csv } => {
            let (pool, config) = connect_postgres().await?;
            let written = db::import_csv(&pool, &config.table, &csv)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!("Wrote {written} grade records from {}.", csv.display());
        }
    }

    Ok(())
}

async fn build_source(backend: Backend) -> anyhow::Result<Box<dyn GradeSource>> {
    match backend {
        Backend::Rest => {
            let config = RestConfig::from_env()
                .context("grade service is not configured; check SUPABASE_URL and SUPABASE_KEY")?;
            info!(url = %config.base_url, table = %config.table, "using grade service");
            Ok(Box::new(rest::RestGradeSource::new(&config)?))
        }
        Backend::Postgres => {
            let (pool, config) = connect_postgres().await?;
            Ok(Box::new(db::PgGradeSource::new(pool, config.table)))
        }
    }
}

async fn connect_postgres() -> anyhow::Result<(PgPool, PgConfig)> {
    let config = PgConfig::from_env().context("DATABASE_URL must point at the grade database")?;
    info!(table = %config.table, "connecting to Postgres");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    Ok((pool, config))
}

/// One lookup per input line until EOF or the quit command. Lookup errors are
/// reported and the session continues.
async fn run_interactive<R, W>(
    source: &dyn GradeSource,
    input: R,
    output: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: std::io::Write,
{
    writeln!(output, "{}", render::PROMPT_MESSAGE)?;
    writeln!(output, "({QUIT_COMMAND} to quit)")?;

    let mut lines = input.lines();
    loop {
        write!(output, "> ")?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim() == QUIT_COMMAND {
            break;
        }

        match lookup::lookup(source, &line).await {
            Ok(outcome) => write!(output, "{}", render::render_outcome(&outcome))?,
            Err(err) => {
                warn!(error = %err, "lookup failed");
                write!(output, "{}", render::render_error(&err))?;
            }
        }
        writeln!(output)?;
    }

    Ok(())
}
