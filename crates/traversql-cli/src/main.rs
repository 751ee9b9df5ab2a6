//! traversql CLI - extract a foreign-key consistent slice of a PostgreSQL database.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use traversql::{
    Catalog, Config, ExtractError, Extractor, PgSourcePool, SourcePool, SqlValue,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "traversql")]
#[command(about = "Extract a record and everything it is related to as INSERT statements")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (defaults to POSTGRES_* environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

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
    /// Extract a seed record with its related records
    Extract {
        /// Seed table name
        #[arg(long)]
        table: String,

        /// Seed table schema
        #[arg(long, default_value = "public")]
        schema: String,

        /// Primary key column names, comma separated
        #[arg(
            long = "pk-fields",
            alias = "primary-key-fields",
            value_delimiter = ',',
            default_value = "id"
        )]
        pk_fields: Vec<String>,

        /// Primary key values, comma separated, in field order
        #[arg(
            long = "pk-values",
            alias = "primary-key-values",
            value_delimiter = ',',
            required = true
        )]
        pk_values: Vec<String>,

        /// Write SQL to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only walk these tables
        #[arg(long, value_delimiter = ',')]
        included_tables: Vec<String>,

        /// Never walk these tables
        #[arg(long, value_delimiter = ',')]
        excluded_tables: Vec<String>,

        /// Schemas to discover
        #[arg(long, value_delimiter = ',')]
        included_schemas: Vec<String>,

        /// Walk rows the seed references
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        follow_parents: bool,

        /// Walk rows referencing the seed
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        follow_children: bool,
    },

    /// Show discovered tables and relationships
    Inspect {
        /// Print as JSON
        #[arg(long)]
        output_json: bool,
    },

    /// Test the database connection
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

async fn run() -> Result<(), ExtractError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::from_env()?,
    };

    let cancel_token = setup_signal_handler();

    let source = Arc::new(PgSourcePool::new(&config.source).await?);

    let result = match cli.command {
        Commands::Extract {
            table,
            schema,
            pk_fields,
            pk_values,
            output,
            included_tables,
            excluded_tables,
            included_schemas,
            follow_parents,
            follow_children,
        } => {
            if !included_schemas.is_empty() {
                config.traversal.schemas = included_schemas;
            }
            if !included_tables.is_empty() {
                config.traversal.include_tables = included_tables;
            }
            if !excluded_tables.is_empty() {
                config.traversal.exclude_tables = excluded_tables;
            }
            config.traversal.follow_parents = follow_parents;
            config.traversal.follow_children = follow_children;
            config.traversal = config.traversal.ensure_schema(&schema);
            config.validate()?;

            let request = ExtractRequest {
                schema,
                table,
                fields: pk_fields,
                values: pk_values.iter().map(|v| SqlValue::parse_key(v)).collect(),
                output,
            };
            extract(source.clone(), &config, request, &cancel_token).await
        }

        Commands::Inspect { output_json } => Catalog::discover(source.as_ref(), &config.traversal)
            .await
            .and_then(|catalog| print_catalog(&catalog, output_json)),

        Commands::HealthCheck => health_check(source.as_ref(), &config).await,
    };

    source.close().await;
    result
}

struct ExtractRequest {
    schema: String,
    table: String,
    fields: Vec<String>,
    values: Vec<SqlValue>,
    output: Option<PathBuf>,
}

async fn extract(
    source: Arc<PgSourcePool>,
    config: &Config,
    request: ExtractRequest,
    cancel: &CancellationToken,
) -> Result<(), ExtractError> {
    let extractor = Extractor::discover(source, &config.traversal).await?;
    let (table, pk) = extractor
        .seed_key(&request.schema, &request.table, &request.fields, request.values)
        .await?;

    let started = Instant::now();
    let (sql, summary) = extractor.extract_with_summary(&table, pk, cancel).await?;
    info!(
        "Extracted {} records from seed {} in {:.2}s",
        summary.records,
        table.full_name(),
        started.elapsed().as_secs_f64()
    );

    match request.output {
        Some(path) => {
            std::fs::write(&path, sql)?;
            info!("Wrote {} statements to {:?}", summary.records, path);
        }
        None => print!("{}", sql),
    }
    Ok(())
}

fn print_catalog(catalog: &Catalog, output_json: bool) -> Result<(), ExtractError> {
    if output_json {
        let tables: Vec<_> = catalog
            .tables()
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.full_name(),
                    "primary_key": t.primary_columns().iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
                })
            })
            .collect();
        let relationships: Vec<_> = catalog
            .relationships()
            .iter()
            .map(|r| {
                serde_json::json!({
                    "type": r.relation_type,
                    "source": r.source_table.full_name(),
                    "source_columns": r.source_columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
                    "target": r.target_table.full_name(),
                    "target_columns": r.target_columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
                })
            })
            .collect();
        let doc = serde_json::json!({
            "tables": tables,
            "relationships": relationships,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Tables:");
    for table in catalog.tables() {
        let pk: Vec<String> = table.primary_columns().into_iter().map(|c| c.name).collect();
        if pk.is_empty() {
            println!("  {} (no primary key)", table.full_name());
        } else {
            println!("  {} (pk: {})", table.full_name(), pk.join(", "));
        }
    }
    println!("\nRelationships:");
    for rel in catalog.relationships() {
        println!("  {}", rel);
    }
    Ok(())
}

async fn health_check(source: &dyn SourcePool, config: &Config) -> Result<(), ExtractError> {
    let started = Instant::now();
    let result = source.test_connection().await;
    let latency = started.elapsed().as_millis();

    let error = result.as_ref().err().map(ToString::to_string);
    print!(
        "{}",
        health_report(
            source.db_type(),
            &config.source.display_target(),
            latency,
            error.as_deref()
        )
    );
    result
}

fn health_report(db_type: &str, target: &str, latency_ms: u128, error: Option<&str>) -> String {
    let mut report = String::from("Health Check Results:\n");
    match error {
        None => report.push_str(&format!("  Source ({}): OK ({}ms)\n", db_type, latency_ms)),
        Some(e) => {
            report.push_str(&format!("  Source ({}): FAILED ({}ms)\n", db_type, latency_ms));
            report.push_str(&format!("    Error: {}\n", e));
        }
    }
    report.push_str(&format!("  Connection: {}\n", target));
    report
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the generated SQL
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
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    let token_term = cancel_token.clone();

    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Cancelling extraction...");
        token_int.cancel();
    });

    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Cancelling extraction...");
        token_term.cancel();
    });

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to setup Ctrl-C handler");
        eprintln!("\nReceived Ctrl-C. Cancelling extraction...");
        token.cancel();
    });

    cancel_token
}
