//! fluxnote CLI
//!
//! Command-line interface for running notebook queries:
//! - Run a query with variables and a time range
//! - Print the preamble a query would be sent with
//! - Generate a default config file

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fluxnote::config::{generate_default_config, Config, LoggingConfig};
use fluxnote::query::{HttpTransport, ParsedResult, QueryContext, QueryExecutor};
use fluxnote::variables::{
    is_identifier, Expression, MemoryVariableStore, SessionTimeContexts, TimeRange, Variable,
};

const SESSION_ID: &str = "cli";

#[derive(Parser)]
#[command(name = "fluxnote")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Flux queries with notebook variables, time ranges and window periods")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Query text plus the variables and range it runs with
#[derive(clap::Args)]
pub struct QueryArgs {
    /// Query text (omit when using --file)
    text: Option<String>,

    /// Read the query text from a file
    #[arg(short, long, conflicts_with = "text")]
    file: Option<PathBuf>,

    /// Variables in name=value format; override [variables] from the config
    #[arg(short, long = "var")]
    vars: Vec<String>,

    /// Range start: now, a duration such as -1h, or an RFC 3339 time
    #[arg(long, default_value = "-1h", allow_hyphen_values = true)]
    start: String,

    /// Range stop
    #[arg(long, default_value = "now", allow_hyphen_values = true)]
    stop: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a query and print its tables
    Query {
        #[command(flatten)]
        args: QueryArgs,

        /// Print the raw annotated CSV instead of tables
        #[arg(long, conflicts_with = "json")]
        raw: bool,

        /// Print the parsed result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the preamble a query would be sent with, without running it
    Preamble {
        #[command(flatten)]
        args: QueryArgs,

        /// Print the JSON extern instead of Flux text
        #[arg(long)]
        json: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Query { args, raw, json } => {
            let text = args.text()?;
            let ctx = build_context(&config, &args).await?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupted, cancelling query");
                    on_interrupt.cancel();
                }
            });

            let result = match ctx.query_with_cancel(&text, cancel).await {
                Ok(result) => result,
                Err(e) => {
                    let failed = ParsedResult::failed(&text, &e);
                    if json {
                        println!("{}", serde_json::to_string_pretty(&failed)?);
                    }
                    return Err(e.into());
                }
            };

            if raw {
                print!("{}", result.raw);
            } else if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_tables(&result);
            }
        }

        Commands::Preamble { args, json } => {
            let text = args.text()?;
            let ctx = build_context(&config, &args).await?;
            let Some(composed) = ctx.compose(&text).await? else {
                bail!("time range is not set");
            };

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&composed.preamble.to_extern())?
                );
            } else {
                println!("{}", composed.to_flux());
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("fluxnote={}", logging.level)),
    );
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

impl QueryArgs {
    fn text(&self) -> anyhow::Result<String> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            (None, None) => bail!("no query given; pass the text or --file"),
        }
    }

    fn overrides(&self) -> anyhow::Result<Vec<Variable>> {
        self.vars
            .iter()
            .map(|var| {
                let Some((name, value)) = var.split_once('=') else {
                    bail!("invalid variable '{}', expected name=value", var);
                };
                let name = name.trim();
                if !is_identifier(name) {
                    bail!("invalid variable name '{}'", name);
                }
                Ok(Variable::new(name, Expression::parse_literal(value.trim())))
            })
            .collect()
    }
}

async fn build_context(config: &Config, args: &QueryArgs) -> anyhow::Result<QueryContext> {
    let store = MemoryVariableStore::with_variables(config.variables()?);
    for variable in args.overrides()? {
        store.set(variable).await;
    }

    let range = TimeRange::parse(&args.start, &args.stop).context("invalid time range")?;
    let time = SessionTimeContexts::new();
    time.set(SESSION_ID, range).await;

    let transport = HttpTransport::new(&config.backend)?;
    let ctx = QueryContext::new(
        config.backend.org_id.clone(),
        SESSION_ID,
        Arc::new(store),
        Arc::new(time),
        QueryExecutor::new(Arc::new(transport)),
    )
    .with_window(config.window.detector(), config.window.policy());

    Ok(ctx)
}

fn print_tables(result: &ParsedResult) {
    let Some(parsed) = &result.parsed else {
        return;
    };
    if parsed.is_empty() {
        println!("No results");
        return;
    }
    for table in &parsed.tables {
        println!("{}", table);
    }
    println!("{} tables, {} rows", parsed.tables.len(), parsed.row_count());
}
