//! Cubedag CLI
//!
//! Command-line interface for the cube engine:
//! - Run a query over a CSV file
//! - Explain the DAG of a query
//! - Validate a measure file
//! - Generate a default config file

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use cubedag::config::{generate_default_config, Config, LoggingConfig};
use cubedag::dag::{CubeQuery, DagBuilder, QueryOption};
use cubedag::engine::{CubeEngine, ExecutionContext};
use cubedag::filter::parse_filter;
use cubedag::measure::MeasureForest;
use cubedag::slice::GroupBy;
use cubedag::table::InMemoryTable;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "cubedag")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate measure DAGs over tabular data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a query over a CSV file
    Query {
        #[command(flatten)]
        query: QueryArgs,
        /// CSV file holding the table
        #[arg(short, long)]
        table: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Print the DAG of a query without running it
    Explain {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Check a measure file
    Validate {
        /// Measure file (TOML)
        measures: PathBuf,
    },

    /// Generate default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct QueryArgs {
    /// Measure file (TOML)
    #[arg(short, long)]
    measures: PathBuf,
    /// Measures to compute
    #[arg(required = true)]
    names: Vec<String>,
    /// Filter expression, e.g. "country = 'FR' and size >= 3"
    #[arg(short, long)]
    filter: Option<String>,
    /// Grouping columns (comma-separated or repeated)
    #[arg(short, long, value_delimiter = ',')]
    group_by: Vec<String>,
    /// Query options
    #[arg(short, long, value_enum)]
    option: Vec<OptionArg>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OptionArg {
    UnknownMeasuresAreEmpty,
    Explain,
    Debug,
    NoCache,
    Sequential,
}

impl From<OptionArg> for QueryOption {
    fn from(option: OptionArg) -> Self {
        match option {
            OptionArg::UnknownMeasuresAreEmpty => QueryOption::UnknownMeasuresAreEmpty,
            OptionArg::Explain => QueryOption::Explain,
            OptionArg::Debug => QueryOption::Debug,
            OptionArg::NoCache => QueryOption::NoCache,
            OptionArg::Sequential => QueryOption::Sequential,
        }
    }
}

impl QueryArgs {
    fn load(&self) -> anyhow::Result<(MeasureForest, CubeQuery)> {
        let forest = MeasureForest::from_toml_file(&self.measures)
            .with_context(|| format!("loading measures from {:?}", self.measures))?;

        let mut builder = CubeQuery::builder()
            .measures(self.names.iter().map(String::as_str))
            .group_by(GroupBy::of(self.group_by.iter().map(String::as_str)));
        if let Some(filter) = &self.filter {
            builder = builder.filter(parse_filter(filter).context("parsing filter")?);
        }
        for option in &self.option {
            builder = builder.option((*option).into());
        }

        Ok((forest, builder.build()))
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("cubedag={}", config.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Query {
            query,
            table,
            format,
        } => {
            let (forest, query) = query.load()?;
            let table = InMemoryTable::from_csv_path("csv", &table)?.with_config(&config.table);
            tracing::info!(rows = table.len(), measures = forest.len(), "Loaded inputs");

            let engine = CubeEngine::new(Arc::new(forest), Arc::new(table), &config);
            let context = ExecutionContext::new();
            let cancellation = context.cancellation().clone();
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancellation.cancel();
                }
            });

            let result = engine.execute_with(&query, context).await;
            ctrl_c.abort();
            let result = result?;

            match format {
                OutputFormat::Table => {
                    print!("{}", result.to_table_string());
                    if let Some(explain) = &result.explain {
                        println!();
                        print!("{}", explain);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
            if result.cancelled {
                eprintln!("Query cancelled; results are incomplete");
            }
        }

        Commands::Explain { query } => {
            let (forest, mut query) = query.load()?;
            if config.engine.unknown_measures_are_empty {
                query.options.insert(QueryOption::UnknownMeasuresAreEmpty);
            }
            let dag = DagBuilder::build(&forest, &query)?;
            print!("{}", dag.explain());
        }

        Commands::Validate { measures } => {
            let forest = MeasureForest::from_toml_file(&measures)?;
            println!("Forest '{}': {} measures", forest.name(), forest.len());

            let mut failures = 0usize;
            for name in forest.names() {
                let Some(measure) = forest.get(name) else { continue };
                let query = CubeQuery::builder().measure(name).build();
                match DagBuilder::build(&forest, &query) {
                    Ok(dag) => println!("  {:<24} {} ({} steps)", name, measure, dag.len()),
                    Err(e) => {
                        failures += 1;
                        println!("  {:<24} ERROR: {}", name, e);
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{} of {} measures failed to resolve", failures, forest.len());
            }
        }

        Commands::InitConfig { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}
