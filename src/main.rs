//! Almanac CLI
//!
//! Command-line interface over the trend analytics store:
//! - List known dates and languages
//! - Day listings and range rankings (reappearing, owners, languages,
//!   newcomers, streaks)
//! - Build the presence rollup
//! - Generate a config file

use almanac::query::{
    DayRequest, LanguagesRequest, OwnersRequest, RangeRequest, ReappearingRequest, Tabular,
    DEFAULT_LIMIT,
};
use almanac::query::params::parse_date;
use almanac::{
    build_rollup, generate_default_config, AnalyticsError, Config, Kind, LoggingConfig, QueryConfig,
    QueryEngine, QueryOutput, ResultCache, TrendService,
};
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "almanac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trend analytics over daily GitHub trending rankings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Analytics root, overriding the config file
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Always scan the entry log, even when a rollup exists
    #[arg(long, global = true)]
    no_rollups: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Args)]
struct RangeArgs {
    /// Entity kind (repository, developer)
    #[arg(short, long, default_value = "repository")]
    kind: String,
    /// First day of the range (YYYY-MM-DD)
    #[arg(short, long)]
    start: String,
    /// Last day of the range (YYYY-MM-DD)
    #[arg(short, long)]
    end: String,
    /// Language filter (`__all__` selects the absent-language bucket)
    #[arg(short, long)]
    language: Option<String>,
    /// Count entries of every language bucket, including the absent one
    #[arg(long)]
    include_all_languages: bool,
    /// Maximum number of rows
    #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,
}

impl RangeArgs {
    fn request(&self) -> RangeRequest {
        let mut request = RangeRequest::new(&self.kind, &self.start, &self.end)
            .include_all_languages(self.include_all_languages)
            .limit(self.limit);
        if let Some(language) = &self.language {
            request = request.language(language);
        }
        request
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the dates present for a kind
    Dates {
        #[arg(short, long, default_value = "repository")]
        kind: String,
    },

    /// List the languages present for a kind
    Languages {
        #[arg(short, long, default_value = "repository")]
        kind: String,
    },

    /// Ranked listing of a single day
    Day {
        /// Day to list (YYYY-MM-DD)
        date: String,
        #[arg(short, long, default_value = "repository")]
        kind: String,
        /// Language bucket (default: the absent-language bucket)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Entities present on the most days of a range
    Reappearing {
        #[command(flatten)]
        range: RangeArgs,
        /// Count distinct days (day) or every row (occurrence)
        #[arg(short, long, default_value = "day")]
        presence: String,
    },

    /// Repository owners with the most distinct repositories in a range
    Owners {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Language buckets by entry count over a range
    TopLanguages {
        #[arg(short, long)]
        start: String,
        #[arg(short, long)]
        end: String,
        /// Restrict to one kind (default: both)
        #[arg(short, long)]
        kind: Option<String>,
        #[arg(long)]
        include_all_languages: bool,
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Entities whose first appearance falls inside a range
    Newcomers {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Longest runs of consecutive days on the chart
    Streaks {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Build the presence rollup from the entry log
    BuildRollup {
        /// Kind to build (default: both)
        #[arg(short, long)]
        kind: Option<String>,
        /// Only rebuild partitions from this date's year onwards
        #[arg(long)]
        from: Option<String>,
    },

    /// Print or write a default config file
    Config {
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("almanac={}", config.level)));

    // Logs go to stderr; stdout carries query output
    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(root) = &cli.root {
        config.data.analytics_root = root.to_string_lossy().to_string();
    }
    if cli.no_rollups {
        config.data.use_rollups = false;
    }
    Ok(config)
}

fn build_service(config: &Config) -> anyhow::Result<TrendService> {
    let root = config.data.analytics_root();
    let engine = QueryEngine::new(QueryConfig::new(&root).use_rollups(config.data.use_rollups))
        .with_context(|| format!("failed to open analytics root {}", root.display()))?;
    let cache = ResultCache::new(config.cache.max_size, config.cache.default_ttl());

    Ok(TrendService::new(Arc::new(engine), Arc::new(cache)).with_prewarm(config.cache.prewarm))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            // Bad input and missing data exit 2, everything else 1
            let client_error = err
                .downcast_ref::<AnalyticsError>()
                .is_some_and(AnalyticsError::is_client_error);
            if client_error {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("Wrote default config to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    init_logging(&config.logging);
    tracing::debug!(root = %config.data.analytics_root().display(), "Almanac v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::BuildRollup { kind, from } = &cli.command {
        return run_build_rollup(&config, kind.as_deref(), from.as_deref(), cli.format);
    }

    let service = build_service(&config)?;
    let format = cli.format;

    match cli.command {
        Commands::Dates { kind } => {
            let dates = service.list_dates(&kind)?;
            let rows: Vec<String> = dates.iter().map(|d| d.to_string()).collect();
            print_list("date", &rows, format)?;
        }
        Commands::Languages { kind } => {
            let languages = service.list_languages(&kind)?;
            let rows: Vec<String> = languages
                .into_iter()
                .map(|l| l.unwrap_or_else(|| almanac::query::ALL_LANGUAGES.to_string()))
                .collect();
            print_list("language", &rows, format)?;
        }
        Commands::Day {
            date,
            kind,
            language,
        } => {
            let mut request = DayRequest::new(kind, date);
            if let Some(language) = language {
                request = request.language(language);
            }
            let output = service.get_day(request).await?;
            print_output(&output, format)?;
        }
        Commands::Reappearing { range, presence } => {
            let mut request = ReappearingRequest::new(&range.kind, &range.start, &range.end)
                .presence(presence)
                .include_all_languages(range.include_all_languages)
                .limit(range.limit);
            if let Some(language) = &range.language {
                request = request.language(language);
            }
            let output = service.top_reappearing(request).await?;
            print_output(&output, format)?;
        }
        Commands::Owners { range } => {
            let mut request = OwnersRequest::new(&range.start, &range.end)
                .include_all_languages(range.include_all_languages)
                .limit(range.limit);
            if let Some(language) = &range.language {
                request = request.language(language);
            }
            let output = service.top_owners(request).await?;
            print_output(&output, format)?;
        }
        Commands::TopLanguages {
            start,
            end,
            kind,
            include_all_languages,
            limit,
        } => {
            let mut request = LanguagesRequest::new(start, end)
                .include_all_languages(include_all_languages)
                .limit(limit);
            if let Some(kind) = kind {
                request = request.kind(kind);
            }
            let output = service.top_languages(request).await?;
            print_output(&output, format)?;
        }
        Commands::Newcomers { range } => {
            let output = service.top_newcomers(range.request()).await?;
            print_output(&output, format)?;
        }
        Commands::Streaks { range } => {
            let output = service.top_streaks(range.request()).await?;
            print_output(&output, format)?;
        }
        Commands::BuildRollup { .. } | Commands::Config { .. } => {}
    }

    service.drain_prewarm().await;
    let stats = service.cache().stats();
    tracing::debug!(
        hits = stats.hits,
        misses = stats.misses,
        prewarm_success = stats.prewarm_success,
        prewarm_failure = stats.prewarm_failure,
        "Cache stats"
    );

    Ok(())
}

fn run_build_rollup(
    config: &Config,
    kind: Option<&str>,
    from: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let kinds = match kind {
        Some(kind) => vec![kind.parse::<Kind>()?],
        None => Kind::all().to_vec(),
    };
    let from = from.map(parse_date).transpose()?;
    let root = config.data.analytics_root();

    let mut summaries = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let summary = build_rollup(&root, kind, from)
            .with_context(|| format!("rollup build failed for {}", kind))?;
        summaries.push(summary);
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Table | OutputFormat::Csv => {
            for summary in &summaries {
                println!(
                    "{}: {} rows in {} partitions",
                    summary.kind,
                    summary.rows,
                    summary.partitions.len()
                );
                for path in &summary.partitions {
                    println!("  {}", path.display());
                }
            }
        }
    }
    Ok(())
}

fn print_output(output: &QueryOutput, format: OutputFormat) -> anyhow::Result<()> {
    match output {
        QueryOutput::Day(rows) => print_rows(rows, format),
        QueryOutput::Reappearing(rows) => print_rows(rows, format),
        QueryOutput::Owners(rows) => print_rows(rows, format),
        QueryOutput::Languages(rows) => print_rows(rows, format),
        QueryOutput::Newcomers(rows) => print_rows(rows, format),
        QueryOutput::Streaks(rows) => print_rows(rows, format),
    }
}

fn print_rows<T: Tabular + Serialize>(rows: &[T], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    let Some(first) = rows.first() else {
        if format == OutputFormat::Table {
            println!("No data for the selected range");
        }
        return Ok(());
    };

    let headers = first.headers();
    let cells: Vec<Vec<String>> = rows.iter().map(Tabular::cells).collect();

    match format {
        OutputFormat::Csv => print_csv(&headers, &cells),
        _ => {
            print_table(&headers, &cells);
            Ok(())
        }
    }
}

fn print_list(header: &'static str, rows: &[String], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Csv => {
            let cells: Vec<Vec<String>> = rows.iter().map(|r| vec![r.clone()]).collect();
            print_csv(&[header], &cells)?;
        }
        OutputFormat::Table => {
            for row in rows {
                println!("{}", row);
            }
        }
    }
    Ok(())
}

fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_line.join(" | "));

    // Separator
    let total: usize = widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1);
    println!("{}", "-".repeat(total));

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = w))
            .collect();
        println!("{}", line.join(" | "));
    }
}

fn print_csv(headers: &[&str], rows: &[Vec<String>]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
