//! StockData CLI: fetch, normalize and store exchange quotes.
//!
//! Commands:
//! - `stream`: run a pipeline profile for one exchange and store the table
//! - `symbols import`: load the symbol registry from a CSV file
//! - `symbols list`: show which symbols a selection resolves to
//! - `details`: scrape security details for listed symbols
//! - `quote`: print the latest quote for one symbol

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::debug;
use std::path::{Path, PathBuf};
use stockdata_core::data::{
    QuoteProvider, SecurityDetailsClient, Selection, SymbolSource, YahooChartClient,
};
use stockdata_core::domain::Exchange;
use stockdata_runner::{
    build_registry, build_sink, run_details, run_pipeline, Config, RunOutcome, RunRequest,
    RunSummary, DEFAULT_PROFILE,
};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "stockdata.toml";

#[derive(Parser)]
#[command(
    name = "stockdata",
    about = "StockData CLI: exchange quotes fetched, normalized and stored"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch intraday quotes for an exchange and append them to its table.
    Stream {
        /// Pipeline profile (built in: intraday, stream).
        #[arg(long, default_value = DEFAULT_PROFILE)]
        profile: String,

        /// Exchange code: NSE or BSE.
        #[arg(long)]
        exchange: String,

        /// As-of date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,

        /// Maximum number of symbols; 0 means all.
        #[arg(long, default_value_t = 0)]
        limit: i64,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Symbol registry commands.
    Symbols {
        #[command(subcommand)]
        action: SymbolsAction,
    },
    /// Scrape security details for listed symbols into the details table.
    Details {
        /// Exchange code: NSE or BSE.
        #[arg(long)]
        exchange: String,

        /// Maximum number of symbols; 0 means all.
        #[arg(long, default_value_t = 0)]
        limit: i64,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the latest complete quote for a symbol.
    Quote {
        /// Symbol, e.g. RELIANCE.NS (or RELIANCE with --exchange).
        symbol: String,

        /// Append this exchange's suffix to the symbol.
        #[arg(long)]
        exchange: Option<String>,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SymbolsAction {
    /// Replace the registry with a CSV: a `symbol` column plus 0/1 flag columns.
    Import {
        csv: PathBuf,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the symbols a selection resolves to.
    List {
        /// Exchange code: NSE or BSE.
        #[arg(long)]
        exchange: String,

        /// Maximum number of symbols; 0 means all.
        #[arg(long, default_value_t = 0)]
        limit: i64,

        /// Index basket flag (repeatable). Without it, symbols listed on the exchange.
        #[arg(long = "basket")]
        baskets: Vec<String>,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Stream {
            profile,
            exchange,
            date,
            limit,
            config,
        } => run_stream(config.as_deref(), &profile, &exchange, date.as_deref(), limit),
        Commands::Symbols { action } => match action {
            SymbolsAction::Import { csv, config } => run_symbols_import(config.as_deref(), &csv),
            SymbolsAction::List {
                exchange,
                limit,
                baskets,
                config,
            } => run_symbols_list(config.as_deref(), &exchange, limit, baskets),
        },
        Commands::Details {
            exchange,
            limit,
            config,
        } => run_details_cmd(config.as_deref(), &exchange, limit),
        Commands::Quote {
            symbol,
            exchange,
            config,
        } => run_quote(config.as_deref(), &symbol, exchange.as_deref()),
    }
}

/// `info` by default; `RUST_LOG` overrides.
fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => PathBuf::from(DEFAULT_CONFIG_FILE),
        None => {
            debug!("no config file, using defaults");
            return Ok(Config::default());
        }
    };
    debug!("loading config from {}", path.display());
    Config::from_file(&path).with_context(|| format!("loading {}", path.display()))
}

fn parse_exchange(code: &str) -> Result<Exchange> {
    Ok(code.parse::<Exchange>()?)
}

fn parse_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --date '{s}' (expected YYYY-MM-DD)")),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn run_stream(
    config_path: Option<&Path>,
    profile_name: &str,
    exchange: &str,
    date: Option<&str>,
    limit: i64,
) -> Result<()> {
    // Fail on bad arguments before opening anything.
    let exchange = parse_exchange(exchange)?;
    let as_of = parse_date(date)?;
    let config = load_config(config_path)?;
    let profile = config.profile(profile_name)?;

    let registry = build_registry(&config.storage, profile.selection.clone());
    let provider = YahooChartClient::new(&config.provider)?;
    let sink = build_sink(&config.storage);

    let request = RunRequest::new(exchange, as_of, limit);
    match run_pipeline(
        &config,
        profile_name,
        &registry,
        &provider,
        sink.as_ref(),
        request,
    )? {
        RunOutcome::Stored(summary) => print_summary(&summary),
        RunOutcome::NoData {
            symbols, failed, ..
        } => {
            println!("No data for {exchange} {as_of}: {failed} of {symbols} symbols failed.");
        }
    }
    Ok(())
}

fn run_symbols_import(config_path: Option<&Path>, csv: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = build_registry(&config.storage, Selection::Listed);
    let count = registry
        .import_csv(csv)
        .with_context(|| format!("importing {}", csv.display()))?;
    println!(
        "Imported {count} symbols into {}",
        registry.path().display()
    );
    Ok(())
}

fn run_symbols_list(
    config_path: Option<&Path>,
    exchange: &str,
    limit: i64,
    baskets: Vec<String>,
) -> Result<()> {
    let exchange = parse_exchange(exchange)?;
    let config = load_config(config_path)?;
    let selection = if baskets.is_empty() {
        Selection::Listed
    } else {
        Selection::IndexBaskets(baskets)
    };

    let registry = build_registry(&config.storage, selection);
    let symbols = registry.resolve(exchange, limit)?;
    for symbol in &symbols {
        println!("{symbol}");
    }
    println!("{} symbols", symbols.len());
    Ok(())
}

fn run_details_cmd(config_path: Option<&Path>, exchange: &str, limit: i64) -> Result<()> {
    let exchange = parse_exchange(exchange)?;
    let config = load_config(config_path)?;

    let registry = build_registry(&config.storage, Selection::Listed);
    let client = SecurityDetailsClient::new(&config.provider)?;
    let sink = build_sink(&config.storage);

    let request = RunRequest::new(exchange, chrono::Local::now().date_naive(), limit);
    let summary = run_details(&config, &registry, &client, sink.as_ref(), request)?;
    println!(
        "Details: {} rows into {} ({} of {} lookups failed)",
        summary.rows, summary.table, summary.failed, summary.symbols
    );
    Ok(())
}

fn run_quote(config_path: Option<&Path>, symbol: &str, exchange: Option<&str>) -> Result<()> {
    let symbol = match exchange {
        Some(code) => parse_exchange(code)?.qualify(symbol),
        None => symbol.to_string(),
    };
    let config = load_config(config_path)?;
    let client = YahooChartClient::new(&config.provider)?;

    let quote = client.latest_quote(&symbol)?;
    let at = chrono::DateTime::from_timestamp(quote.timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| quote.timestamp.to_string());

    println!("=== {} ===", symbol.to_uppercase());
    println!("Time:    {at}");
    println!("Open:    {:.2}", quote.open);
    println!("High:    {:.2}", quote.high);
    println!("Low:     {:.2}", quote.low);
    println!("Close:   {:.2}", quote.close);
    println!("Volume:  {:.0}", quote.volume);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("=== Run Summary ===");
    println!("Profile:   {}", summary.profile);
    println!("Exchange:  {}", summary.exchange);
    println!("As of:     {}", summary.as_of);
    println!("Table:     {}", summary.table);
    println!(
        "Symbols:   {} ({} ok, {} failed)",
        summary.symbols, summary.succeeded, summary.failed
    );
    println!("Rows:      {}", summary.rows);
    println!(
        "Hash:      {}",
        summary.content_hash.get(..16).unwrap_or(&summary.content_hash)
    );
    println!("Elapsed:   {:.2?}", summary.elapsed);
}
