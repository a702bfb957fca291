//! Ledger CLI
//!
//! Runs one report query or action against the ledger database and the
//! configured LND node, printing the result as JSON on stdout.
//!
//! Usage:
//!   ledgerctl daily [YYYY-MM-DD]          produce the row for a day (default: yesterday)
//!   ledgerctl live [HOURS]                today so far, or the trailing HOURS
//!   ledgerctl range KEY                   stored rows for d-1|month|quarter|6m|year|all
//!   ledgerctl summary KEY                 totals and daily means for KEY
//!   ledgerctl custom START END            stored rows between two dates
//!   ledgerctl custom-summary START END    totals and daily means between two dates
//!   ledgerctl backfill START END          produce rows for every day in a range
//!   ledgerctl events [LIMIT]              most recent ledger events (default: 50)
//!
//! Reads the same environment variables as `ledgerd`. When the database
//! cannot be opened, `live` still answers from the node and every other
//! command fails with "storage unavailable".

use dotenv::dotenv;
use lnledger::config::LedgerConfig;
use lnledger::db::Database;
use lnledger::metrics::MetricsAggregator;
use lnledger::node::lnd_rest::LndRestClient;
use lnledger::notifier::EventStore;
use lnledger::reports::{report_sources, ReportError, ReportService};
use lnledger::system_clock;
use lnledger::timerange::{parse_date, yesterday, RangeKey};
use serde::Serialize;
use std::env;
use std::sync::Arc;

const USAGE: &str = "usage: ledgerctl <daily [DATE] | live [HOURS] | range KEY | summary KEY | \
     custom START END | custom-summary START END | backfill START END | events [LIMIT]>";

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn arg<'a>(args: &'a [String], idx: usize, name: &str) -> Result<&'a str, Box<dyn std::error::Error>> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| format!("missing {}\n{}", name, USAGE).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = LedgerConfig::from_env()?;
    // Live queries only need the node
    let db = match Database::open(&config.db_path) {
        Ok(db) => Some(db),
        Err(e) => {
            log::error!("❌ Failed to open database {}: {}", config.db_path, e);
            None
        }
    };

    if command == "events" {
        let limit = match args.get(1) {
            Some(raw) => raw.parse()?,
            None => 50,
        };
        let db = db.ok_or(ReportError::StorageUnavailable)?;
        let notifier_config = config.notifier();
        let events = EventStore::new(
            db,
            notifier_config.retention,
            notifier_config.cleanup_interval,
            system_clock(),
        );
        return print_json(&events.list(limit)?);
    }

    let node = Arc::new(LndRestClient::new(&config.lnd())?);
    let (reports, events) = report_sources(
        db,
        config.notifier_enabled.then(|| config.notifier()),
        system_clock(),
    );
    let service = ReportService::new(
        Arc::new(MetricsAggregator::new(node, config.aggregator())),
        reports,
        events,
        config.reports(),
        system_clock(),
    );

    match command {
        "daily" => {
            let date = match args.get(1) {
                Some(raw) => parse_date(raw)?,
                None => yesterday(service.now(), config.timezone),
            };
            print_json(&service.run_daily(date).await?)
        }
        "live" => {
            let hours = args.get(1).map(|raw| raw.parse::<u32>()).transpose()?;
            print_json(&service.live(hours).await?)
        }
        "range" => {
            let key: RangeKey = arg(&args, 1, "KEY")?.parse()?;
            print_json(&service.range(key)?)
        }
        "summary" => {
            let key: RangeKey = arg(&args, 1, "KEY")?.parse()?;
            print_json(&service.summary(key)?)
        }
        "custom" => {
            let start = parse_date(arg(&args, 1, "START")?)?;
            let end = parse_date(arg(&args, 2, "END")?)?;
            print_json(&service.custom_range(start, end)?)
        }
        "custom-summary" => {
            let start = parse_date(arg(&args, 1, "START")?)?;
            let end = parse_date(arg(&args, 2, "END")?)?;
            print_json(&service.custom_summary(start, end)?)
        }
        "backfill" => {
            let start = parse_date(arg(&args, 1, "START")?)?;
            let end = parse_date(arg(&args, 2, "END")?)?;
            print_json(&service.backfill(start, end).await?)
        }
        other => Err(format!("unknown command {:?}\n{}", other, USAGE).into()),
    }
}
