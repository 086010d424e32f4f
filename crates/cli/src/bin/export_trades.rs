use anyhow::{Context, Result};
use clap::Parser;
use cointracking_client::{CointrackingClient, CointrackingConfig, TradeOrder, TradesQuery};
use std::path::PathBuf;
use trades::{count_entries, write_json_file};

/// Exports all trades from CoinTracking into a JSON file.
///
/// The file holds the raw `getTrades` response and is NOT compatible with the
/// JSON export from the CoinTracking website.
///
/// Credentials come from `COINTRACKING_API_KEY` / `COINTRACKING_API_SECRET`
/// (a `.env` file is honoured).
#[derive(Debug, Parser)]
#[command(
    name = "export-trades",
    author,
    version,
    about = "Export all CoinTracking trades to a JSON file",
    long_about = None
)]
struct Args {
    /// Output JSON file
    json_file: PathBuf,

    /// Only export the newest/oldest N trades
    #[arg(long = "limit")]
    limit: Option<u32>,

    /// Only trades after this unix time
    #[arg(long = "start")]
    start_time: Option<i64>,

    /// Only trades before this unix time
    #[arg(long = "end")]
    end_time: Option<i64>,

    /// Newest first
    #[arg(long = "desc")]
    desc: bool,
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::parse();

    dotenvy::dotenv().ok();
    let config = CointrackingConfig::from_env()?;
    let client =
        CointrackingClient::new(config).context("Failed to initialize CoinTracking client")?;

    let query = TradesQuery {
        limit: args.limit,
        order: args.desc.then_some(TradeOrder::Desc),
        start_time: args.start_time,
        end_time: args.end_time,
    };
    let all_trades = client.get_trades(&query)?;

    write_json_file(&args.json_file, &all_trades)
        .with_context(|| format!("Cannot write {}", args.json_file.display()))?;

    println!("Success. Exported {} items.", count_entries(&all_trades));
    Ok(())
}
