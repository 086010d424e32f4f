use anyhow::{Context, Result};
use clap::Parser;
use cointracking_client::{CointrackingClient, CointrackingConfig, GainsQuery, TradesQuery};
use trades::to_pretty_json;

/// Pulls trades, balances and gains from the CoinTracking API and pretty-prints them.
#[derive(Debug, Parser)]
#[command(
    name = "display-data",
    author,
    version,
    about = "Pretty-print everything the CoinTracking API returns",
    long_about = None
)]
struct Args {
    /// Also fetch the (large) historical summary and currency series
    #[arg(long = "history")]
    history: bool,
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::parse();

    dotenvy::dotenv().ok();
    let config = CointrackingConfig::from_env()?;
    let client =
        CointrackingClient::new(config).context("Failed to initialize CoinTracking client")?;

    print_section(&client.get_trades(&TradesQuery::default())?)?;
    print_section(&client.get_balance()?)?;

    if args.history {
        print_section(&client.get_historical_summary(None, None, None)?)?;
        print_section(&client.get_historical_currency(None, None, None)?)?;
    }

    print_section(&client.get_grouped_balance(None, None, None)?)?;
    print_section(&client.get_gains(&GainsQuery::default())?)?;

    Ok(())
}

fn print_section(data: &serde_json::Value) -> Result<()> {
    println!("{}", "#".repeat(120));
    println!("{}", to_pretty_json(data)?);
    Ok(())
}
