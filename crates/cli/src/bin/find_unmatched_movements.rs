use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use trades::{load_trades_from_file, reconcile_movements, to_pretty_json};

/// Finds deposits/withdrawals without a matching entry in the other direction,
/// i.e. checks the double-entry bookkeeping of transfers between accounts.
///
/// Works on a JSON export (see `export_trades`) as the API has low request limits.
#[derive(Debug, Parser)]
#[command(
    name = "find-unmatched-movements",
    author,
    version,
    about = "Find deposits/withdrawals without a counterpart",
    long_about = None
)]
struct Args {
    /// JSON export of getTrades (a .csv trade list also works)
    json_file: PathBuf,

    /// Also print the candidates of ambiguous movements
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::parse();

    let outcome = load_trades_from_file(&args.json_file)?;
    tracing::info!(
        loaded = outcome.trades.len(),
        rejected = outcome.rejected.len(),
        "read {}",
        args.json_file.display()
    );
    if !outcome.rejected.is_empty() {
        tracing::warn!("Skipped {} unexpected records.", outcome.rejected.len());
    }

    let report = reconcile_movements(&outcome.trades);

    for movement in &report.unmatched {
        println!("Found no match for the following movement:");
        println!("{}", to_pretty_json(movement)?);
    }

    for ambiguous in &report.ambiguous {
        println!("Found too many matches for the movement.");
        println!("Check for duplicates!");
        if args.verbose {
            println!("{}", to_pretty_json(ambiguous)?);
        }
    }

    println!("Checked {} transactions.", report.checked);
    println!("Found {} unmatched movements.", report.unmatched_count());

    Ok(())
}
