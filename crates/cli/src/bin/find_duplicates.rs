use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use trades::{duplicate_report, load_trades_from_file, to_pretty_json};

/// Finds duplicate entries in a CoinTracking trade export.
///
/// Useful for spotting mistakes in manually added deposits/withdrawals, although
/// exchanges can also produce identical trades naturally. Add `dupok` to an
/// entry's comment to accept it as a duplicate.
///
/// Works on a JSON export (see `export_trades`) as the API has low request limits.
#[derive(Debug, Parser)]
#[command(
    name = "find-duplicates",
    author,
    version,
    about = "Find duplicate trades in a CoinTracking export",
    long_about = None
)]
struct Args {
    /// JSON export of getTrades (a .csv trade list also works)
    json_file: PathBuf,
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

    let report = duplicate_report(&outcome.trades);

    if report.has_duplicates() {
        println!("{}", to_pretty_json(&report.duplicates)?);
    }

    println!("Checked {} transactions.", report.checked);
    println!("Found {} duplicates.", report.duplicates.len());

    Ok(())
}
