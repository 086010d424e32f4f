use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use trades::{read_grouped_days, write_grouped_days, DayGroupingSummary};

/// Groups trades that occur on the same day. Rows are merged when they have
/// the same currency pair, the same exchange and the same date.
///
/// Works on a CSV trade list, not the API. Useful for reporting margin trades:
/// https://cointracking.freshdesk.com/en/support/solutions/articles/29000018275-margin-trades-profit-determination
///
/// Expected columns (select them in the "Trade List"):
///   Buy amount, Buy currency, Buy in EUR, Sell amount, Sell currency, Sell in EUR, Exchange, Date
/// optionally followed by: Fee amount, Fee currency, Group, Comment, Tx-ID
///
/// The output has the same format.
#[derive(Debug, Parser)]
#[command(
    name = "group-by-day",
    author,
    version,
    about = "Merge same-day trades of a CoinTracking CSV trade list",
    long_about = None
)]
struct Args {
    /// Trade list CSV, sorted by date
    csv_in: PathBuf,

    /// Where to write the grouped CSV
    csv_out: PathBuf,
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::parse();

    let summary = run(&args)?;

    println!("{}", summary.header.join(","));
    println!("Exported {} records.", summary.records_written);

    Ok(())
}

/// The output file is only created once the whole input has been folded.
fn run(args: &Args) -> Result<DayGroupingSummary> {
    let input = File::open(&args.csv_in)
        .with_context(|| format!("Cannot open {}", args.csv_in.display()))?;
    let grouped = read_grouped_days(input)
        .with_context(|| format!("Cannot group {}", args.csv_in.display()))?;

    let output = File::create(&args.csv_out)
        .with_context(|| format!("Cannot write {}", args.csv_out.display()))?;
    write_grouped_days(&grouped, BufWriter::new(output))
}
