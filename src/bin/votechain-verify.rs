#![forbid(unsafe_code)]
//! Check a chain snapshot for structural integrity

use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use votechain::blockchain::{Block, ValidityReport};
use votechain::error::Result;
use votechain::miner::leading_zero_nibbles;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Snapshot JSON file (a block array); reads stdin when omitted
    snapshot: Option<PathBuf>,

    /// Also report blocks whose digest does not meet this difficulty
    #[arg(long)]
    difficulty: Option<u32>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn read_snapshot(path: Option<&PathBuf>) -> Result<Vec<Block>> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let blocks = match read_snapshot(cli.snapshot.as_ref()) {
        Ok(blocks) => blocks,
        Err(e) => {
            eprintln!("error: cannot read snapshot: {}", e);
            return ExitCode::from(2);
        }
    };

    let report = ValidityReport::from_result(blocks.len(), votechain::blockchain::validate_chain(&blocks));

    // Proof-of-work is not part of structural validity; report it separately.
    let below_difficulty: Vec<u64> = match cli.difficulty {
        Some(d) => blocks
            .iter()
            .filter(|b| !b.is_genesis() && leading_zero_nibbles(&b.hash) < d)
            .map(|b| b.index)
            .collect(),
        None => Vec::new(),
    };

    if cli.json {
        let out = serde_json::json!({ "report": report, "below_difficulty": below_difficulty });
        println!("{}", out);
    } else {
        match (&report.first_invalid_index, &report.error) {
            (Some(index), Some(error)) => println!("INVALID: {} at block {} ({} blocks)", error, index, report.length),
            _ => println!("VALID: {} blocks", report.length),
        }
        if !below_difficulty.is_empty() {
            println!("blocks below difficulty: {:?}", below_difficulty);
        }
    }

    if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
