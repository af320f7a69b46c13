use std::env;
use std::error::Error;

use anyhow::anyhow;
use clap::Parser;
use tracing::debug;

use beadloom::dialogue::parse_pattern;
use beadloom::fit::{fit, FitRequest};
use beadloom::lang::Language;

/// One-shot bead-count calculator, bypassing the bot dialogue.
#[derive(Debug, clap::Parser, Clone)]
struct Args {
    /// wrist circumference in centimeters
    wrist_cm: f64,

    /// number of wraps around the wrist
    wraps: u32,

    /// bead pattern in millimeters, e.g. "10;8"
    pattern: String,

    /// magnet (clasp) size in millimeters
    magnet_mm: f64,

    /// length tolerance in millimeters
    #[clap(short, long, default_value_t = 5.0)]
    tolerance: f64,

    /// output language: ru or en
    #[clap(short, long, default_value = "ru")]
    lang: Language,
}

fn main() -> Result<(), Box<dyn Error>> {
    if env::var("RUST_BACKTRACE").is_err() {
        env::set_var("RUST_BACKTRACE", "full")
    }
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    debug!("args: {args:?}");

    let pattern =
        parse_pattern(&args.pattern).ok_or_else(|| anyhow!("unusable pattern {:?}", args.pattern))?;
    let outcome = fit(&FitRequest {
        wrist_cm: args.wrist_cm,
        wraps: args.wraps,
        pattern,
        magnet_mm: args.magnet_mm,
        tolerance_mm: args.tolerance,
        language: args.lang,
    })?;
    debug!(
        "realized {} mm against target {} mm in {} correction rounds",
        outcome.realized_mm, outcome.target_mm, outcome.corrections
    );
    println!("{}", outcome.text);
    Ok(())
}
