// src/cli.rs
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

#[derive(Parser, Debug)]
#[command(name = "the_guardian")]
#[command(
    version,
    about = "Prediction-driven auto-trading agent with shutdown protection",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the agent until Ctrl+C, then place the protective stop (default)
    Run {
        /// Overrides `agent.symbol` from the configuration
        symbol: Option<String>,
    },
    /// Place a stop-loss and a take-profit order against an open position
    Protect {
        symbol: String,
        /// Fraction, e.g. 0.05 for 5%
        #[arg(long)]
        stop_loss: Option<Decimal>,
        /// Fraction, e.g. 0.10 for 10%
        #[arg(long)]
        take_profit: Option<Decimal>,
    },
    /// Close the whole position with a market order
    EmergencySell { symbol: String },
    /// Cancel every open order for a symbol
    CancelOrders { symbol: String },
    /// List open positions
    Positions,
}
