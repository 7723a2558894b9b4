// src/main.rs
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::connectors::alpaca::AlpacaClient;
use crate::connectors::oracle::HttpPriceOracle;
use crate::core::controller::AgentController;
use crate::core::Services;
use crate::notify::BroadcastNotifier;
use crate::types::AgentPhase;
use clap::Parser;
use dotenvy::dotenv;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod connectors;
mod core;
mod error;
mod notify;
mod strategies;
#[cfg(test)]
mod testing;
mod types;
mod utils;

/// Console plus a daily-rolled file under `LOG_DIR` (default `logs`).
/// The returned guard flushes the file writer when dropped.
fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,the_guardian=debug,reqwest=warn"));

    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let file_appender = tracing_appender::rolling::daily(&log_dir, "guardian.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_logging();

    // 1. Load Configuration
    let config = AppConfig::new()?;
    let symbol = match &cli.command {
        Some(Commands::Run { symbol: Some(symbol) }) => symbol.clone(),
        _ => config.agent.symbol.clone(),
    };

    println!("========================================");
    println!("       THE GUARDIAN - v0.1.0");
    println!("========================================");
    println!("Target: {}", symbol);
    println!(
        "Mode:   {}",
        if config.broker.paper {
            "📝 PAPER TRADING"
        } else {
            "🚨 LIVE TRADING"
        }
    );
    println!("Oracle: {}", config.oracle.base_url);
    println!("========================================");

    if config.broker.api_key.is_empty() || config.broker.api_secret.is_empty() {
        warn!("ALPACA_API_KEY / ALPACA_API_SECRET not set; broker calls will be rejected");
    }

    // 2. Initialize Components
    let call_timeout = config.agent.call_timeout();
    let broker = AlpacaClient::new(
        config.broker.api_key.clone(),
        config.broker.api_secret.clone(),
        config.broker.paper,
        call_timeout,
    )?;
    let oracle = HttpPriceOracle::new(&config.oracle.base_url, call_timeout)?;
    let notifier = Arc::new(BroadcastNotifier::new(256));

    // 3. Status feed printer
    let mut feed = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(event) => println!("[{}] {}", event.timestamp.format("%H:%M:%S"), event.message),
                Err(RecvError::Lagged(skipped)) => warn!("Status feed dropped {} lines", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let services = Services {
        oracle: Arc::new(oracle),
        broker: Arc::new(broker),
        notifier,
    };
    let controller = AgentController::new(config.agent.clone(), services);

    // 4. Dispatch
    match cli.command {
        None | Some(Commands::Run { .. }) => run_agent(&controller, &symbol).await,
        Some(Commands::Protect {
            symbol,
            stop_loss,
            take_profit,
        }) => print_json(&controller.protect(&symbol, stop_loss, take_profit).await),
        Some(Commands::EmergencySell { symbol }) => {
            print_json(&controller.emergency_sell(&symbol).await)
        }
        Some(Commands::CancelOrders { symbol }) => {
            print_json(&controller.cancel_orders(&symbol).await)
        }
        Some(Commands::Positions) => print_json(&controller.positions().await),
    }
}

fn print_json<T: Serialize>(response: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

async fn run_agent(controller: &AgentController, symbol: &str) -> anyhow::Result<()> {
    let started = controller.start(symbol).await;
    if !started.is_success() {
        anyhow::bail!("{}", started.message);
    }

    let mut phase = controller.phase();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Ctrl+C received, stopping agent...");
        }
        _ = phase.wait_for(|p| *p == AgentPhase::Stopped) => {
            warn!("Agent loop exited on its own");
        }
    }

    // 5. Shutdown (places the protective stop when a position is open)
    let stopped = controller.stop().await;
    match serde_json::to_string(&stopped) {
        Ok(json) => info!("Stop result: {}", json),
        Err(e) => error!("Could not encode stop result: {}", e),
    }

    let status = controller.status().await;
    info!("Final status: {:?}", status);
    Ok(())
}
