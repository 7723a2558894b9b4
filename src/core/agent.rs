// src/core/agent.rs
use crate::config::AgentConfig;
use crate::core::protect::ProtectiveOrderCoordinator;
use crate::core::wait::{wait_for_oracle, Availability, CancelToken};
use crate::core::Services;
use crate::error::{with_timeout, Result};
use crate::strategies::prediction::fractional_change;
use crate::strategies::traits::Strategy;
use crate::types::{AgentPhase, Decision, Order, PricePoint};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How a loop run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// The oracle never came up; nothing was traded or protected.
    StartupFailed,
    /// Shut down normally. Carries the protective order id if one was placed.
    Stopped { protective_order: Option<String> },
    /// Shut down, but placing the protective order failed.
    ProtectionFailed { error: String },
}

enum Step {
    Continue,
    Shutdown,
}

/// One trading agent bound to a single symbol. Consumed by [`AgentLoop::run`].
pub struct AgentLoop<S> {
    symbol: String,
    config: AgentConfig,
    services: Services,
    coordinator: ProtectiveOrderCoordinator,
    strategy: S,
    cancel: CancelToken,
    phase: Arc<watch::Sender<AgentPhase>>,
}

impl<S> AgentLoop<S>
where
    S: Strategy,
{
    pub fn new(
        symbol: String,
        config: AgentConfig,
        services: Services,
        strategy: S,
        cancel: CancelToken,
        phase: Arc<watch::Sender<AgentPhase>>,
    ) -> Self {
        let coordinator = services.coordinator(&config);
        Self {
            symbol,
            config,
            services,
            coordinator,
            strategy,
            cancel,
            phase,
        }
    }

    fn notify(&self, message: &str) {
        self.services.notifier.publish(message);
    }

    fn set_phase(&self, phase: AgentPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            info!("Agent phase: {} -> {}", previous, phase);
        }
    }

    async fn pause(&mut self, duration: Duration) -> Step {
        if self.cancel.sleep(duration).await {
            Step::Continue
        } else {
            Step::Shutdown
        }
    }

    fn checkpoint(&self) -> Option<Step> {
        self.cancel.is_cancelled().then_some(Step::Shutdown)
    }

    pub async fn run(mut self) -> LoopOutcome {
        info!(
            "Agent starting for {} using {}",
            self.symbol,
            self.strategy.name()
        );
        self.set_phase(AgentPhase::Starting);

        let availability = wait_for_oracle(
            self.services.oracle.as_ref(),
            self.services.notifier.as_ref(),
            &mut self.cancel,
            self.config.startup_retries,
            self.config.startup_retry_delay(),
            self.config.call_timeout(),
        )
        .await;

        match availability {
            Availability::Available => {}
            Availability::Exhausted => {
                error!("Prediction API unavailable after {} attempts", self.config.startup_retries);
                self.notify("CRITICAL: Exiting. Prediction API is not available.");
                self.set_phase(AgentPhase::Stopped);
                return LoopOutcome::StartupFailed;
            }
            Availability::Cancelled => {
                self.notify("🛑 Stop requested before the agent finished starting");
                return self.shutdown().await;
            }
        }

        self.notify("INFO: Entering main trading loop with automatic trading enabled...");
        self.set_phase(AgentPhase::Running);

        loop {
            let step = match self.cycle().await {
                Ok(step) => step,
                Err(e) => {
                    error!("Agent cycle failed: {}", e);
                    self.notify(&format!("ERROR: An error occurred in agent loop: {}", e));
                    let recovery = self.config.error_recovery_delay();
                    self.pause(recovery).await
                }
            };
            if let Step::Shutdown = step {
                break;
            }
        }

        self.shutdown().await
    }

    async fn cycle(&mut self) -> Result<Step> {
        let timeout = self.config.call_timeout();
        self.notify(&format!("INFO: Checking market status for {}...", self.symbol));

        let clock = with_timeout("get_clock", timeout, self.services.broker.get_clock()).await?;
        if let Some(step) = self.checkpoint() {
            return Ok(step);
        }

        if !clock.is_open {
            self.set_phase(AgentPhase::MarketClosedWait);
            match clock.next_open {
                Some(next) => self.notify(&format!(
                    "INFO: Market is closed (next open {}). Agent is waiting...",
                    next
                )),
                None => self.notify("INFO: Market is closed. Agent is waiting..."),
            }
            let poll = self.config.market_closed_poll();
            return Ok(self.pause(poll).await);
        }

        self.set_phase(AgentPhase::Running);
        self.notify("INFO: Market is OPEN. Proceeding with trading logic.");

        let position_qty = self.position_snapshot().await;
        if let Some(step) = self.checkpoint() {
            return Ok(step);
        }

        self.notify("INFO: Getting prediction and current price from API...");
        let price =
            with_timeout("oracle.get", timeout, self.services.oracle.get(&self.symbol)).await?;
        if let Some(step) = self.checkpoint() {
            return Ok(step);
        }

        if price.current.is_none() {
            self.notify("WARNING: Could not get current price, skipping this cycle");
            let delay = self.config.missing_price_delay();
            return Ok(self.pause(delay).await);
        }
        self.report_prices(&price, position_qty);

        let decision = self.strategy.evaluate(&price, position_qty);
        self.notify(&format!("DECISION: {} - {}", decision.action, decision.reason));

        // A pending stop outranks a queued trade: protection runs next
        if self.cancel.is_cancelled() {
            self.notify("🛑 Shutdown requested during trading decision!");
            return Ok(Step::Shutdown);
        }

        self.execute(&decision).await;

        let interval = self.config.cycle_interval();
        self.notify(&format!(
            "INFO: Cycle complete. Sleeping for {} seconds...",
            interval.as_secs()
        ));
        Ok(self.pause(interval).await)
    }

    /// Signed position size. A missing position and a failed lookup both read as flat.
    async fn position_snapshot(&self) -> Decimal {
        let lookup = with_timeout(
            "get_position",
            self.config.call_timeout(),
            self.services.broker.get_position(&self.symbol),
        )
        .await;

        match lookup {
            Ok(Some(position)) => {
                let side = if position.is_short() { "short" } else { "long" };
                self.notify(&format!(
                    "INFO: Current position: {} shares ({})",
                    position.quantity, side
                ));
                position.quantity
            }
            Ok(None) => {
                self.notify("INFO: No open position for this stock.");
                Decimal::ZERO
            }
            Err(e) => {
                warn!("Position lookup for {} failed: {}", self.symbol, e);
                self.notify(&format!("INFO: Error getting position: {}", e));
                Decimal::ZERO
            }
        }
    }

    fn report_prices(&self, price: &PricePoint, position_qty: Decimal) {
        if let (Some(current), Some(predicted)) = (price.current, price.predicted) {
            let change = fractional_change(current, predicted)
                .and_then(|c| c.checked_mul(Decimal::ONE_HUNDRED))
                .map_or_else(|| "n/a".to_string(), |c| format!("{:.2}%", c));
            self.notify(&format!(
                "ANALYSIS: Current: ${:.2}, Predicted: ${:.2}, Change: {}",
                current, predicted, change
            ));
        } else {
            self.notify("ANALYSIS: Prediction unavailable for this cycle");
        }
        self.notify(&format!(
            "POSITION: Currently holding {} shares",
            position_qty
        ));
    }

    /// Submits the market order for `decision`. Failures are reported, never retried.
    async fn execute(&self, decision: &Decision) {
        let Some(side) = decision.order_side() else {
            self.notify("NO ACTION: Holding current position");
            return;
        };

        self.notify(&format!(
            "EXECUTING: {} {} shares of {}",
            side, decision.quantity, self.symbol
        ));
        let order = Order::market(&self.symbol, side, decision.quantity);

        let submitted = with_timeout(
            "submit_order",
            self.config.call_timeout(),
            self.services.broker.submit_order(&order),
        )
        .await;

        match submitted {
            Ok(resp) => {
                info!("✅ Order accepted: {:?}", resp);
                self.notify(&format!(
                    "ORDER PLACED: {} order {} submitted ({})",
                    side, resp.id, resp.status
                ));
            }
            Err(e) => {
                error!("⚠️ Execution Error: {}", e);
                self.notify(&format!("ERROR: Failed to place order: {}", e));
            }
        }
    }

    async fn shutdown(&mut self) -> LoopOutcome {
        self.set_phase(AgentPhase::ShuttingDown);
        self.notify("🛑 SHUTDOWN INITIATED: Setting up protective orders...");

        let outcome = match self
            .coordinator
            .protect(&self.symbol, self.config.shutdown_stop_loss_pct)
            .await
        {
            Ok(Some(order)) => {
                self.notify("✅ Agent shutdown complete with protection enabled!");
                LoopOutcome::Stopped {
                    protective_order: Some(order.id),
                }
            }
            Ok(None) => {
                self.notify("✅ Agent shutdown complete. Nothing to protect.");
                LoopOutcome::Stopped {
                    protective_order: None,
                }
            }
            Err(e) => {
                error!("Protective order failed during shutdown: {}", e);
                self.notify(&format!("❌ Failed to set protective orders: {}", e));
                LoopOutcome::ProtectionFailed {
                    error: e.to_string(),
                }
            }
        };

        self.set_phase(AgentPhase::Stopped);
        outcome
    }
}
