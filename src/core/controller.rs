// src/core/controller.rs
use crate::config::AgentConfig;
use crate::core::agent::{AgentLoop, LoopOutcome};
use crate::core::wait::{cancel_pair, CancelHandle};
use crate::core::Services;
use crate::error::with_timeout;
use crate::strategies::prediction::PredictionStrategy;
use crate::types::{AgentPhase, Position};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Stop distance used by `protect` when the caller gives none.
pub const DEFAULT_STOP_LOSS_PCT: Decimal = dec!(0.05);
/// Take-profit distance used by `protect` when the caller gives none.
pub const DEFAULT_TAKE_PROFIT_PCT: Decimal = dec!(0.10);

/// A protective distance must leave the order price on the right side of
/// entry and above zero.
fn is_valid_pct(pct: Decimal) -> bool {
    pct > Decimal::ZERO && pct < Decimal::ONE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub status: CommandStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

impl CommandResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            message: message.into(),
            symbol: None,
            order_id: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            ..Self::success(message)
        }
    }

    fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    fn with_order(mut self, order_id: Option<String>) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub running: bool,
    pub symbol: Option<String>,
    pub phase: AgentPhase,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtectResponse {
    pub status: CommandStatus,
    pub message: String,
    pub stop_loss_order: Option<String>,
    pub take_profit_order: Option<String>,
    /// Percent, e.g. 5 for 5%.
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionsResponse {
    pub status: CommandStatus,
    pub message: String,
    pub positions: Vec<Position>,
}

#[derive(Default)]
struct AgentState {
    running: bool,
    stopping: bool,
    active_symbol: Option<String>,
    loop_handle: Option<JoinHandle<LoopOutcome>>,
    cancel: Option<CancelHandle>,
}

impl AgentState {
    /// Forgets a loop that ended on its own (startup failure).
    fn reap(&mut self) {
        if self.loop_handle.as_ref().is_some_and(|h| h.is_finished()) {
            info!("Agent loop for {:?} exited on its own", self.active_symbol);
            self.clear();
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Command surface for the agent. Start and stop are serialized through one
/// lock, so at most one loop task exists at any time.
#[derive(Clone)]
pub struct AgentController {
    config: AgentConfig,
    services: Services,
    state: Arc<Mutex<AgentState>>,
    phase: Arc<watch::Sender<AgentPhase>>,
}

impl AgentController {
    pub fn new(config: AgentConfig, services: Services) -> Self {
        let (phase, _) = watch::channel(AgentPhase::Stopped);
        Self {
            config,
            services,
            state: Arc::new(Mutex::new(AgentState::default())),
            phase: Arc::new(phase),
        }
    }

    pub fn phase(&self) -> watch::Receiver<AgentPhase> {
        self.phase.subscribe()
    }

    fn notify(&self, message: &str) {
        self.services.notifier.publish(message);
    }

    pub async fn start(&self, symbol: &str) -> CommandResponse {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return CommandResponse::error("Symbol must not be empty");
        }

        let mut state = self.state.lock().await;
        state.reap();
        if state.running {
            let active = state.active_symbol.clone().unwrap_or_default();
            return CommandResponse::error(format!("Agent is already running for {}", active))
                .with_symbol(&active);
        }

        let (cancel, token) = cancel_pair();
        let agent = AgentLoop::new(
            symbol.clone(),
            self.config.clone(),
            self.services.clone(),
            PredictionStrategy::new(self.config.confidence_threshold),
            token,
            self.phase.clone(),
        );

        self.phase.send_replace(AgentPhase::Starting);
        state.loop_handle = Some(tokio::spawn(agent.run()));
        state.cancel = Some(cancel);
        state.active_symbol = Some(symbol.clone());
        state.running = true;
        drop(state);

        info!("Agent started for {}", symbol);
        self.notify(&format!("🚀 AUTO-TRADING AGENT STARTED for {}", symbol));
        self.notify("📈 Agent will automatically BUY and SELL based on AI predictions");
        self.notify("🛡️ Protective orders will be placed automatically when stopped");

        CommandResponse::success(format!(
            "Auto-trading agent started for {}. Will buy/sell automatically based on predictions.",
            symbol
        ))
        .with_symbol(&symbol)
    }

    /// Signals the loop, waits for its shutdown (protective order included),
    /// then clears the state. The wait runs in its own task so a dropped
    /// caller cannot leave the state half-stopped.
    pub async fn stop(&self) -> CommandResponse {
        let (symbol, cancel, handle) = {
            let mut state = self.state.lock().await;
            state.reap();
            if !state.running {
                return CommandResponse::error("No agent is currently running");
            }
            let symbol = state.active_symbol.clone().unwrap_or_default();
            if state.stopping {
                return CommandResponse::error(format!("Agent for {} is already stopping", symbol))
                    .with_symbol(&symbol);
            }
            state.stopping = true;
            (symbol, state.cancel.take(), state.loop_handle.take())
        };

        let state = self.state.clone();
        let phase = self.phase.clone();
        let grace = self.config.shutdown_grace();
        let finisher = tokio::spawn(async move {
            if let Some(cancel) = cancel {
                cancel.cancel();
            }
            let result = match handle {
                Some(mut handle) => match tokio::time::timeout(grace, &mut handle).await {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(e)) => Err(format!("agent task failed: {}", e)),
                    Err(_) => {
                        handle.abort();
                        Err(format!("shutdown did not finish within {:?}", grace))
                    }
                },
                None => Err("agent task handle missing".to_string()),
            };

            let mut state = state.lock().await;
            phase.send_replace(AgentPhase::Stopped);
            state.clear();
            result
        });

        let result = finisher
            .await
            .unwrap_or_else(|e| Err(format!("stop task failed: {}", e)));

        match result {
            Ok(LoopOutcome::Stopped {
                protective_order: Some(order_id),
            }) => {
                self.notify(&format!("🛑 AGENT STOPPED for {}", symbol));
                self.notify("💡 Your positions are now protected even when agent is offline!");
                CommandResponse::success(format!(
                    "Agent stopped and protective orders placed for {}",
                    symbol
                ))
                .with_symbol(&symbol)
                .with_order(Some(order_id))
            }
            Ok(LoopOutcome::Stopped {
                protective_order: None,
            })
            | Ok(LoopOutcome::StartupFailed) => {
                self.notify(&format!("🛑 AGENT STOPPED for {}", symbol));
                CommandResponse::success(format!(
                    "Agent stopped for {}. No open position needed protection.",
                    symbol
                ))
                .with_symbol(&symbol)
            }
            Ok(LoopOutcome::ProtectionFailed { error }) => {
                warn!("Agent for {} stopped without protection: {}", symbol, error);
                self.notify(&format!(
                    "⚠️ AGENT STOPPED for {} but protective orders failed",
                    symbol
                ));
                CommandResponse::error(format!(
                    "Agent stopped for {} but protective orders failed: {}",
                    symbol, error
                ))
                .with_symbol(&symbol)
            }
            Err(e) => {
                error!("Agent for {} force-stopped: {}", symbol, e);
                self.notify(&format!("❌ Failed to stop agent gracefully: {}", e));
                CommandResponse::error(format!("Agent force-stopped: {}", e)).with_symbol(&symbol)
            }
        }
    }

    pub async fn status(&self) -> AgentStatus {
        let mut state = self.state.lock().await;
        state.reap();
        AgentStatus {
            running: state.running,
            symbol: state.active_symbol.clone(),
            phase: *self.phase.borrow(),
        }
    }

    /// Places a stop-loss and a take-profit order against the current position.
    /// Each is attempted independently.
    pub async fn protect(
        &self,
        symbol: &str,
        stop_loss_pct: Option<Decimal>,
        take_profit_pct: Option<Decimal>,
    ) -> ProtectResponse {
        let symbol = symbol.trim().to_uppercase();
        let stop_loss_pct = stop_loss_pct.unwrap_or(DEFAULT_STOP_LOSS_PCT);
        let take_profit_pct = take_profit_pct.unwrap_or(DEFAULT_TAKE_PROFIT_PCT);

        let invalid: Vec<String> = [("stop-loss", stop_loss_pct), ("take-profit", take_profit_pct)]
            .into_iter()
            .filter(|(_, pct)| !is_valid_pct(*pct))
            .map(|(name, pct)| format!("{} {}", name, pct))
            .collect();
        if !invalid.is_empty() {
            return ProtectResponse {
                status: CommandStatus::Error,
                message: format!(
                    "Percentages must be fractions between 0 and 1 (exclusive): {}",
                    invalid.join(", ")
                ),
                stop_loss_order: None,
                take_profit_order: None,
                stop_loss_pct: stop_loss_pct * Decimal::ONE_HUNDRED,
                take_profit_pct: take_profit_pct * Decimal::ONE_HUNDRED,
            };
        }

        let coordinator = self.services.coordinator(&self.config);

        self.notify(&format!("🛡️ Setting up protective orders for {}...", symbol));
        let stop = coordinator.protect(&symbol, stop_loss_pct).await;
        let take = coordinator.take_profit(&symbol, take_profit_pct).await;

        let mut failures = Vec::new();
        let stop_loss_order = match stop {
            Ok(resp) => resp.map(|r| r.id),
            Err(e) => {
                failures.push(format!("stop-loss: {}", e));
                None
            }
        };
        let take_profit_order = match take {
            Ok(resp) => resp.map(|r| r.id),
            Err(e) => {
                failures.push(format!("take-profit: {}", e));
                None
            }
        };

        let (status, message) = if failures.is_empty() {
            self.notify(&format!("✅ Protective orders placed for {}", symbol));
            (
                CommandStatus::Success,
                format!("Protective orders placed for {}", symbol),
            )
        } else {
            let joined = failures.join("; ");
            self.notify(&format!("❌ Failed to set protective orders: {}", joined));
            (
                CommandStatus::Error,
                format!("Failed to set protective orders: {}", joined),
            )
        };

        ProtectResponse {
            status,
            message,
            stop_loss_order,
            take_profit_order,
            stop_loss_pct: stop_loss_pct * Decimal::ONE_HUNDRED,
            take_profit_pct: take_profit_pct * Decimal::ONE_HUNDRED,
        }
    }

    pub async fn emergency_sell(&self, symbol: &str) -> CommandResponse {
        let symbol = symbol.trim().to_uppercase();
        self.notify(&format!("🚨 EMERGENCY SELL initiated for {}", symbol));

        match self
            .services
            .coordinator(&self.config)
            .emergency_liquidate(&symbol)
            .await
        {
            Ok(Some(resp)) => {
                self.notify(&format!("✅ Emergency sell order placed for {}", symbol));
                CommandResponse::success(format!("Emergency sell order placed for {}", symbol))
                    .with_symbol(&symbol)
                    .with_order(Some(resp.id))
            }
            Ok(None) => CommandResponse::success(format!(
                "No open position for {}; nothing to sell",
                symbol
            ))
            .with_symbol(&symbol),
            Err(e) => {
                self.notify(&format!("❌ Emergency sell failed: {}", e));
                CommandResponse::error(format!("Emergency sell failed: {}", e)).with_symbol(&symbol)
            }
        }
    }

    pub async fn cancel_orders(&self, symbol: &str) -> CommandResponse {
        let symbol = symbol.trim().to_uppercase();
        match self
            .services
            .coordinator(&self.config)
            .cancel_open_orders(&symbol)
            .await
        {
            Ok(ids) => CommandResponse::success(format!(
                "Cancelled {} open orders for {}",
                ids.len(),
                symbol
            ))
            .with_symbol(&symbol),
            Err(e) => {
                self.notify(&format!("❌ Error cancelling orders: {}", e));
                CommandResponse::error(format!("Error cancelling orders: {}", e))
                    .with_symbol(&symbol)
            }
        }
    }

    pub async fn positions(&self) -> PositionsResponse {
        let lookup = with_timeout(
            "get_all_positions",
            self.config.call_timeout(),
            self.services.broker.get_all_positions(),
        )
        .await;

        match lookup {
            Ok(positions) => PositionsResponse {
                status: CommandStatus::Success,
                message: format!("{} open positions", positions.len()),
                positions,
            },
            Err(e) => PositionsResponse {
                status: CommandStatus::Error,
                message: format!("Failed to load positions: {}", e),
                positions: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing::{FakeBroker, FakeOracle, RecordingSink};
    use crate::types::{OrderKind, Side};
    use std::time::Duration;

    struct Fixture {
        controller: AgentController,
        broker: Arc<FakeBroker>,
        oracle: Arc<FakeOracle>,
        sink: Arc<RecordingSink>,
    }

    fn fixture(broker: FakeBroker, oracle: FakeOracle) -> Fixture {
        let broker = Arc::new(broker);
        let oracle = Arc::new(oracle);
        let sink = Arc::new(RecordingSink::default());
        let services = Services {
            oracle: oracle.clone(),
            broker: broker.clone(),
            notifier: sink.clone(),
        };
        let mut config = AppConfig::for_tests().agent;
        config.startup_retries = 2;
        Fixture {
            controller: AgentController::new(config, services),
            broker,
            oracle,
            sink,
        }
    }

    fn holding(qty: Decimal) -> FakeBroker {
        FakeBroker::with_position("AAPL", qty, dec!(100))
    }

    fn flat_oracle() -> FakeOracle {
        FakeOracle::new(Some(dec!(100)), Some(dec!(100.50)))
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected() {
        let f = fixture(holding(dec!(10)), flat_oracle());

        let first = f.controller.start("aapl").await;
        assert!(first.is_success());
        assert_eq!(first.symbol.as_deref(), Some("AAPL"));

        let second = f.controller.start("MSFT").await;
        assert_eq!(second.status, CommandStatus::Error);
        assert_eq!(second.message, "Agent is already running for AAPL");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.oracle.health_calls(), 1);

        f.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_starts_spawn_one_loop() {
        let f = fixture(holding(dec!(10)), flat_oracle());
        let (a, b) = tokio::join!(f.controller.start("AAPL"), f.controller.start("AAPL"));
        assert_eq!(
            [a.is_success(), b.is_success()].iter().filter(|s| **s).count(),
            1
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.oracle.health_calls(), 1);
        assert_eq!(f.broker.clock_calls(), 1);

        f.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_protects_position_once_and_resets_state() {
        let f = fixture(holding(dec!(10)), flat_oracle());
        f.controller.start("AAPL").await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let status = f.controller.status().await;
        assert!(status.running);
        assert_eq!(status.phase, AgentPhase::Running);

        let resp = f.controller.stop().await;
        assert!(resp.is_success(), "{}", resp.message);
        assert!(resp.order_id.is_some());

        let orders = f.broker.submitted();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Sell);
        assert_eq!(orders[0].kind, OrderKind::Stop { stop_price: dec!(97.00) });

        let status = f.controller.status().await;
        assert!(!status.running);
        assert_eq!(status.symbol, None);
        assert_eq!(status.phase, AgentPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_when_idle_is_an_error() {
        let f = fixture(FakeBroker::default(), flat_oracle());
        let resp = f.controller.stop().await;
        assert_eq!(resp.status, CommandStatus::Error);
        assert_eq!(resp.message, "No agent is currently running");
        assert!(f.broker.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_startup_is_reaped_and_restartable() {
        let f = fixture(FakeBroker::default(), FakeOracle::unavailable_for(u32::MAX));
        assert!(f.controller.start("AAPL").await.is_success());

        tokio::time::sleep(Duration::from_secs(60)).await;
        let status = f.controller.status().await;
        assert!(!status.running);
        assert_eq!(status.phase, AgentPhase::Stopped);
        assert!(f.sink.contains("CRITICAL"));

        assert!(f.controller.start("AAPL").await.is_success());
        f.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn protection_failure_still_stops() {
        let f = fixture(holding(dec!(10)), flat_oracle());
        f.controller.start("AAPL").await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        f.broker.fail_submit(true);
        let resp = f.controller.stop().await;
        assert_eq!(resp.status, CommandStatus::Error);
        assert!(resp.message.contains("protective orders failed"));
        assert!(!f.controller.status().await.running);
    }

    #[tokio::test]
    async fn protect_places_stop_and_take_profit() {
        let f = fixture(holding(dec!(10)), flat_oracle());
        let resp = f.controller.protect("aapl", None, None).await;

        assert_eq!(resp.status, CommandStatus::Success);
        assert!(resp.stop_loss_order.is_some());
        assert!(resp.take_profit_order.is_some());
        assert_eq!(resp.stop_loss_pct, dec!(5));

        let orders = f.broker.submitted();
        assert_eq!(orders[0].kind, OrderKind::Stop { stop_price: dec!(95.00) });
        assert_eq!(orders[1].kind, OrderKind::Limit { limit_price: dec!(110.00) });
    }

    #[tokio::test]
    async fn protect_rejects_out_of_range_percentages() {
        let f = fixture(holding(dec!(10)), flat_oracle());

        let resp = f.controller.protect("AAPL", Some(dec!(1.2)), None).await;
        assert_eq!(resp.status, CommandStatus::Error);
        assert!(resp.message.contains("stop-loss 1.2"), "{}", resp.message);

        let resp = f.controller.protect("AAPL", Some(dec!(-0.05)), Some(dec!(0))).await;
        assert_eq!(resp.status, CommandStatus::Error);
        assert!(resp.message.contains("take-profit 0"), "{}", resp.message);

        assert!(resp.stop_loss_order.is_none());
        assert!(f.broker.submitted().is_empty());
    }

    #[tokio::test]
    async fn emergency_sell_liquidates_with_market_order() {
        let f = fixture(holding(dec!(8)), flat_oracle());
        let resp = f.controller.emergency_sell("AAPL").await;
        assert!(resp.is_success());

        let orders = f.broker.submitted();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].kind, OrderKind::Market);
        assert_eq!(orders[0].quantity, 8);
        assert_eq!(orders[0].side, Side::Sell);
    }

    #[tokio::test]
    async fn emergency_sell_without_position_places_nothing() {
        let f = fixture(FakeBroker::default(), flat_oracle());
        let resp = f.controller.emergency_sell("AAPL").await;
        assert!(resp.is_success());
        assert!(resp.order_id.is_none());
        assert!(f.broker.submitted().is_empty());
    }

    #[tokio::test]
    async fn responses_serialize_with_lowercase_status() {
        let f = fixture(FakeBroker::default(), flat_oracle());
        let resp = f.controller.stop().await;
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json.get("order_id").is_none());
    }

    #[tokio::test]
    async fn cancel_orders_reports_count_for_symbol() {
        let f = fixture(FakeBroker::default(), flat_oracle());
        f.broker.add_open_order("a", "AAPL");
        f.broker.add_open_order("b", "MSFT");

        let resp = f.controller.cancel_orders("aapl").await;
        assert!(resp.is_success());
        assert_eq!(resp.message, "Cancelled 1 open orders for AAPL");
        assert_eq!(f.broker.cancelled(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn positions_lists_broker_holdings() {
        let f = fixture(holding(dec!(3)), flat_oracle());
        let resp = f.controller.positions().await;
        assert_eq!(resp.status, CommandStatus::Success);
        assert_eq!(resp.positions.len(), 1);
        assert_eq!(resp.positions[0].quantity, dec!(3));
    }
}
