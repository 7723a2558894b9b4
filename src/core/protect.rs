// src/core/protect.rs
use crate::connectors::traits::BrokerGateway;
use crate::error::{with_timeout, Result};
use crate::notify::NotificationSink;
use crate::types::{Order, OrderKind, OrderResponse, Position};
use crate::utils::precision::normalize_price;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// What to place against an open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Protection {
    /// Resting stop `pct` beyond the entry, against the position.
    StopLoss { pct: Decimal },
    /// Resting limit `pct` in favour of the position.
    TakeProfit { pct: Decimal },
    /// Immediate market order closing the whole position.
    Liquidate,
}

/// Builds the closing order for `position`, or None when fewer than one whole unit is held.
pub fn protective_order(
    position: &Position,
    protection: Protection,
    tick: Decimal,
) -> Option<Order> {
    let quantity = position.whole_units();
    if quantity == 0 {
        return None;
    }

    let side = position.side().opposite();
    let entry = position.entry_price;
    // +1 moves the price in favour of a long, -1 in favour of a short
    let direction = if position.is_short() {
        Decimal::NEGATIVE_ONE
    } else {
        Decimal::ONE
    };

    let order = match protection {
        Protection::StopLoss { pct } => {
            let stop = normalize_price(entry * (Decimal::ONE - direction * pct), tick);
            Order::stop(&position.symbol, side, quantity, stop)
        }
        Protection::TakeProfit { pct } => {
            let limit = normalize_price(entry * (Decimal::ONE + direction * pct), tick);
            Order::limit(&position.symbol, side, quantity, limit)
        }
        Protection::Liquidate => Order::market(&position.symbol, side, quantity),
    };
    Some(order)
}

/// Places protective and liquidating orders against whatever the broker
/// currently reports for a symbol. Nothing is retried here.
#[derive(Clone)]
pub struct ProtectiveOrderCoordinator {
    broker: Arc<dyn BrokerGateway>,
    notifier: Arc<dyn NotificationSink>,
    price_tick: Decimal,
    call_timeout: Duration,
}

impl ProtectiveOrderCoordinator {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        notifier: Arc<dyn NotificationSink>,
        price_tick: Decimal,
        call_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            notifier,
            price_tick,
            call_timeout,
        }
    }

    pub async fn protect(
        &self,
        symbol: &str,
        stop_loss_pct: Decimal,
    ) -> Result<Option<OrderResponse>> {
        self.place(symbol, Protection::StopLoss { pct: stop_loss_pct }).await
    }

    pub async fn take_profit(
        &self,
        symbol: &str,
        take_profit_pct: Decimal,
    ) -> Result<Option<OrderResponse>> {
        self.place(symbol, Protection::TakeProfit { pct: take_profit_pct }).await
    }

    pub async fn emergency_liquidate(&self, symbol: &str) -> Result<Option<OrderResponse>> {
        self.place(symbol, Protection::Liquidate).await
    }

    async fn place(&self, symbol: &str, protection: Protection) -> Result<Option<OrderResponse>> {
        let position = with_timeout(
            "get_position",
            self.call_timeout,
            self.broker.get_position(symbol),
        )
        .await?;

        let Some(position) = position else {
            self.notifier.publish(&format!("ℹ️ No position to protect for {}", symbol));
            return Ok(None);
        };

        let Some(order) = protective_order(&position, protection, self.price_tick) else {
            self.notifier.publish(&format!("ℹ️ No whole shares to protect for {}", symbol));
            return Ok(None);
        };

        self.notifier.publish(&format!(
            "📊 Position: {} shares of {} at ${:.2}",
            position.quantity, symbol, position.entry_price
        ));
        self.notifier.publish(&describe(&order, protection));

        let submitted = with_timeout(
            "submit_order",
            self.call_timeout,
            self.broker.submit_order(&order),
        )
        .await;
        match submitted {
            Ok(resp) => {
                info!("Protective order accepted: {:?}", resp);
                self.notifier.publish(&format!(
                    "✅ PROTECTION: {} order {} placed for {}",
                    order.kind.as_str(),
                    resp.id,
                    symbol
                ));
                Ok(Some(resp))
            }
            Err(e) => {
                error!("Protective order for {} rejected: {}", symbol, e);
                Err(e)
            }
        }
    }

    /// Cancels every open order for `symbol`, returning the ids that were cancelled.
    /// A failed cancel is reported and skipped.
    pub async fn cancel_open_orders(&self, symbol: &str) -> Result<Vec<String>> {
        let orders = with_timeout(
            "get_open_orders",
            self.call_timeout,
            self.broker.get_open_orders(),
        )
        .await?;
        let targets: Vec<OrderResponse> =
            orders.into_iter().filter(|o| o.symbol == symbol).collect();

        if targets.is_empty() {
            self.notifier.publish(&format!("ℹ️ No open orders for {}", symbol));
            return Ok(Vec::new());
        }

        self.notifier.publish(&format!(
            "🗑️ Cancelling {} open orders for {}...",
            targets.len(),
            symbol
        ));

        let mut cancelled = Vec::with_capacity(targets.len());
        for order in targets {
            let cancel = with_timeout(
                "cancel_order",
                self.call_timeout,
                self.broker.cancel_order(&order.id),
            )
            .await;
            match cancel {
                Ok(()) => {
                    self.notifier.publish(&format!("✅ Cancelled order {}", order.id));
                    cancelled.push(order.id);
                }
                Err(e) => {
                    warn!("Cancel of {} failed: {}", order.id, e);
                    self.notifier
                        .publish(&format!("❌ Failed to cancel order {}: {}", order.id, e));
                }
            }
        }
        Ok(cancelled)
    }
}

fn describe(order: &Order, protection: Protection) -> String {
    match (protection, order.kind) {
        (Protection::StopLoss { pct }, OrderKind::Stop { stop_price }) => format!(
            "🛡️ Setting stop-loss at ${} ({:.1}% protection)",
            stop_price,
            pct * Decimal::ONE_HUNDRED
        ),
        (Protection::TakeProfit { pct }, OrderKind::Limit { limit_price }) => format!(
            "📈 Setting take-profit at ${} ({:.1}% target)",
            limit_price,
            pct * Decimal::ONE_HUNDRED
        ),
        _ => format!(
            "🚨 EMERGENCY SELL: {} {} shares of {}",
            order.side, order.quantity, order.symbol
        ),
    }
}
