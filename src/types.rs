// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Broker-reported net holding. Positive quantity is long, negative is short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn is_short(&self) -> bool {
        self.quantity.is_sign_negative() && !self.quantity.is_zero()
    }

    /// Side of the holding itself: Buy for long, Sell for short.
    pub fn side(&self) -> Side {
        if self.is_short() {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    /// Whole units held, ignoring any fractional remainder.
    pub fn whole_units(&self) -> u64 {
        whole_units(self.quantity)
    }
}

/// Absolute integer truncation of a signed quantity.
pub fn whole_units(quantity: Decimal) -> u64 {
    quantity.trunc().abs().to_u64().unwrap_or(0)
}

/// One oracle reading. Either side may be missing when the model has no data.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PricePoint {
    pub current: Option<Decimal>,
    pub predicted: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub quantity: u64,
    pub reason: String,
}

impl Decision {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            quantity: 0,
            reason: reason.into(),
        }
    }

    /// Order side for an actionable decision, None for HOLD or a zero quantity.
    pub fn order_side(&self) -> Option<Side> {
        if self.quantity == 0 {
            return None;
        }
        match self.action {
            Action::Buy => Some(Side::Buy),
            Action::Sell => Some(Side::Sell),
            Action::Hold => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    Market,
    Stop { stop_price: Decimal },
    Limit { limit_price: Decimal },
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "market",
            OrderKind::Stop { .. } => "stop",
            OrderKind::Limit { .. } => "limit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub kind: OrderKind,
    pub time_in_force: TimeInForce,
    pub client_order_id: String,
}

impl Order {
    fn new(symbol: &str, side: Side, quantity: u64, kind: OrderKind, tif: TimeInForce) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            kind,
            time_in_force: tif,
            client_order_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn market(symbol: &str, side: Side, quantity: u64) -> Self {
        Self::new(symbol, side, quantity, OrderKind::Market, TimeInForce::Day)
    }

    pub fn stop(symbol: &str, side: Side, quantity: u64, stop_price: Decimal) -> Self {
        Self::new(
            symbol,
            side,
            quantity,
            OrderKind::Stop { stop_price },
            TimeInForce::Gtc,
        )
    }

    pub fn limit(symbol: &str, side: Side, quantity: u64, limit_price: Decimal) -> Self {
        Self::new(
            symbol,
            side,
            quantity,
            OrderKind::Limit { limit_price },
            TimeInForce::Gtc,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketClock {
    pub is_open: bool,
    pub next_open: Option<DateTime<Utc>>,
}

/// Lifecycle phase of the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Stopped,
    Starting,
    Running,
    MarketClosedWait,
    ShuttingDown,
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentPhase::Stopped => "stopped",
            AgentPhase::Starting => "starting",
            AgentPhase::Running => "running",
            AgentPhase::MarketClosedWait => "market_closed_wait",
            AgentPhase::ShuttingDown => "shutting_down",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}
