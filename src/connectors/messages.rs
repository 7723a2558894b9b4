// src/connectors/messages.rs
use crate::types::{MarketClock, Order, OrderKind, OrderResponse, Position, TimeInForce};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// GET /predict/{symbol} on the prediction service.
#[derive(Debug, Deserialize)]
pub struct PredictionResponse {
    #[serde(default)]
    pub last_close: Option<Decimal>,

    #[serde(default)]
    pub predicted_next_close: Option<Decimal>,
}

/// GET /v2/clock
#[derive(Debug, Deserialize)]
pub struct AlpacaClock {
    pub is_open: bool,

    #[serde(default)]
    pub next_open: Option<DateTime<Utc>>,
}

impl From<AlpacaClock> for MarketClock {
    fn from(c: AlpacaClock) -> Self {
        MarketClock {
            is_open: c.is_open,
            next_open: c.next_open,
        }
    }
}

/// GET /v2/positions/{symbol}. Alpaca reports `qty` as a string and the
/// direction separately in `side` ("long" / "short").
#[derive(Debug, Deserialize)]
pub struct AlpacaPosition {
    pub symbol: String,
    pub qty: Decimal,
    pub avg_entry_price: Decimal,

    #[serde(default = "default_side")]
    pub side: String,
}

fn default_side() -> String {
    "long".to_string()
}

impl From<AlpacaPosition> for Position {
    fn from(p: AlpacaPosition) -> Self {
        let qty = p.qty.abs();
        let quantity = if p.side.eq_ignore_ascii_case("short") {
            -qty
        } else {
            qty
        };
        Position {
            symbol: p.symbol,
            quantity,
            entry_price: p.avg_entry_price,
        }
    }
}

/// POST /v2/orders body.
#[derive(Debug, Serialize)]
pub struct AlpacaOrderRequest {
    pub symbol: String,
    pub qty: String,
    pub side: &'static str,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub time_in_force: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    pub client_order_id: String,
}

impl From<&Order> for AlpacaOrderRequest {
    fn from(o: &Order) -> Self {
        let (stop_price, limit_price) = match o.kind {
            OrderKind::Market => (None, None),
            OrderKind::Stop { stop_price } => (Some(stop_price.to_string()), None),
            OrderKind::Limit { limit_price } => (None, Some(limit_price.to_string())),
        };
        Self {
            symbol: o.symbol.clone(),
            qty: o.quantity.to_string(),
            side: o.side.as_str(),
            order_type: o.kind.as_str(),
            time_in_force: o.time_in_force,
            stop_price,
            limit_price,
            client_order_id: o.client_order_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AlpacaOrder {
    pub id: String,
    pub symbol: String,
    pub status: String,
}

impl From<AlpacaOrder> for OrderResponse {
    fn from(o: AlpacaOrder) -> Self {
        OrderResponse {
            id: o.id,
            symbol: o.symbol,
            status: o.status,
        }
    }
}

/// Error body Alpaca returns alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct AlpacaErrorBody {
    #[serde(default)]
    pub code: Option<u64>,
    pub message: String,
}
