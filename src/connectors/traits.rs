use crate::error::Result;
use crate::types::{MarketClock, Order, OrderResponse, Position, PricePoint};
use async_trait::async_trait;

/// Source of current and predicted prices.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get(&self, symbol: &str) -> Result<PricePoint>;

    // Cheap health probe used while the agent is starting
    async fn is_available(&self) -> Result<bool>;
}

#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn get_clock(&self) -> Result<MarketClock>;

    /// `Ok(None)` when there is no open position; transport failures are `Err`.
    async fn get_position(&self, symbol: &str) -> Result<Option<Position>>;

    async fn submit_order(&self, order: &Order) -> Result<OrderResponse>;

    async fn get_all_positions(&self) -> Result<Vec<Position>>;

    async fn get_open_orders(&self) -> Result<Vec<OrderResponse>>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;
}
