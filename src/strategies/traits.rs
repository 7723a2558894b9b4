// src/strategies/traits.rs
use crate::types::{Decision, PricePoint};
use rust_decimal::Decimal;

pub trait Strategy: Send + Sync {
    fn name(&self) -> String;

    // Map one oracle reading and the signed position size to an action
    fn evaluate(&self, price: &PricePoint, position_qty: Decimal) -> Decision;
}
