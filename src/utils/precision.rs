// src/utils/precision.rs
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a price to the nearest multiple of `tick_size`, half away from zero,
/// keeping the tick's scale so 97 goes on the wire as 97.00.
/// Example: price=97.0049, tick=0.01 -> 97.00
pub fn normalize_price(price: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size.is_zero() {
        return price;
    }
    let ticks =
        (price / tick_size).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let mut rounded = ticks * tick_size;
    rounded.rescale(tick_size.scale());
    rounded
}
