// src/strategies/prediction.rs
use crate::strategies::traits::Strategy;
use crate::types::{whole_units, Action, Decision, PricePoint};
use rust_decimal::Decimal;

/// Lot bought when opening a position.
pub const ENTRY_LOT: u64 = 10;
/// Lot added to an existing long on a strong upward prediction.
pub const ADD_LOT: u64 = 5;

/// Trades on the gap between the current price and the model's next close.
pub struct PredictionStrategy {
    confidence_threshold: Decimal,
}

impl PredictionStrategy {
    /// # Arguments
    /// * `confidence_threshold` - Minimum fractional move before acting (e.g. 0.015 for 1.5%).
    pub fn new(confidence_threshold: Decimal) -> Self {
        Self {
            confidence_threshold,
        }
    }
}

impl Strategy for PredictionStrategy {
    fn name(&self) -> String {
        format!("prediction(threshold={})", self.confidence_threshold)
    }

    fn evaluate(&self, price: &PricePoint, position_qty: Decimal) -> Decision {
        decide(
            price.current,
            price.predicted,
            position_qty,
            self.confidence_threshold,
        )
    }
}

/// Fractional change from `current` to `predicted`, None when the arithmetic
/// would overflow or `current` is zero.
pub fn fractional_change(current: Decimal, predicted: Decimal) -> Option<Decimal> {
    predicted.checked_sub(current)?.checked_div(current)
}

/// Pure decision rule. The first matching rule wins:
///
/// 1. flat and predicted rise above `threshold` -> buy [`ENTRY_LOT`]
/// 2. long and predicted fall beyond `threshold / 2` -> sell everything
/// 3. long and any predicted fall -> sell everything
/// 4. long and predicted rise above `2 * threshold` -> buy [`ADD_LOT`]
/// 5. otherwise hold
///
/// Short positions only ever hold here; their risk is handled by the
/// protective orders placed at shutdown.
pub fn decide(
    current_price: Option<Decimal>,
    predicted_price: Option<Decimal>,
    position_qty: Decimal,
    threshold: Decimal,
) -> Decision {
    let (current, predicted) = match (current_price, predicted_price) {
        (Some(c), Some(p)) if !c.is_zero() => (c, p),
        _ => return Decision::hold("missing price data"),
    };

    // Readings this extreme are treated like bad data, never traded on
    let Some((change, change_pct)) = fractional_change(current, predicted)
        .and_then(|c| Some((c, c.checked_mul(Decimal::ONE_HUNDRED)?)))
    else {
        return Decision::hold("price change out of range");
    };
    let pct = format!("{:.2}%", change_pct);
    let flat = position_qty.is_zero();
    let long = position_qty > Decimal::ZERO;

    if change > threshold && flat {
        Decision {
            action: Action::Buy,
            quantity: ENTRY_LOT,
            reason: format!("Predicted {} increase, no current position", pct),
        }
    } else if change < -(threshold / Decimal::TWO) && long {
        Decision {
            action: Action::Sell,
            quantity: whole_units(position_qty),
            reason: format!("Predicted {} decrease, closing position", pct),
        }
    } else if change < Decimal::ZERO && long {
        Decision {
            action: Action::Sell,
            quantity: whole_units(position_qty),
            reason: format!("Any downward prediction {} detected, protecting position", pct),
        }
    } else if threshold.checked_mul(Decimal::TWO).is_some_and(|t| change > t) && long {
        Decision {
            action: Action::Buy,
            quantity: ADD_LOT,
            reason: format!("Strong upward prediction {}, adding to position", pct),
        }
    } else {
        Decision::hold(format!(
            "Change {} below threshold or position already optimal",
            pct
        ))
    }
}
