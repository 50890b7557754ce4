// swap-engine/src/curve.rs

use crate::state::CurveKind;
use crate::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use swap_core::BPS_DENOM;

/// Upper bound on units priced in one fulfillment. Keeps the per-unit
/// stepping loop bounded for semi-fungible batches.
pub const MAX_FULFILL_UNITS: u64 = 1 << 16;

/// Which way a fulfillment moves value relative to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    /// Fulfill-buy: the pool purchases from a seller, bid starts at spot
    /// and steps down
    PoolBuys,
    /// Fulfill-sell: the pool sells to a buyer, ask starts one step above
    /// spot and steps up
    PoolSells,
}

/// Aggregate settlement price for a batch and the curve position afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Sum of per-unit prices, rounded toward the protocol
    pub total: u64,
    /// Spot price after the curve advances past the last unit
    pub new_spot_price: u64,
}

/// Price `amount` units against the curve.
///
/// Rounding is directional so value never leaks to the taker: what a buyer
/// must pay rounds up per unit, what a seller receives rounds down per
/// unit. A linear bid that would step below zero fails rather than
/// clamping.
pub fn price_fulfillment(
    kind: CurveKind,
    spot_price: u64,
    delta: u64,
    amount: u64,
    side: TradeSide,
) -> EngineResult<PriceQuote> {
    if amount == 0 {
        return Err(EngineError::InvalidOperation(
            "fulfillment amount must be positive".into(),
        ));
    }
    if amount > MAX_FULFILL_UNITS {
        return Err(EngineError::InvalidOperation(format!(
            "fulfillment amount {amount} exceeds batch limit {MAX_FULFILL_UNITS}"
        )));
    }

    match (kind, side) {
        (CurveKind::Linear, TradeSide::PoolSells) => linear_ascending(spot_price, delta, amount),
        (CurveKind::Linear, TradeSide::PoolBuys) => linear_descending(spot_price, delta, amount),
        (CurveKind::Exponential, TradeSide::PoolSells) => {
            exponential_ascending(spot_price, delta, amount)
        }
        (CurveKind::Exponential, TradeSide::PoolBuys) => {
            exponential_descending(spot_price, delta, amount)
        }
    }
}

// Units price at spot+delta, spot+2*delta, ...; spot lands on the last
// traded price.
fn linear_ascending(spot_price: u64, delta: u64, amount: u64) -> EngineResult<PriceQuote> {
    let mut price = spot_price;
    let mut total: u128 = 0;
    for _ in 0..amount {
        price = price
            .checked_add(delta)
            .ok_or(EngineError::MathOverflow("linear ask step"))?;
        total += price as u128;
    }
    Ok(PriceQuote {
        total: narrow(total, "linear ask total")?,
        new_spot_price: price,
    })
}

// First unit trades at spot, then the bid steps down. The step below the
// last traded unit must also exist, since the pool's next bid sits there.
fn linear_descending(spot_price: u64, delta: u64, amount: u64) -> EngineResult<PriceQuote> {
    let mut price = spot_price;
    let mut total: u128 = 0;
    for i in 0..amount {
        if i > 0 {
            price = price
                .checked_sub(delta)
                .ok_or(EngineError::MathOverflow("linear bid step"))?;
        }
        total += price as u128;
    }
    let new_spot_price = price
        .checked_sub(delta)
        .ok_or(EngineError::MathOverflow("linear bid step"))?;
    Ok(PriceQuote {
        total: narrow(total, "linear bid total")?,
        new_spot_price,
    })
}

// Multiplicative stepping by (10000 + delta) / 10000, ceiling per unit.
fn exponential_ascending(spot_price: u64, delta: u64, amount: u64) -> EngineResult<PriceQuote> {
    let numerator = BPS_DENOM as u128 + delta as u128;
    let mut price = spot_price as u128;
    let mut total: u128 = 0;
    for _ in 0..amount {
        let scaled = price
            .checked_mul(numerator)
            .ok_or(EngineError::MathOverflow("exponential ask step"))?;
        price = scaled.div_ceil(BPS_DENOM as u128);
        total = total
            .checked_add(price)
            .ok_or(EngineError::MathOverflow("exponential ask total"))?;
    }
    Ok(PriceQuote {
        total: narrow(total, "exponential ask total")?,
        new_spot_price: narrow(price, "exponential ask spot")?,
    })
}

// Inverse stepping by 10000 / (10000 + delta), flooring per unit.
fn exponential_descending(spot_price: u64, delta: u64, amount: u64) -> EngineResult<PriceQuote> {
    let denominator = BPS_DENOM as u128 + delta as u128;
    let mut price = spot_price as u128;
    let mut total: u128 = 0;
    for i in 0..amount {
        if i > 0 {
            price = price * BPS_DENOM as u128 / denominator;
        }
        total += price;
    }
    let new_spot_price = price * BPS_DENOM as u128 / denominator;
    Ok(PriceQuote {
        total: narrow(total, "exponential bid total")?,
        new_spot_price: narrow(new_spot_price, "exponential bid spot")?,
    })
}

fn narrow(value: u128, context: &'static str) -> EngineResult<u64> {
    u64::try_from(value).map_err(|_| EngineError::MathOverflow(context))
}
