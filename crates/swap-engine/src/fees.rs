// swap-engine/src/fees.rs

use crate::providers::Creator;
use crate::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use swap_core::{Address, BPS_DENOM};

/// Most negative maker/taker fee (full rebate of the counterpart fee)
pub const MIN_SIGNED_FEE_BP: i16 = -(BPS_DENOM as i16);
/// Largest fee expressible in basis points
pub const MAX_SIGNED_FEE_BP: i16 = BPS_DENOM as i16;

/// Decomposition of a buy-side fulfillment (the pool purchases from a
/// seller). Conservation holds exactly:
/// `seller_receives + lp_fee + royalty_fee + taker_fee == total_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuysideSettlement {
    pub total_price: u64,
    pub seller_receives: u64,
    pub lp_fee: u64,
    pub royalty_fee: u64,
    /// Referral fee charged to the seller side; negative is a rebate
    pub taker_fee: i64,
    /// Referral fee paid by the pool owner on top of the trade
    pub maker_fee: i64,
}

impl BuysideSettlement {
    /// What leaves the pool's escrow: the trade total plus the
    /// owner-funded maker fee
    pub fn escrow_debit(&self) -> EngineResult<u64> {
        signed_add(self.total_price, self.maker_fee, "escrow debit")
    }

    /// Net amount owed to the referral recipient
    pub fn referral_total(&self) -> EngineResult<u64> {
        combine_referral_fees(self.taker_fee, self.maker_fee)
    }
}

/// Decomposition of a sell-side fulfillment (the pool sells to a buyer).
/// Conservation: `buyer_pays == pool_receives + lp_fee + royalty_fee +
/// referral_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellsideSettlement {
    pub total_price: u64,
    pub buyer_pays: u64,
    /// Trade total net of the owner-funded maker fee
    pub pool_receives: u64,
    pub lp_fee: u64,
    pub royalty_fee: u64,
    pub taker_fee: i64,
    pub maker_fee: i64,
}

impl SellsideSettlement {
    pub fn referral_total(&self) -> EngineResult<u64> {
        combine_referral_fees(self.taker_fee, self.maker_fee)
    }
}

// Each component fits i64 on its own, but the pair can exceed it for trade
// totals near u64::MAX. Validation guarantees the combined rate is
// non-negative, not that the combined amount is representable.
fn combine_referral_fees(taker_fee: i64, maker_fee: i64) -> EngineResult<u64> {
    let combined = taker_fee as i128 + maker_fee as i128;
    u64::try_from(combined).map_err(|_| EngineError::MathOverflow("referral total"))
}

/// Validate caller-supplied signed referral fee rates.
///
/// Each rate may be negative (a rebate funded by the counterpart), but the
/// pair must never leave the referral recipient net-negative, and the
/// combined take is capped by the pool's referral rate.
pub fn validate_signed_fees(taker_bp: i16, maker_bp: i16, referral_cap_bp: u16) -> EngineResult<()> {
    for (name, bp) in [("takerFeeBp", taker_bp), ("makerFeeBp", maker_bp)] {
        if !(MIN_SIGNED_FEE_BP..=MAX_SIGNED_FEE_BP).contains(&bp) {
            return Err(EngineError::InvalidFee(format!(
                "{name} {bp} outside [{MIN_SIGNED_FEE_BP}, {MAX_SIGNED_FEE_BP}]"
            )));
        }
    }
    let combined = taker_bp as i32 + maker_bp as i32;
    if combined < 0 {
        return Err(EngineError::InvalidFee(format!(
            "combined referral fee {combined}bp is negative"
        )));
    }
    if combined > referral_cap_bp as i32 {
        return Err(EngineError::InvalidFee(format!(
            "combined referral fee {combined}bp exceeds pool cap {referral_cap_bp}bp"
        )));
    }
    Ok(())
}

/// Split a buy-side trade total.
///
/// `fee_divisor = 10000^2 + lp_bp * 10000 + royalty_bp * royalty_override_bp`
/// and the seller's gross is `total * 10000^2 / fee_divisor` floored; every
/// component fee floors off that gross, and the seller keeps the exact
/// remainder so nothing leaks to rounding.
pub fn buyside_settlement(
    total_price: u64,
    lp_fee_bp: u16,
    royalty_bp: u16,
    royalty_override_bp: u16,
    taker_fee_bp: i16,
    maker_fee_bp: i16,
) -> EngineResult<BuysideSettlement> {
    check_unsigned_bp("lpFeeBp", lp_fee_bp)?;
    check_unsigned_bp("royaltyBp", royalty_bp)?;
    check_unsigned_bp("creatorRoyaltyBp", royalty_override_bp)?;

    let bps = BPS_DENOM as u128;
    let total = total_price as u128;

    let fee_divisor =
        bps * bps + lp_fee_bp as u128 * bps + royalty_bp as u128 * royalty_override_bp as u128;
    let seller_gross = total
        .checked_mul(bps * bps)
        .ok_or(EngineError::MathOverflow("seller gross"))?
        / fee_divisor;

    let lp_fee = seller_gross * lp_fee_bp as u128 / bps;
    let royalty_fee = (seller_gross * royalty_bp as u128 / bps) * royalty_override_bp as u128 / bps;
    let taker_fee = signed_bp_fee(seller_gross, taker_fee_bp)?;
    let maker_fee = signed_bp_fee(seller_gross, maker_fee_bp)?;

    let seller_receives = total as i128 - lp_fee as i128 - royalty_fee as i128 - taker_fee as i128;
    if seller_receives < 0 {
        return Err(EngineError::MathOverflow("seller receives"));
    }

    Ok(BuysideSettlement {
        total_price,
        seller_receives: narrow(seller_receives as u128, "seller receives")?,
        lp_fee: narrow(lp_fee, "lp fee")?,
        royalty_fee: narrow(royalty_fee, "royalty fee")?,
        taker_fee,
        maker_fee,
    })
}

/// Split a sell-side trade total with payer-pays-gross semantics: every fee
/// stacks on top of the curve total, and the maker fee comes out of the
/// pool owner's proceeds.
pub fn sellside_settlement(
    total_price: u64,
    lp_fee_bp: u16,
    royalty_bp: u16,
    royalty_override_bp: u16,
    taker_fee_bp: i16,
    maker_fee_bp: i16,
) -> EngineResult<SellsideSettlement> {
    check_unsigned_bp("lpFeeBp", lp_fee_bp)?;
    check_unsigned_bp("royaltyBp", royalty_bp)?;
    check_unsigned_bp("creatorRoyaltyBp", royalty_override_bp)?;

    let bps = BPS_DENOM as u128;
    let total = total_price as u128;

    let lp_fee = total * lp_fee_bp as u128 / bps;
    let royalty_fee = (total * royalty_bp as u128 / bps) * royalty_override_bp as u128 / bps;
    let taker_fee = signed_bp_fee(total, taker_fee_bp)?;
    let maker_fee = signed_bp_fee(total, maker_fee_bp)?;

    let buyer_pays = total as i128 + lp_fee as i128 + royalty_fee as i128 + taker_fee as i128;
    let pool_receives = total as i128 - maker_fee as i128;
    if buyer_pays < 0 || pool_receives < 0 {
        return Err(EngineError::MathOverflow("sell-side settlement"));
    }

    Ok(SellsideSettlement {
        total_price,
        buyer_pays: narrow(buyer_pays as u128, "buyer pays")?,
        pool_receives: narrow(pool_receives as u128, "pool receives")?,
        lp_fee: narrow(lp_fee, "lp fee")?,
        royalty_fee: narrow(royalty_fee, "royalty fee")?,
        taker_fee,
        maker_fee,
    })
}

/// Distribute a royalty total across creators proportionally to their
/// shares. Each share floors; the remainder goes to the first creator so
/// the distributed sum equals `royalty_fee` exactly.
pub fn split_royalty(royalty_fee: u64, creators: &[Creator]) -> Vec<(Address, u64)> {
    if royalty_fee == 0 || creators.is_empty() {
        return Vec::new();
    }

    let share_total: u128 = creators.iter().map(|c| c.share_bp as u128).sum();
    if share_total == 0 {
        return vec![(creators[0].address, royalty_fee)];
    }

    let mut payouts: Vec<(Address, u64)> = creators
        .iter()
        .map(|c| {
            let cut = royalty_fee as u128 * c.share_bp as u128 / share_total;
            (c.address, cut as u64)
        })
        .collect();

    let distributed: u64 = payouts.iter().map(|(_, cut)| cut).sum();
    payouts[0].1 += royalty_fee - distributed;
    payouts
}

fn check_unsigned_bp(name: &str, bp: u16) -> EngineResult<()> {
    if bp as u64 > BPS_DENOM {
        return Err(EngineError::InvalidFee(format!(
            "{name} {bp} exceeds {BPS_DENOM}"
        )));
    }
    Ok(())
}

// Negative fees round toward zero (the rebate magnitude floors), so a
// rebate can never manufacture value.
fn signed_bp_fee(gross: u128, bp: i16) -> EngineResult<i64> {
    let magnitude = gross * bp.unsigned_abs() as u128 / BPS_DENOM as u128;
    let magnitude =
        i64::try_from(magnitude).map_err(|_| EngineError::MathOverflow("signed fee"))?;
    Ok(if bp < 0 { -magnitude } else { magnitude })
}

fn signed_add(base: u64, delta: i64, context: &'static str) -> EngineResult<u64> {
    let result = base as i128 + delta as i128;
    u64::try_from(result).map_err(|_| EngineError::MathOverflow(context))
}

fn narrow(value: u128, context: &'static str) -> EngineResult<u64> {
    u64::try_from(value).map_err(|_| EngineError::MathOverflow(context))
}
