// swap-engine/src/state.rs

use crate::allowlist::{validate_allowlist, AllowlistEntry};
use crate::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use swap_core::{
    pool_address, sell_state_address, Address, PaymentCurrency, PoolUuid, Timestamp, BPS_DENOM,
};
use std::collections::HashMap;

/// Bonding curve shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveKind {
    /// Spot moves by `curve_delta` base units per unit traded
    Linear,
    /// Spot moves by a factor of `(10000 + curve_delta) / 10000` per unit
    Exponential,
}

/// Binding to an owner-level shared payment escrow, capped to a number of
/// remaining fulfillments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedEscrowBinding {
    pub account: Address,
    pub remaining_fulfillments: u64,
}

impl SharedEscrowBinding {
    pub fn is_live(&self) -> bool {
        self.remaining_fulfillments > 0
    }
}

/// Policy fields of a pool, supplied whole at create and update time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Must co-authorize every mutating operation
    pub cosigner: Address,
    pub curve_kind: CurveKind,
    /// Current curve position, in payment-currency base units
    pub spot_price: u64,
    pub curve_delta: u64,
    /// Unix timestamp; 0 means never
    pub expiry: Timestamp,
    pub lp_fee_bp: u16,
    /// Keep assets acquired on fulfill-buy in the sell inventory
    pub reinvest_fulfill_buy: bool,
    /// Keep payment received on fulfill-sell in the buy-side escrow
    pub reinvest_fulfill_sell: bool,
    pub referral: Address,
    /// Cap on the combined maker+taker referral take per fulfillment
    pub referral_bp: u16,
    /// Scales the asset's metadata royalty on fulfillments
    pub buyside_creator_royalty_bp: u16,
    pub allowlist: Vec<AllowlistEntry>,
    pub payment_currency: PaymentCurrency,
    /// Free text bound to the cosigner relationship
    pub cosigner_annotation: String,
}

impl PoolConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.spot_price == 0 {
            return Err(EngineError::InvalidCurve("spot price must be positive".into()));
        }
        if self.curve_kind == CurveKind::Exponential && self.curve_delta > BPS_DENOM {
            return Err(EngineError::InvalidCurve(format!(
                "exponential curve delta {} exceeds {} bp",
                self.curve_delta, BPS_DENOM
            )));
        }
        for (name, bp) in [
            ("lpFeeBp", self.lp_fee_bp),
            ("referralBp", self.referral_bp),
            ("buysideCreatorRoyaltyBp", self.buyside_creator_royalty_bp),
        ] {
            if bp as u64 > BPS_DENOM {
                return Err(EngineError::InvalidFee(format!(
                    "{name} {bp} exceeds {BPS_DENOM}"
                )));
            }
        }
        if self.cosigner.is_zero() {
            return Err(EngineError::InvalidOperation(
                "cosigner must be set".into(),
            ));
        }
        validate_allowlist(&self.allowlist)
    }
}

/// Persistent record of one liquidity pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Derived from (engine, owner, uuid)
    pub address: Address,
    pub owner: Address,
    pub uuid: PoolUuid,
    pub config: PoolConfig,
    /// Total asset units currently held for sale across all sell states
    pub sellside_asset_amount: u64,
    /// Cumulative lp fees accrued to the owner
    pub lp_fee_earned: u64,
    /// Payment escrowed in the pool's own buy-side escrow
    pub buyside_payment_amount: u64,
    pub shared_escrow: Option<SharedEscrowBinding>,
    pub total_buy_fulfillments: u64,
    pub total_sell_fulfillments: u64,
    pub created_at: Timestamp,
}

impl Pool {
    pub fn new(
        engine_id: &Address,
        owner: Address,
        uuid: PoolUuid,
        config: PoolConfig,
        now: Timestamp,
    ) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            address: pool_address(engine_id, &owner, uuid),
            owner,
            uuid,
            config,
            sellside_asset_amount: 0,
            lp_fee_earned: 0,
            buyside_payment_amount: 0,
            shared_escrow: None,
            total_buy_fulfillments: 0,
            total_sell_fulfillments: 0,
            created_at: now,
        })
    }

    /// Whether the policy expiry has passed
    pub fn expired(&self, now: Timestamp) -> bool {
        self.config.expiry != 0 && now >= self.config.expiry
    }

    /// A live shared-escrow binding keeps the pool open even when both
    /// sides are empty
    pub fn shared_escrow_live(&self) -> bool {
        self.shared_escrow.map(|b| b.is_live()).unwrap_or(false)
    }
}

/// Per-(pool, asset) inventory record, created lazily on first deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellState {
    /// Derived from (engine, pool, asset)
    pub address: Address,
    pub pool: Address,
    /// Denormalized for authorization checks
    pub pool_owner: Address,
    pub asset: Address,
    pub asset_amount: u64,
    pub cosigner_annotation: String,
}

impl SellState {
    pub fn new(engine_id: &Address, pool: &Pool, asset: Address) -> Self {
        Self {
            address: sell_state_address(engine_id, &pool.address, &asset),
            pool: pool.address,
            pool_owner: pool.owner,
            asset,
            asset_amount: 0,
            cosigner_annotation: pool.config.cosigner_annotation.clone(),
        }
    }
}

/// Explicit keyed store for pool and sell-state records. All mutation is
/// funneled through the engine operations; there are no ambient singletons.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStore {
    pools: HashMap<Address, Pool>,
    sell_states: HashMap<Address, SellState>,
}

impl PoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self, address: &Address) -> Option<&Pool> {
        self.pools.get(address)
    }

    pub fn pool_mut(&mut self, address: &Address) -> Option<&mut Pool> {
        self.pools.get_mut(address)
    }

    pub fn insert_pool(&mut self, pool: Pool) {
        self.pools.insert(pool.address, pool);
    }

    pub fn remove_pool(&mut self, address: &Address) -> Option<Pool> {
        self.pools.remove(address)
    }

    pub fn contains_pool(&self, address: &Address) -> bool {
        self.pools.contains_key(address)
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn sell_state(&self, address: &Address) -> Option<&SellState> {
        self.sell_states.get(address)
    }

    pub fn sell_state_mut(&mut self, address: &Address) -> Option<&mut SellState> {
        self.sell_states.get_mut(address)
    }

    pub fn insert_sell_state(&mut self, state: SellState) {
        self.sell_states.insert(state.address, state);
    }

    pub fn remove_sell_state(&mut self, address: &Address) -> Option<SellState> {
        self.sell_states.remove(address)
    }

    pub fn sell_state_count(&self) -> usize {
        self.sell_states.len()
    }
}
