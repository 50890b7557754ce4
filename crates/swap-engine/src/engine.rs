// swap-engine/src/engine.rs

use crate::allowlist::{eligible, AssetFacts};
use crate::curve::{price_fulfillment, PriceQuote, TradeSide};
use crate::fees::{
    buyside_settlement, sellside_settlement, split_royalty, validate_signed_fees,
    BuysideSettlement, SellsideSettlement,
};
use crate::ledger::{Ledger, POOL_RENT, SELL_STATE_RENT};
use crate::providers::{
    AssetMetadataProvider, Clock, TokenStandard, TransferAux, TransferRegistry, TransferRequest,
};
use crate::state::{Pool, PoolConfig, PoolStore, SellState, SharedEscrowBinding};
use crate::{EngineError, EngineResult};
use swap_core::{
    buyside_escrow_address, sell_state_address, shared_escrow_address, Address, PoolUuid,
};

/// Arguments for fulfill-buy: the pool purchases `asset_amount` units from
/// `seller`, who demands at least `min_payment` in proceeds.
#[derive(Debug, Clone)]
pub struct FulfillBuyArgs {
    pub cosigner: Address,
    pub seller: Address,
    pub asset: Address,
    pub asset_amount: u64,
    pub min_payment: u64,
    pub taker_fee_bp: i16,
    pub maker_fee_bp: i16,
    pub allowlist_aux: Option<String>,
    pub transfer_aux: TransferAux,
}

/// Arguments for fulfill-sell: `buyer` purchases `asset_amount` units from
/// the pool's inventory, paying at most `max_payment` gross.
#[derive(Debug, Clone)]
pub struct FulfillSellArgs {
    pub cosigner: Address,
    pub buyer: Address,
    pub asset: Address,
    pub asset_amount: u64,
    pub max_payment: u64,
    /// Must match the pool's recorded override
    pub buyside_creator_royalty_bp: u16,
    pub taker_fee_bp: i16,
    pub maker_fee_bp: i16,
    pub allowlist_aux: Option<String>,
    pub transfer_aux: TransferAux,
}

// Everything a fulfillment needs computed before any state moves.
struct BuyPlan {
    facts: AssetFacts,
    standard: TokenStandard,
    quote: PriceQuote,
    settlement: BuysideSettlement,
    royalty_payouts: Vec<(Address, u64)>,
    funding_source: Address,
    uses_shared_escrow: bool,
    escrow_debit: u64,
}

struct SellPlan {
    facts: AssetFacts,
    standard: TokenStandard,
    quote: PriceQuote,
    settlement: SellsideSettlement,
    royalty_payouts: Vec<(Address, u64)>,
}

/// The economic core: owns the keyed record store and the settlement
/// ledger, and reaches external collaborators through capability traits.
///
/// Every operation is atomic: all fallible computation and balance checks
/// run against a working copy, and records are only committed once nothing
/// can fail.
pub struct PoolEngine {
    engine_id: Address,
    store: PoolStore,
    ledger: Ledger,
    metadata: Box<dyn AssetMetadataProvider>,
    transfers: TransferRegistry,
    clock: Box<dyn Clock>,
}

impl PoolEngine {
    pub fn new(
        engine_id: Address,
        metadata: Box<dyn AssetMetadataProvider>,
        transfers: TransferRegistry,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            engine_id,
            store: PoolStore::new(),
            ledger: Ledger::new(),
            metadata,
            transfers,
            clock,
        }
    }

    pub fn engine_id(&self) -> Address {
        self.engine_id
    }

    pub fn store(&self) -> &PoolStore {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Mutable ledger access for seeding balances and holdings
    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn pool(&self, address: &Address) -> EngineResult<&Pool> {
        self.store
            .pool(address)
            .ok_or(EngineError::PoolNotFound(*address))
    }

    fn pool_record(&mut self, address: &Address) -> EngineResult<&mut Pool> {
        self.store
            .pool_mut(address)
            .ok_or(EngineError::PoolNotFound(*address))
    }

    /// Address of a pool's own buy-side escrow
    pub fn buyside_escrow(&self, pool: &Address) -> Address {
        buyside_escrow_address(&self.engine_id, pool)
    }

    /// Address of an owner's shared escrow
    pub fn shared_escrow_account(&self, owner: &Address) -> Address {
        shared_escrow_address(&self.engine_id, owner)
    }

    // ------------------------------------------------------------------
    // Pool lifecycle
    // ------------------------------------------------------------------

    pub fn create_pool(
        &mut self,
        owner: Address,
        uuid: PoolUuid,
        config: PoolConfig,
    ) -> EngineResult<Address> {
        let pool = Pool::new(&self.engine_id, owner, uuid, config, self.clock.unix_now())?;
        let address = pool.address;
        if self.store.contains_pool(&address) {
            return Err(EngineError::InvalidOperation(format!(
                "pool {address} already exists"
            )));
        }

        self.ledger
            .transfer(&owner, &address, swap_core::PaymentCurrency::Native, POOL_RENT)?;
        self.store.insert_pool(pool);

        tracing::info!(pool = %address, owner = %owner, uuid, "pool created");
        Ok(address)
    }

    pub fn update_pool(
        &mut self,
        pool_address: &Address,
        owner: &Address,
        cosigner: &Address,
        config: PoolConfig,
    ) -> EngineResult<()> {
        let pool = self.pool(pool_address)?;
        authorize_owner(pool, owner, cosigner)?;
        config.validate()?;
        if config.payment_currency != pool.config.payment_currency {
            return Err(EngineError::InvalidOperation(
                "payment currency cannot change after creation".into(),
            ));
        }

        let pool = self.pool_record(pool_address)?;
        pool.config = config;
        tracing::info!(pool = %pool_address, "pool policy updated");
        Ok(())
    }

    pub fn close_pool(
        &mut self,
        pool_address: &Address,
        owner: &Address,
        cosigner: &Address,
    ) -> EngineResult<()> {
        let pool = self.pool(pool_address)?;
        authorize_owner(pool, owner, cosigner)?;

        let escrow = self.buyside_escrow(pool_address);
        let escrow_balance = self.ledger.balance(&escrow, pool.config.payment_currency);
        if pool.sellside_asset_amount != 0 || escrow_balance != 0 {
            return Err(EngineError::PoolNotEmpty);
        }

        let owner = pool.owner;
        self.ledger.transfer(
            pool_address,
            &owner,
            swap_core::PaymentCurrency::Native,
            POOL_RENT,
        )?;
        self.store.remove_pool(pool_address);
        tracing::info!(pool = %pool_address, "pool closed, rent reclaimed");
        Ok(())
    }

    pub fn set_shared_escrow(
        &mut self,
        pool_address: &Address,
        owner: &Address,
        cosigner: &Address,
        shared_escrow_count: u64,
    ) -> EngineResult<()> {
        let pool = self.pool(pool_address)?;
        authorize_owner(pool, owner, cosigner)?;

        let binding = if shared_escrow_count == 0 {
            None
        } else {
            let escrow = self.buyside_escrow(pool_address);
            if self.ledger.balance(&escrow, pool.config.payment_currency) != 0 {
                return Err(EngineError::InvalidOperation(
                    "own buy-side escrow must be empty before binding a shared escrow".into(),
                ));
            }
            Some(SharedEscrowBinding {
                account: self.shared_escrow_account(&pool.owner),
                remaining_fulfillments: shared_escrow_count,
            })
        };

        let pool = self.pool_record(pool_address)?;
        pool.shared_escrow = binding;
        tracing::info!(pool = %pool_address, shared_escrow_count, "shared escrow binding updated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Payment side
    // ------------------------------------------------------------------

    pub fn deposit_payment(
        &mut self,
        pool_address: &Address,
        owner: &Address,
        cosigner: &Address,
        amount: u64,
    ) -> EngineResult<()> {
        let pool = self.pool(pool_address)?;
        authorize_owner(pool, owner, cosigner)?;
        self.require_not_expired(pool)?;
        if amount == 0 {
            return Err(EngineError::InvalidOperation(
                "deposit amount must be positive".into(),
            ));
        }
        if pool.shared_escrow_live() {
            return Err(EngineError::InvalidOperation(
                "pool draws from a shared escrow; own-escrow deposits are disabled".into(),
            ));
        }

        let currency = pool.config.payment_currency;
        let new_accumulated = pool
            .buyside_payment_amount
            .checked_add(amount)
            .ok_or(EngineError::MathOverflow("buyside accumulator"))?;
        let escrow = self.buyside_escrow(pool_address);

        self.ledger.transfer(owner, &escrow, currency, amount)?;
        let pool = self.pool_record(pool_address)?;
        pool.buyside_payment_amount = new_accumulated;
        Ok(())
    }

    /// Withdraws up to `amount`, clamped to the available escrow balance.
    /// Returns what was actually withdrawn.
    pub fn withdraw_payment(
        &mut self,
        pool_address: &Address,
        owner: &Address,
        cosigner: &Address,
        amount: u64,
    ) -> EngineResult<u64> {
        let pool = self.pool(pool_address)?;
        authorize_owner(pool, owner, cosigner)?;

        let currency = pool.config.payment_currency;
        let escrow = self.buyside_escrow(pool_address);
        let available = self.ledger.balance(&escrow, currency);
        let withdrawn = amount.min(available);

        self.ledger.transfer(&escrow, owner, currency, withdrawn)?;
        let pool = self.pool_record(pool_address)?;
        pool.buyside_payment_amount = pool.buyside_payment_amount.saturating_sub(withdrawn);

        self.auto_close_if_empty(pool_address)?;
        Ok(withdrawn)
    }

    // ------------------------------------------------------------------
    // Asset side
    // ------------------------------------------------------------------

    pub fn deposit_asset(
        &mut self,
        pool_address: &Address,
        owner: &Address,
        cosigner: &Address,
        asset: &Address,
        amount: u64,
        allowlist_aux: Option<&str>,
        transfer_aux: &TransferAux,
    ) -> EngineResult<()> {
        let pool = self.pool(pool_address)?.clone();
        authorize_owner(&pool, owner, cosigner)?;
        self.require_not_expired(&pool)?;
        if amount == 0 {
            return Err(EngineError::InvalidOperation(
                "deposit amount must be positive".into(),
            ));
        }

        let facts = self.asset_facts(asset)?;
        if !eligible(&facts, &pool.config.allowlist, allowlist_aux) {
            return Err(EngineError::NotEligible);
        }
        let standard = self.metadata.token_standard(asset)?;

        let new_sellside = pool
            .sellside_asset_amount
            .checked_add(amount)
            .ok_or(EngineError::MathOverflow("sellside accumulator"))?;
        let state_address = sell_state_address(&self.engine_id, pool_address, asset);
        let existing = self.store.sell_state(&state_address).cloned();
        let new_amount = existing
            .as_ref()
            .map(|s| s.asset_amount)
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(EngineError::MathOverflow("sell state amount"))?;

        let mut book = self.ledger.clone();
        self.transfers.provider_for(standard)?.transfer(
            &mut book,
            &TransferRequest {
                asset: *asset,
                from: *owner,
                to: *pool_address,
                amount,
                aux: transfer_aux,
            },
        )?;
        if existing.is_none() {
            book.transfer(
                owner,
                &state_address,
                swap_core::PaymentCurrency::Native,
                SELL_STATE_RENT,
            )?;
        }

        // Commit
        self.ledger = book;
        let mut state =
            existing.unwrap_or_else(|| SellState::new(&self.engine_id, &pool, *asset));
        state.asset_amount = new_amount;
        self.store.insert_sell_state(state);
        let pool = self.pool_record(pool_address)?;
        pool.sellside_asset_amount = new_sellside;

        tracing::debug!(pool = %pool_address, asset = %asset, amount, "asset deposited");
        Ok(())
    }

    pub fn withdraw_asset(
        &mut self,
        pool_address: &Address,
        owner: &Address,
        cosigner: &Address,
        asset: &Address,
        amount: u64,
        transfer_aux: &TransferAux,
    ) -> EngineResult<()> {
        let pool = self.pool(pool_address)?.clone();
        authorize_owner(&pool, owner, cosigner)?;
        if amount == 0 {
            return Err(EngineError::InvalidOperation(
                "withdrawal amount must be positive".into(),
            ));
        }

        let state_address = sell_state_address(&self.engine_id, pool_address, asset);
        let state = self
            .store
            .sell_state(&state_address)
            .ok_or(EngineError::SellStateNotFound(*asset))?
            .clone();
        if state.asset_amount < amount {
            return Err(EngineError::InsufficientInventory {
                requested: amount,
                available: state.asset_amount,
            });
        }
        let standard = self.metadata.token_standard(asset)?;
        let new_sellside = pool
            .sellside_asset_amount
            .checked_sub(amount)
            .ok_or(EngineError::MathOverflow("sellside accumulator"))?;
        let remaining = state.asset_amount - amount;

        let mut book = self.ledger.clone();
        self.transfers.provider_for(standard)?.transfer(
            &mut book,
            &TransferRequest {
                asset: *asset,
                from: *pool_address,
                to: *owner,
                amount,
                aux: transfer_aux,
            },
        )?;
        if remaining == 0 {
            book.transfer(
                &state_address,
                owner,
                swap_core::PaymentCurrency::Native,
                SELL_STATE_RENT,
            )?;
        }

        // Commit
        self.ledger = book;
        if remaining == 0 {
            self.store.remove_sell_state(&state_address);
        } else if let Some(state) = self.store.sell_state_mut(&state_address) {
            state.asset_amount = remaining;
        }
        let pool = self.pool_record(pool_address)?;
        pool.sellside_asset_amount = new_sellside;

        tracing::debug!(pool = %pool_address, asset = %asset, amount, "asset withdrawn");
        self.auto_close_if_empty(pool_address)
    }

    // ------------------------------------------------------------------
    // Fulfillments
    // ------------------------------------------------------------------

    /// Price a fulfill-buy without touching state
    pub fn quote_fulfill_buy(
        &self,
        pool_address: &Address,
        asset: &Address,
        asset_amount: u64,
        taker_fee_bp: i16,
        maker_fee_bp: i16,
    ) -> EngineResult<(PriceQuote, BuysideSettlement)> {
        let pool = self.pool(pool_address)?;
        let plan = self.plan_buyside(pool, asset, asset_amount, taker_fee_bp, maker_fee_bp)?;
        Ok((plan.quote, plan.settlement))
    }

    /// Price a fulfill-sell without touching state
    pub fn quote_fulfill_sell(
        &self,
        pool_address: &Address,
        asset: &Address,
        asset_amount: u64,
        taker_fee_bp: i16,
        maker_fee_bp: i16,
    ) -> EngineResult<(PriceQuote, SellsideSettlement)> {
        let pool = self.pool(pool_address)?;
        let plan = self.plan_sellside(pool, asset, asset_amount, taker_fee_bp, maker_fee_bp)?;
        Ok((plan.quote, plan.settlement))
    }

    /// The pool buys `asset_amount` units from the seller.
    pub fn fulfill_buy(
        &mut self,
        pool_address: &Address,
        args: FulfillBuyArgs,
    ) -> EngineResult<BuysideSettlement> {
        let pool = self.pool(pool_address)?.clone();
        require_cosigner(&pool, &args.cosigner)?;
        self.require_not_expired(&pool)?;

        let plan = self.plan_buyside(
            &pool,
            &args.asset,
            args.asset_amount,
            args.taker_fee_bp,
            args.maker_fee_bp,
        )?;
        if !eligible(
            &plan.facts,
            &pool.config.allowlist,
            args.allowlist_aux.as_deref(),
        ) {
            return Err(EngineError::NotEligible);
        }
        if plan.settlement.seller_receives < args.min_payment {
            return Err(EngineError::SlippageExceeded {
                bound: args.min_payment,
                actual: plan.settlement.seller_receives,
            });
        }

        let currency = pool.config.payment_currency;
        let source_balance = self.ledger.balance(&plan.funding_source, currency);
        if source_balance < plan.escrow_debit {
            return Err(if plan.uses_shared_escrow {
                EngineError::InsufficientSharedEscrow {
                    required: plan.escrow_debit,
                    available: source_balance,
                }
            } else {
                EngineError::InsufficientBalance {
                    required: plan.escrow_debit,
                    available: source_balance,
                }
            });
        }

        // Pool-record values after the trade, all checked before commit
        let reinvest = pool.config.reinvest_fulfill_buy;
        let new_sellside = if reinvest {
            pool.sellside_asset_amount
                .checked_add(args.asset_amount)
                .ok_or(EngineError::MathOverflow("sellside accumulator"))?
        } else {
            pool.sellside_asset_amount
        };
        let new_lp_earned = pool
            .lp_fee_earned
            .checked_add(plan.settlement.lp_fee)
            .ok_or(EngineError::MathOverflow("lp fee accumulator"))?;
        let new_buyside = if plan.uses_shared_escrow {
            pool.buyside_payment_amount
        } else {
            pool.buyside_payment_amount.saturating_sub(plan.escrow_debit)
        };

        let state_address = sell_state_address(&self.engine_id, pool_address, &args.asset);
        let existing_state = self.store.sell_state(&state_address).cloned();
        let new_state_amount = if reinvest {
            existing_state
                .as_ref()
                .map(|s| s.asset_amount)
                .unwrap_or(0)
                .checked_add(args.asset_amount)
                .ok_or(EngineError::MathOverflow("sell state amount"))?
        } else {
            0
        };

        let mut book = self.ledger.clone();
        let custody = if reinvest { *pool_address } else { pool.owner };
        self.transfers.provider_for(plan.standard)?.transfer(
            &mut book,
            &TransferRequest {
                asset: args.asset,
                from: args.seller,
                to: custody,
                amount: args.asset_amount,
                aux: &args.transfer_aux,
            },
        )?;
        if reinvest && existing_state.is_none() {
            book.transfer(
                &pool.owner,
                &state_address,
                swap_core::PaymentCurrency::Native,
                SELL_STATE_RENT,
            )?;
        }
        book.debit(&plan.funding_source, currency, plan.escrow_debit)?;
        book.credit(&args.seller, currency, plan.settlement.seller_receives)?;
        book.credit(&pool.owner, currency, plan.settlement.lp_fee)?;
        book.credit(&pool.config.referral, currency, plan.settlement.referral_total()?)?;
        for (creator, cut) in &plan.royalty_payouts {
            book.credit(creator, currency, *cut)?;
        }

        // Commit
        self.ledger = book;
        if reinvest {
            let mut state = existing_state
                .unwrap_or_else(|| SellState::new(&self.engine_id, &pool, args.asset));
            state.asset_amount = new_state_amount;
            self.store.insert_sell_state(state);
        }
        let record = self.pool_record(pool_address)?;
        record.config.spot_price = plan.quote.new_spot_price;
        record.sellside_asset_amount = new_sellside;
        record.lp_fee_earned = new_lp_earned;
        record.buyside_payment_amount = new_buyside;
        if plan.uses_shared_escrow {
            if let Some(binding) = record.shared_escrow.as_mut() {
                binding.remaining_fulfillments -= 1;
            }
        }
        record.total_buy_fulfillments += 1;

        tracing::info!(
            pool = %pool_address,
            asset = %args.asset,
            amount = args.asset_amount,
            total_price = plan.settlement.total_price,
            seller_receives = plan.settlement.seller_receives,
            new_spot = plan.quote.new_spot_price,
            "fulfill-buy settled"
        );

        self.auto_close_if_empty(pool_address)?;
        Ok(plan.settlement)
    }

    /// The pool sells `asset_amount` units of its inventory to the buyer.
    pub fn fulfill_sell(
        &mut self,
        pool_address: &Address,
        args: FulfillSellArgs,
    ) -> EngineResult<SellsideSettlement> {
        let pool = self.pool(pool_address)?.clone();
        require_cosigner(&pool, &args.cosigner)?;
        self.require_not_expired(&pool)?;
        if args.buyside_creator_royalty_bp != pool.config.buyside_creator_royalty_bp {
            return Err(EngineError::InvalidFee(format!(
                "royalty override {} does not match pool policy {}",
                args.buyside_creator_royalty_bp, pool.config.buyside_creator_royalty_bp
            )));
        }

        let state_address = sell_state_address(&self.engine_id, pool_address, &args.asset);
        let state = self
            .store
            .sell_state(&state_address)
            .ok_or(EngineError::SellStateNotFound(args.asset))?
            .clone();
        if state.asset_amount < args.asset_amount {
            return Err(EngineError::InsufficientInventory {
                requested: args.asset_amount,
                available: state.asset_amount,
            });
        }

        let plan = self.plan_sellside(
            &pool,
            &args.asset,
            args.asset_amount,
            args.taker_fee_bp,
            args.maker_fee_bp,
        )?;
        if !eligible(
            &plan.facts,
            &pool.config.allowlist,
            args.allowlist_aux.as_deref(),
        ) {
            return Err(EngineError::NotEligible);
        }
        if plan.settlement.buyer_pays > args.max_payment {
            return Err(EngineError::SlippageExceeded {
                bound: args.max_payment,
                actual: plan.settlement.buyer_pays,
            });
        }

        let currency = pool.config.payment_currency;
        let buyer_balance = self.ledger.balance(&args.buyer, currency);
        if buyer_balance < plan.settlement.buyer_pays {
            return Err(EngineError::InsufficientBalance {
                required: plan.settlement.buyer_pays,
                available: buyer_balance,
            });
        }

        // Proceeds stay with the pool when reinvesting, otherwise they are
        // forwarded to the owner. A live shared binding receives them in
        // the shared account.
        let reinvest = pool.config.reinvest_fulfill_sell;
        let escrow = self.buyside_escrow(pool_address);
        let (proceeds_to, new_buyside) = if !reinvest {
            (pool.owner, pool.buyside_payment_amount)
        } else if let Some(binding) = pool.shared_escrow.filter(SharedEscrowBinding::is_live) {
            (binding.account, pool.buyside_payment_amount)
        } else {
            let accumulated = pool
                .buyside_payment_amount
                .checked_add(plan.settlement.pool_receives)
                .ok_or(EngineError::MathOverflow("buyside accumulator"))?;
            (escrow, accumulated)
        };

        let new_sellside = pool
            .sellside_asset_amount
            .checked_sub(args.asset_amount)
            .ok_or(EngineError::MathOverflow("sellside accumulator"))?;
        let new_lp_earned = pool
            .lp_fee_earned
            .checked_add(plan.settlement.lp_fee)
            .ok_or(EngineError::MathOverflow("lp fee accumulator"))?;
        let remaining_inventory = state.asset_amount - args.asset_amount;

        let mut book = self.ledger.clone();
        self.transfers.provider_for(plan.standard)?.transfer(
            &mut book,
            &TransferRequest {
                asset: args.asset,
                from: *pool_address,
                to: args.buyer,
                amount: args.asset_amount,
                aux: &args.transfer_aux,
            },
        )?;
        book.debit(&args.buyer, currency, plan.settlement.buyer_pays)?;
        book.credit(&proceeds_to, currency, plan.settlement.pool_receives)?;
        book.credit(&pool.owner, currency, plan.settlement.lp_fee)?;
        book.credit(&pool.config.referral, currency, plan.settlement.referral_total()?)?;
        for (creator, cut) in &plan.royalty_payouts {
            book.credit(creator, currency, *cut)?;
        }
        if remaining_inventory == 0 {
            book.transfer(
                &state_address,
                &pool.owner,
                swap_core::PaymentCurrency::Native,
                SELL_STATE_RENT,
            )?;
        }

        // Commit
        self.ledger = book;
        if remaining_inventory == 0 {
            self.store.remove_sell_state(&state_address);
        } else if let Some(state) = self.store.sell_state_mut(&state_address) {
            state.asset_amount = remaining_inventory;
        }
        let record = self.pool_record(pool_address)?;
        record.config.spot_price = plan.quote.new_spot_price;
        record.sellside_asset_amount = new_sellside;
        record.lp_fee_earned = new_lp_earned;
        record.buyside_payment_amount = new_buyside;
        record.total_sell_fulfillments += 1;

        tracing::info!(
            pool = %pool_address,
            asset = %args.asset,
            amount = args.asset_amount,
            total_price = plan.settlement.total_price,
            buyer_pays = plan.settlement.buyer_pays,
            new_spot = plan.quote.new_spot_price,
            "fulfill-sell settled"
        );

        self.auto_close_if_empty(pool_address)?;
        Ok(plan.settlement)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn plan_buyside(
        &self,
        pool: &Pool,
        asset: &Address,
        asset_amount: u64,
        taker_fee_bp: i16,
        maker_fee_bp: i16,
    ) -> EngineResult<BuyPlan> {
        validate_signed_fees(taker_fee_bp, maker_fee_bp, pool.config.referral_bp)?;

        let facts = self.asset_facts(asset)?;
        let standard = self.metadata.token_standard(asset)?;
        let royalty_bp = if facts.creators.is_empty() {
            0
        } else {
            self.metadata.royalty_bp(asset)?
        };

        let (funding_source, uses_shared_escrow) = match pool.shared_escrow {
            Some(binding) => {
                if !binding.is_live() {
                    return Err(EngineError::SharedEscrowExhausted);
                }
                (binding.account, true)
            }
            None => (self.buyside_escrow(&pool.address), false),
        };
        let source_balance = self
            .ledger
            .balance(&funding_source, pool.config.payment_currency);
        let lp_fee_bp = effective_lp_fee_bp(pool, source_balance);

        let quote = price_fulfillment(
            pool.config.curve_kind,
            pool.config.spot_price,
            pool.config.curve_delta,
            asset_amount,
            TradeSide::PoolBuys,
        )?;
        let settlement = buyside_settlement(
            quote.total,
            lp_fee_bp,
            royalty_bp,
            pool.config.buyside_creator_royalty_bp,
            taker_fee_bp,
            maker_fee_bp,
        )?;
        let royalty_payouts = split_royalty(settlement.royalty_fee, &facts.creators);
        let escrow_debit = settlement.escrow_debit()?;

        tracing::debug!(
            pool = %pool.address,
            total = settlement.total_price,
            lp_fee_bp,
            royalty_bp,
            "buy-side plan priced"
        );

        Ok(BuyPlan {
            facts,
            standard,
            quote,
            settlement,
            royalty_payouts,
            funding_source,
            uses_shared_escrow,
            escrow_debit,
        })
    }

    fn plan_sellside(
        &self,
        pool: &Pool,
        asset: &Address,
        asset_amount: u64,
        taker_fee_bp: i16,
        maker_fee_bp: i16,
    ) -> EngineResult<SellPlan> {
        validate_signed_fees(taker_fee_bp, maker_fee_bp, pool.config.referral_bp)?;

        let facts = self.asset_facts(asset)?;
        let standard = self.metadata.token_standard(asset)?;
        let royalty_bp = if facts.creators.is_empty() {
            0
        } else {
            self.metadata.royalty_bp(asset)?
        };

        let funding_source = match pool.shared_escrow {
            Some(binding) if binding.is_live() => binding.account,
            _ => self.buyside_escrow(&pool.address),
        };
        let source_balance = self
            .ledger
            .balance(&funding_source, pool.config.payment_currency);
        let lp_fee_bp = effective_lp_fee_bp(pool, source_balance);

        let quote = price_fulfillment(
            pool.config.curve_kind,
            pool.config.spot_price,
            pool.config.curve_delta,
            asset_amount,
            TradeSide::PoolSells,
        )?;
        let settlement = sellside_settlement(
            quote.total,
            lp_fee_bp,
            royalty_bp,
            pool.config.buyside_creator_royalty_bp,
            taker_fee_bp,
            maker_fee_bp,
        )?;
        let royalty_payouts = split_royalty(settlement.royalty_fee, &facts.creators);

        tracing::debug!(
            pool = %pool.address,
            total = settlement.total_price,
            lp_fee_bp,
            royalty_bp,
            "sell-side plan priced"
        );

        Ok(SellPlan {
            facts,
            standard,
            quote,
            settlement,
            royalty_payouts,
        })
    }

    fn asset_facts(&self, asset: &Address) -> EngineResult<AssetFacts> {
        Ok(AssetFacts {
            asset: *asset,
            creators: self.metadata.creators(asset)?,
            collection: self.metadata.collection(asset)?,
            group: self.metadata.group(asset)?,
            update_authority: self.metadata.update_authority(asset)?,
        })
    }

    fn require_not_expired(&self, pool: &Pool) -> EngineResult<()> {
        let now = self.clock.unix_now();
        if pool.expired(now) {
            return Err(EngineError::PoolExpired {
                expiry: pool.config.expiry,
                now,
            });
        }
        Ok(())
    }

    // A pool with no inventory, no own-escrow funds, and no live shared
    // binding is destroyed and its rent returned to the owner.
    fn auto_close_if_empty(&mut self, pool_address: &Address) -> EngineResult<()> {
        let Some(pool) = self.store.pool(pool_address) else {
            return Ok(());
        };
        let escrow = self.buyside_escrow(pool_address);
        let escrow_balance = self.ledger.balance(&escrow, pool.config.payment_currency);
        if pool.sellside_asset_amount != 0 || escrow_balance != 0 || pool.shared_escrow_live() {
            return Ok(());
        }

        let owner = pool.owner;
        self.ledger.transfer(
            pool_address,
            &owner,
            swap_core::PaymentCurrency::Native,
            POOL_RENT,
        )?;
        self.store.remove_pool(pool_address);
        tracing::info!(pool = %pool_address, owner = %owner, "empty pool auto-closed");
        Ok(())
    }
}

fn authorize_owner(pool: &Pool, owner: &Address, cosigner: &Address) -> EngineResult<()> {
    if *owner != pool.owner {
        return Err(EngineError::Unauthorized(format!(
            "signer {owner} is not the pool owner"
        )));
    }
    require_cosigner(pool, cosigner)
}

fn require_cosigner(pool: &Pool, cosigner: &Address) -> EngineResult<()> {
    if *cosigner != pool.config.cosigner {
        return Err(EngineError::Unauthorized(format!(
            "{cosigner} is not the pool cosigner"
        )));
    }
    Ok(())
}

// The lp fee only applies while the pool is quoting two-sided: it must
// hold sell inventory and enough buy-side capacity to cover one unit at
// spot. One-sided pools trade fee-free for the owner.
fn effective_lp_fee_bp(pool: &Pool, funding_balance: u64) -> u16 {
    if pool.sellside_asset_amount == 0 || funding_balance < pool.config.spot_price {
        return 0;
    }
    pool.config.lp_fee_bp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::AllowlistEntry;
    use crate::providers::{AssetRecord, FixedClock, InMemoryMetadata};
    use crate::state::CurveKind;
    use swap_core::PaymentCurrency;

    const UNIT: u64 = 1_000_000_000;

    fn addr(seed: &[u8]) -> Address {
        Address::from_seed(seed)
    }

    fn engine_with_assets(assets: &[(Address, AssetRecord)]) -> PoolEngine {
        let mut metadata = InMemoryMetadata::new();
        for (asset, record) in assets {
            metadata.insert(*asset, record.clone());
        }
        PoolEngine::new(
            addr(b"engine"),
            Box::new(metadata),
            TransferRegistry::default(),
            Box::new(FixedClock(1_700_000_000)),
        )
    }

    fn base_config() -> PoolConfig {
        PoolConfig {
            cosigner: addr(b"cosigner"),
            curve_kind: CurveKind::Linear,
            spot_price: UNIT,
            curve_delta: UNIT / 10,
            expiry: 0,
            lp_fee_bp: 0,
            reinvest_fulfill_buy: false,
            reinvest_fulfill_sell: false,
            referral: addr(b"referral"),
            referral_bp: 1_000,
            buyside_creator_royalty_bp: 0,
            allowlist: vec![AllowlistEntry::Any],
            payment_currency: PaymentCurrency::Native,
            cosigner_annotation: String::new(),
        }
    }

    fn fund(engine: &mut PoolEngine, who: &Address, amount: u64) {
        engine
            .ledger_mut()
            .credit(who, PaymentCurrency::Native, amount)
            .unwrap();
    }

    #[test]
    fn test_create_pool_locks_rent() {
        let mut engine = engine_with_assets(&[]);
        let owner = addr(b"owner");
        fund(&mut engine, &owner, POOL_RENT);

        let pool = engine.create_pool(owner, 0, base_config()).unwrap();
        assert_eq!(engine.ledger().balance(&owner, PaymentCurrency::Native), 0);
        assert_eq!(
            engine.ledger().balance(&pool, PaymentCurrency::Native),
            POOL_RENT
        );
    }

    #[test]
    fn test_create_pool_requires_rent_funds() {
        let mut engine = engine_with_assets(&[]);
        let err = engine
            .create_pool(addr(b"owner"), 0, base_config())
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
        assert_eq!(engine.store().pool_count(), 0);
    }

    #[test]
    fn test_duplicate_pool_rejected() {
        let mut engine = engine_with_assets(&[]);
        let owner = addr(b"owner");
        fund(&mut engine, &owner, 2 * POOL_RENT);

        engine.create_pool(owner, 7, base_config()).unwrap();
        assert!(engine.create_pool(owner, 7, base_config()).is_err());
        // A different uuid is a different pool
        assert!(engine.create_pool(owner, 8, base_config()).is_ok());
    }

    #[test]
    fn test_update_pool_authorization() {
        let mut engine = engine_with_assets(&[]);
        let owner = addr(b"owner");
        fund(&mut engine, &owner, POOL_RENT);
        let pool = engine.create_pool(owner, 0, base_config()).unwrap();

        let err = engine
            .update_pool(&pool, &addr(b"mallory"), &addr(b"cosigner"), base_config())
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));

        let err = engine
            .update_pool(&pool, &owner, &addr(b"wrong-cosigner"), base_config())
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));

        let mut updated = base_config();
        updated.lp_fee_bp = 250;
        engine
            .update_pool(&pool, &owner, &addr(b"cosigner"), updated)
            .unwrap();
        assert_eq!(engine.pool(&pool).unwrap().config.lp_fee_bp, 250);
    }

    #[test]
    fn test_update_cannot_change_currency() {
        let mut engine = engine_with_assets(&[]);
        let owner = addr(b"owner");
        fund(&mut engine, &owner, POOL_RENT);
        let pool = engine.create_pool(owner, 0, base_config()).unwrap();

        let mut updated = base_config();
        updated.payment_currency = PaymentCurrency::Token(addr(b"mint"));
        assert!(engine
            .update_pool(&pool, &owner, &addr(b"cosigner"), updated)
            .is_err());
    }

    #[test]
    fn test_payment_deposit_withdraw_clamp_and_auto_close() {
        let mut engine = engine_with_assets(&[]);
        let owner = addr(b"owner");
        let cosigner = addr(b"cosigner");
        fund(&mut engine, &owner, POOL_RENT + 5 * UNIT);
        let pool = engine.create_pool(owner, 0, base_config()).unwrap();

        engine
            .deposit_payment(&pool, &owner, &cosigner, 5 * UNIT)
            .unwrap();
        assert_eq!(engine.pool(&pool).unwrap().buyside_payment_amount, 5 * UNIT);

        // Withdrawal clamps to the available balance...
        let withdrawn = engine
            .withdraw_payment(&pool, &owner, &cosigner, 100 * UNIT)
            .unwrap();
        assert_eq!(withdrawn, 5 * UNIT);

        // ...and the now-empty pool auto-closed with zero residual balance.
        assert!(engine.store().pool(&pool).is_none());
        assert_eq!(engine.ledger().balance(&pool, PaymentCurrency::Native), 0);
        assert_eq!(
            engine.ledger().balance(&owner, PaymentCurrency::Native),
            POOL_RENT + 5 * UNIT
        );
    }

    #[test]
    fn test_expired_pool_fails_closed_for_deposits() {
        let mut engine = engine_with_assets(&[]);
        let owner = addr(b"owner");
        fund(&mut engine, &owner, POOL_RENT + UNIT);

        let mut config = base_config();
        config.expiry = 1_600_000_000; // already in the past
        let pool = engine.create_pool(owner, 0, config).unwrap();

        let err = engine
            .deposit_payment(&pool, &owner, &addr(b"cosigner"), UNIT)
            .unwrap_err();
        assert!(matches!(err, EngineError::PoolExpired { .. }));
    }

    #[test]
    fn test_deposit_asset_requires_allowlist_match() {
        let asset = addr(b"asset");
        let mut engine = engine_with_assets(&[(asset, AssetRecord::basic())]);
        let owner = addr(b"owner");
        let cosigner = addr(b"cosigner");
        fund(&mut engine, &owner, POOL_RENT + SELL_STATE_RENT);

        let mut config = base_config();
        config.allowlist = vec![AllowlistEntry::AssetId(addr(b"some-other-asset"))];
        let pool = engine.create_pool(owner, 0, config).unwrap();

        engine
            .ledger_mut()
            .asset_credit(&asset, &owner, 1)
            .unwrap();
        let err = engine
            .deposit_asset(
                &pool,
                &owner,
                &cosigner,
                &asset,
                1,
                None,
                &TransferAux::default(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::NotEligible));
    }

    #[test]
    fn test_asset_round_trip_reclaims_sell_state() {
        let asset = addr(b"asset");
        let mut engine = engine_with_assets(&[(asset, AssetRecord::basic())]);
        let owner = addr(b"owner");
        let cosigner = addr(b"cosigner");
        fund(&mut engine, &owner, POOL_RENT + SELL_STATE_RENT + 10 * UNIT);
        engine
            .ledger_mut()
            .asset_credit(&asset, &owner, 5)
            .unwrap();

        let pool = engine.create_pool(owner, 0, base_config()).unwrap();
        // Keep the pool alive with some escrow while inventory empties
        engine
            .deposit_payment(&pool, &owner, &cosigner, UNIT)
            .unwrap();

        let aux = TransferAux::default();
        engine
            .deposit_asset(&pool, &owner, &cosigner, &asset, 2, None, &aux)
            .unwrap();
        engine
            .deposit_asset(&pool, &owner, &cosigner, &asset, 3, None, &aux)
            .unwrap();
        assert_eq!(engine.pool(&pool).unwrap().sellside_asset_amount, 5);
        assert_eq!(engine.store().sell_state_count(), 1);

        engine
            .withdraw_asset(&pool, &owner, &cosigner, &asset, 5, &aux)
            .unwrap();
        assert_eq!(engine.pool(&pool).unwrap().sellside_asset_amount, 0);
        assert_eq!(engine.store().sell_state_count(), 0);
        assert_eq!(engine.ledger().asset_balance(&asset, &owner), 5);

        // Sell-state rent came back to the owner
        let state_address = sell_state_address(&engine.engine_id(), &pool, &asset);
        assert_eq!(
            engine
                .ledger()
                .balance(&state_address, PaymentCurrency::Native),
            0
        );
    }

    #[test]
    fn test_withdraw_more_than_inventory_fails() {
        let asset = addr(b"asset");
        let mut engine = engine_with_assets(&[(asset, AssetRecord::basic())]);
        let owner = addr(b"owner");
        let cosigner = addr(b"cosigner");
        fund(&mut engine, &owner, POOL_RENT + SELL_STATE_RENT);
        engine
            .ledger_mut()
            .asset_credit(&asset, &owner, 1)
            .unwrap();

        let pool = engine.create_pool(owner, 0, base_config()).unwrap();
        let aux = TransferAux::default();
        engine
            .deposit_asset(&pool, &owner, &cosigner, &asset, 1, None, &aux)
            .unwrap();

        let err = engine
            .withdraw_asset(&pool, &owner, &cosigner, &asset, 2, &aux)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientInventory { .. }));
    }

    #[test]
    fn test_fulfill_buy_slippage_bound() {
        let asset = addr(b"asset");
        let mut engine = engine_with_assets(&[(asset, AssetRecord::basic())]);
        let owner = addr(b"owner");
        let seller = addr(b"seller");
        fund(&mut engine, &owner, POOL_RENT + 10 * UNIT);
        engine
            .ledger_mut()
            .asset_credit(&asset, &seller, 1)
            .unwrap();

        let pool = engine.create_pool(owner, 0, base_config()).unwrap();
        engine
            .deposit_payment(&pool, &owner, &addr(b"cosigner"), 10 * UNIT)
            .unwrap();

        let err = engine
            .fulfill_buy(
                &pool,
                FulfillBuyArgs {
                    cosigner: addr(b"cosigner"),
                    seller,
                    asset,
                    asset_amount: 1,
                    min_payment: UNIT + 1, // first unit trades at spot
                    taker_fee_bp: 0,
                    maker_fee_bp: 0,
                    allowlist_aux: None,
                    transfer_aux: TransferAux::default(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::SlippageExceeded { .. }));
        // Nothing moved
        assert_eq!(engine.ledger().asset_balance(&asset, &seller), 1);
        assert_eq!(engine.pool(&pool).unwrap().config.spot_price, UNIT);
    }

    #[test]
    fn test_fulfill_requires_cosigner() {
        let asset = addr(b"asset");
        let mut engine = engine_with_assets(&[(asset, AssetRecord::basic())]);
        let owner = addr(b"owner");
        fund(&mut engine, &owner, POOL_RENT + 10 * UNIT);
        let pool = engine.create_pool(owner, 0, base_config()).unwrap();

        let err = engine
            .fulfill_buy(
                &pool,
                FulfillBuyArgs {
                    cosigner: addr(b"impostor"),
                    seller: addr(b"seller"),
                    asset,
                    asset_amount: 1,
                    min_payment: 0,
                    taker_fee_bp: 0,
                    maker_fee_bp: 0,
                    allowlist_aux: None,
                    transfer_aux: TransferAux::default(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
    }

    #[test]
    fn test_linear_spot_moves_after_fulfillments() {
        let asset = addr(b"asset");
        let mut engine = engine_with_assets(&[(asset, AssetRecord::basic())]);
        let owner = addr(b"owner");
        let seller = addr(b"seller");
        let cosigner = addr(b"cosigner");
        fund(&mut engine, &owner, POOL_RENT + 100 * UNIT);
        engine
            .ledger_mut()
            .asset_credit(&asset, &seller, 3)
            .unwrap();

        let pool = engine.create_pool(owner, 0, base_config()).unwrap();
        engine
            .deposit_payment(&pool, &owner, &cosigner, 100 * UNIT)
            .unwrap();

        engine
            .fulfill_buy(
                &pool,
                FulfillBuyArgs {
                    cosigner,
                    seller,
                    asset,
                    asset_amount: 3,
                    min_payment: 0,
                    taker_fee_bp: 0,
                    maker_fee_bp: 0,
                    allowlist_aux: None,
                    transfer_aux: TransferAux::default(),
                },
            )
            .unwrap();

        // spot 1.0 - 3 * 0.1
        assert_eq!(
            engine.pool(&pool).unwrap().config.spot_price,
            UNIT - 3 * (UNIT / 10)
        );
        assert_eq!(engine.pool(&pool).unwrap().total_buy_fulfillments, 1);
        // Non-reinvest pool forwarded the assets to the owner
        assert_eq!(engine.ledger().asset_balance(&asset, &owner), 3);
    }

    #[test]
    fn test_shared_escrow_cap_and_exhaustion() {
        let asset = addr(b"asset");
        let mut engine = engine_with_assets(&[(asset, AssetRecord::basic())]);
        let owner = addr(b"owner");
        let seller = addr(b"seller");
        let cosigner = addr(b"cosigner");
        fund(&mut engine, &owner, POOL_RENT);
        engine
            .ledger_mut()
            .asset_credit(&asset, &seller, 2)
            .unwrap();

        let pool = engine.create_pool(owner, 0, base_config()).unwrap();
        engine
            .set_shared_escrow(&pool, &owner, &cosigner, 1)
            .unwrap();

        // Own-escrow deposits are disabled while bound
        assert!(engine
            .deposit_payment(&pool, &owner, &cosigner, UNIT)
            .is_err());

        let shared = engine.shared_escrow_account(&owner);
        fund(&mut engine, &shared, 10 * UNIT);

        let args = FulfillBuyArgs {
            cosigner,
            seller,
            asset,
            asset_amount: 1,
            min_payment: 0,
            taker_fee_bp: 0,
            maker_fee_bp: 0,
            allowlist_aux: None,
            transfer_aux: TransferAux::default(),
        };
        engine.fulfill_buy(&pool, args.clone()).unwrap();
        assert_eq!(
            engine.ledger().balance(&shared, PaymentCurrency::Native),
            9 * UNIT
        );

        // Cap of one fulfillment used up; the empty pool auto-closed.
        assert!(engine.store().pool(&pool).is_none());
    }

    #[test]
    fn test_shared_escrow_short_of_debit_aborts() {
        let asset = addr(b"asset");
        let mut engine = engine_with_assets(&[(asset, AssetRecord::basic())]);
        let owner = addr(b"owner");
        let seller = addr(b"seller");
        let cosigner = addr(b"cosigner");
        fund(&mut engine, &owner, POOL_RENT);
        engine
            .ledger_mut()
            .asset_credit(&asset, &seller, 1)
            .unwrap();

        let pool = engine.create_pool(owner, 0, base_config()).unwrap();
        engine
            .set_shared_escrow(&pool, &owner, &cosigner, 2)
            .unwrap();

        // The first unit trades at spot; the shared escrow holds half that.
        let shared = engine.shared_escrow_account(&owner);
        fund(&mut engine, &shared, UNIT / 2);

        let err = engine
            .fulfill_buy(
                &pool,
                FulfillBuyArgs {
                    cosigner,
                    seller,
                    asset,
                    asset_amount: 1,
                    min_payment: 0,
                    taker_fee_bp: 0,
                    maker_fee_bp: 0,
                    allowlist_aux: None,
                    transfer_aux: TransferAux::default(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientSharedEscrow {
                required,
                available,
            } if required == UNIT && available == UNIT / 2
        ));

        // The abort left everything untouched.
        assert_eq!(engine.ledger().asset_balance(&asset, &seller), 1);
        assert_eq!(
            engine.ledger().balance(&shared, PaymentCurrency::Native),
            UNIT / 2
        );
        let record = engine.pool(&pool).unwrap();
        assert_eq!(record.config.spot_price, UNIT);
        assert_eq!(record.total_buy_fulfillments, 0);
        assert_eq!(
            record.shared_escrow,
            Some(SharedEscrowBinding {
                account: shared,
                remaining_fulfillments: 2,
            })
        );
    }

    #[test]
    fn test_quote_does_not_mutate() {
        let asset = addr(b"asset");
        let mut engine = engine_with_assets(&[(asset, AssetRecord::basic())]);
        let owner = addr(b"owner");
        fund(&mut engine, &owner, POOL_RENT + 10 * UNIT);
        let pool = engine.create_pool(owner, 0, base_config()).unwrap();
        engine
            .deposit_payment(&pool, &owner, &addr(b"cosigner"), 10 * UNIT)
            .unwrap();

        let (quote, settlement) = engine
            .quote_fulfill_buy(&pool, &asset, 2, 0, 0)
            .unwrap();
        assert_eq!(quote.total, 2 * UNIT - UNIT / 10);
        assert_eq!(settlement.seller_receives, quote.total);
        assert_eq!(engine.pool(&pool).unwrap().config.spot_price, UNIT);
    }
}
