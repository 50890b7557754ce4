// swap-engine/src/ledger.rs

use crate::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use swap_core::{Address, PaymentCurrency};
use std::collections::HashMap;

/// Deposit locked when a pool record is created, refunded on close
pub const POOL_RENT: u64 = 2_100_000;

/// Deposit locked per sell-state record, refunded when it empties
pub const SELL_STATE_RENT: u64 = 900_000;

/// Payment and asset balance book.
///
/// Models the ledger the engine settles against: payment balances keyed by
/// (holder, currency) and asset holdings keyed by (asset, holder). The
/// engine clones the book, applies a fulfillment to the clone, and commits
/// it wholesale, which is what makes every operation all-or-nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    funds: HashMap<(Address, PaymentCurrency), u64>,
    assets: HashMap<(Address, Address), u64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, holder: &Address, currency: PaymentCurrency) -> u64 {
        self.funds.get(&(*holder, currency)).copied().unwrap_or(0)
    }

    pub fn credit(
        &mut self,
        holder: &Address,
        currency: PaymentCurrency,
        amount: u64,
    ) -> EngineResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let entry = self.funds.entry((*holder, currency)).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(EngineError::MathOverflow("balance credit"))?;
        Ok(())
    }

    pub fn debit(
        &mut self,
        holder: &Address,
        currency: PaymentCurrency,
        amount: u64,
    ) -> EngineResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance(holder, currency);
        if available < amount {
            return Err(EngineError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        if available == amount {
            self.funds.remove(&(*holder, currency));
        } else {
            self.funds.insert((*holder, currency), available - amount);
        }
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        currency: PaymentCurrency,
        amount: u64,
    ) -> EngineResult<()> {
        self.debit(from, currency, amount)?;
        self.credit(to, currency, amount)
    }

    pub fn asset_balance(&self, asset: &Address, holder: &Address) -> u64 {
        self.assets.get(&(*asset, *holder)).copied().unwrap_or(0)
    }

    pub fn asset_credit(
        &mut self,
        asset: &Address,
        holder: &Address,
        amount: u64,
    ) -> EngineResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let entry = self.assets.entry((*asset, *holder)).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(EngineError::MathOverflow("asset credit"))?;
        Ok(())
    }

    pub fn asset_debit(
        &mut self,
        asset: &Address,
        holder: &Address,
        amount: u64,
    ) -> EngineResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.asset_balance(asset, holder);
        if available < amount {
            return Err(EngineError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        if available == amount {
            self.assets.remove(&(*asset, *holder));
        } else {
            self.assets.insert((*asset, *holder), available - amount);
        }
        Ok(())
    }

    pub fn asset_transfer(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> EngineResult<()> {
        self.asset_debit(asset, from, amount)?;
        self.asset_credit(asset, to, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(seed: &[u8]) -> Address {
        Address::from_seed(seed)
    }

    #[test]
    fn test_credit_debit_round_trip() {
        let mut ledger = Ledger::new();
        let a = holder(b"a");

        ledger.credit(&a, PaymentCurrency::Native, 500).unwrap();
        assert_eq!(ledger.balance(&a, PaymentCurrency::Native), 500);

        ledger.debit(&a, PaymentCurrency::Native, 500).unwrap();
        assert_eq!(ledger.balance(&a, PaymentCurrency::Native), 0);
    }

    #[test]
    fn test_overdraft_rejected() {
        let mut ledger = Ledger::new();
        let a = holder(b"a");

        ledger.credit(&a, PaymentCurrency::Native, 100).unwrap();
        let err = ledger.debit(&a, PaymentCurrency::Native, 101).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientBalance {
                required: 101,
                available: 100
            }
        ));
        // Balance untouched after the failed debit
        assert_eq!(ledger.balance(&a, PaymentCurrency::Native), 100);
    }

    #[test]
    fn test_currencies_are_isolated() {
        let mut ledger = Ledger::new();
        let a = holder(b"a");
        let token = PaymentCurrency::Token(holder(b"mint"));

        ledger.credit(&a, PaymentCurrency::Native, 10).unwrap();
        ledger.credit(&a, token, 20).unwrap();

        assert_eq!(ledger.balance(&a, PaymentCurrency::Native), 10);
        assert_eq!(ledger.balance(&a, token), 20);
        assert!(ledger.debit(&a, token, 15).is_ok());
        assert_eq!(ledger.balance(&a, PaymentCurrency::Native), 10);
    }

    #[test]
    fn test_asset_transfer() {
        let mut ledger = Ledger::new();
        let (asset, from, to) = (holder(b"asset"), holder(b"from"), holder(b"to"));

        ledger.asset_credit(&asset, &from, 3).unwrap();
        ledger.asset_transfer(&asset, &from, &to, 2).unwrap();

        assert_eq!(ledger.asset_balance(&asset, &from), 1);
        assert_eq!(ledger.asset_balance(&asset, &to), 2);
        assert!(ledger.asset_transfer(&asset, &from, &to, 2).is_err());
    }

    #[test]
    fn test_credit_overflow() {
        let mut ledger = Ledger::new();
        let a = holder(b"a");

        ledger.credit(&a, PaymentCurrency::Native, u64::MAX).unwrap();
        assert!(matches!(
            ledger.credit(&a, PaymentCurrency::Native, 1),
            Err(EngineError::MathOverflow(_))
        ));
    }
}
