// swap-core/src/types.rs

use crate::address::Address;
use serde::{Deserialize, Serialize};

/// Unix epoch seconds
pub type Timestamp = u64;

/// Disambiguates multiple pools belonging to the same owner
pub type PoolUuid = u64;

/// Basis point denominator (100% = 10000 bp)
pub const BPS_DENOM: u64 = 10_000;

/// Maximum number of allowlist slots on a pool
pub const MAX_ALLOWLIST_ENTRIES: usize = 6;

/// The currency a pool quotes and settles in.
///
/// `Native` is the ledger's base currency sentinel; `Token` identifies a
/// specific fungible token by its asset identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentCurrency {
    Native,
    Token(Address),
}

impl PaymentCurrency {
    pub fn is_native(&self) -> bool {
        matches!(self, PaymentCurrency::Native)
    }
}

impl Default for PaymentCurrency {
    fn default() -> Self {
        PaymentCurrency::Native
    }
}
