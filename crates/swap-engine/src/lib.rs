// swap-engine/src/lib.rs

//! Liquidity-pool engine for trading non-fungible and semi-fungible assets
//! against a single payment currency.
//!
//! A pool quotes along a deterministic bonding curve (linear or
//! exponential), splits every trade among seller/buyer, pool owner,
//! referral, and creator-royalty recipients, and keeps its buy-side payment
//! escrow and sell-side asset inventory consistent under atomic,
//! all-or-nothing operations:
//! - create / update / close pool
//! - deposit / withdraw payment
//! - deposit / withdraw asset
//! - fulfill-buy (pool buys from a seller) / fulfill-sell (pool sells to a buyer)
//! - set-shared-escrow
//!
//! All state lives in an explicit keyed store owned by [`PoolEngine`]; asset
//! metadata, transfer mechanics, and proof verification are external
//! collaborators reached through the capability traits in [`providers`].

pub mod allowlist;
pub mod curve;
pub mod engine;
pub mod fees;
pub mod ledger;
pub mod providers;
pub mod state;

pub use allowlist::{AllowlistEntry, AssetFacts, CollectionInfo};
pub use curve::{price_fulfillment, PriceQuote, TradeSide};
pub use engine::{FulfillBuyArgs, FulfillSellArgs, PoolEngine};
pub use fees::{BuysideSettlement, SellsideSettlement};
pub use ledger::{Ledger, POOL_RENT, SELL_STATE_RENT};
pub use providers::{
    AssetMetadataProvider, AssetRecord, AssetTransferProvider, Clock, Creator, FixedClock,
    InMemoryMetadata, InclusionProof, ProofVerifier, Sha256ProofVerifier, StaticHookResolver,
    SystemClock, TokenStandard, TransferAux, TransferHookResolver, TransferRegistry,
    TransferRequest,
};
pub use state::{CurveKind, Pool, PoolConfig, PoolStore, SellState, SharedEscrowBinding};

use swap_core::Address;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in pool operations.
///
/// Grouped into validation, authorization, economic, and eligibility
/// failures. Every error is terminal for the attempt; no operation leaves
/// partial effects behind.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // --- validation ---
    #[error("invalid fee configuration: {0}")]
    InvalidFee(String),

    #[error("invalid curve configuration: {0}")]
    InvalidCurve(String),

    #[error("invalid allowlist: {0}")]
    InvalidAllowlist(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    // --- authorization ---
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    // --- economic ---
    #[error("slippage bound violated: bound {bound}, actual {actual}")]
    SlippageExceeded { bound: u64, actual: u64 },

    #[error("arithmetic overflow in {0}")]
    MathOverflow(&'static str),

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("insufficient shared escrow: required {required}, available {available}")]
    InsufficientSharedEscrow { required: u64, available: u64 },

    #[error("shared escrow fulfillment cap exhausted")]
    SharedEscrowExhausted,

    #[error("insufficient sell inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: u64, available: u64 },

    #[error("pool still holds inventory or escrow funds")]
    PoolNotEmpty,

    // --- eligibility ---
    #[error("asset not eligible for this pool")]
    NotEligible,

    #[error("pool expired at {expiry}, now {now}")]
    PoolExpired { expiry: u64, now: u64 },

    // --- lookups and collaborators ---
    #[error("pool not found: {0}")]
    PoolNotFound(Address),

    #[error("sell state not found for asset {0}")]
    SellStateNotFound(Address),

    #[error("collaborator failure: {0}")]
    ProviderFailure(String),
}
