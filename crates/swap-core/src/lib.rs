// swap-core/src/lib.rs

//! Foundation types for the swap pool engine.
//!
//! This crate carries everything the economic core needs that is not
//! economics: 32-byte addresses, deterministic record addressing (so the
//! record for a given (owner, uuid) or (pool, asset) pair is always
//! computable without a lookup table), off-chain metadata commitments, and
//! Merkle inclusion proofs for compressed assets.

pub mod address;
pub mod commitment;
pub mod merkle;
pub mod types;

pub use address::{
    buyside_escrow_address, pool_address, sell_state_address, shared_escrow_address, Address,
};
pub use commitment::Commitment;
pub use merkle::{hash_leaf, verify_inclusion, MerkleTree};
pub use types::{PaymentCurrency, PoolUuid, Timestamp, BPS_DENOM, MAX_ALLOWLIST_ENTRIES};

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core primitives
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid address encoding: {0}")]
    InvalidAddress(String),

    #[error("invalid commitment encoding: {0}")]
    InvalidCommitment(String),

    #[error("merkle error: {0}")]
    MerkleError(String),
}
