// swap-core/src/address.rs

use crate::types::PoolUuid;
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Address size in bytes
pub const ADDRESS_SIZE: usize = 32;

/// A 32-byte account or asset identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Create an address from raw bytes
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Derive an address by hashing arbitrary seed bytes
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; ADDRESS_SIZE] {
        self.0
    }

    /// The all-zero address (used as an "unset" sentinel)
    pub fn zero() -> Self {
        Self([0u8; ADDRESS_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> CoreResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(s).map_err(|e| CoreError::InvalidAddress(e.to_string()))?;
        if bytes.len() != ADDRESS_SIZE {
            return Err(CoreError::InvalidAddress("invalid address length".into()));
        }
        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Address({}...{})",
            hex::encode(&self.0[..4]),
            hex::encode(&self.0[28..])
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

// Record-addressing domain tags. Distinct tags keep the derivation spaces
// for the four record kinds disjoint even on identical inputs.
const POOL_TAG: &[u8] = b"swap:pool";
const SELL_STATE_TAG: &[u8] = b"swap:sell_state";
const BUYSIDE_ESCROW_TAG: &[u8] = b"swap:buyside_escrow";
const SHARED_ESCROW_TAG: &[u8] = b"swap:shared_escrow";

fn derive(tag: &[u8], engine_id: &Address, parts: &[&[u8]]) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(engine_id.as_bytes());
    for part in parts {
        hasher.update(part);
    }
    Address(hasher.finalize().into())
}

/// Deterministic address of the pool record for (engine, owner, uuid)
pub fn pool_address(engine_id: &Address, owner: &Address, uuid: PoolUuid) -> Address {
    derive(
        POOL_TAG,
        engine_id,
        &[owner.as_bytes(), &uuid.to_le_bytes()],
    )
}

/// Deterministic address of the per-asset inventory record for (engine, pool, asset)
pub fn sell_state_address(engine_id: &Address, pool: &Address, asset: &Address) -> Address {
    derive(
        SELL_STATE_TAG,
        engine_id,
        &[pool.as_bytes(), asset.as_bytes()],
    )
}

/// Deterministic address of a pool's own buy-side payment escrow
pub fn buyside_escrow_address(engine_id: &Address, pool: &Address) -> Address {
    derive(BUYSIDE_ESCROW_TAG, engine_id, &[pool.as_bytes()])
}

/// Deterministic address of an owner's shared payment escrow
pub fn shared_escrow_address(engine_id: &Address, owner: &Address) -> Address {
    derive(SHARED_ESCROW_TAG, engine_id, &[owner.as_bytes()])
}
