// swap-core/src/commitment.rs

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Commitment size in bytes
pub const COMMITMENT_SIZE: usize = 32;

/// A 32-byte SHA-256 commitment to off-chain bytes.
///
/// Pools record commitments to metadata URIs in their allowlists; at
/// fulfillment time the caller supplies the preimage and the matcher
/// recomputes and compares. Also used as the node type for compressed-asset
/// Merkle proofs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment([u8; COMMITMENT_SIZE]);

impl Commitment {
    pub fn new(bytes: [u8; COMMITMENT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Commit to arbitrary bytes
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; COMMITMENT_SIZE] {
        &self.0
    }

    pub fn zero() -> Self {
        Self([0u8; COMMITMENT_SIZE])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> CoreResult<Self> {
        let bytes =
            hex::decode(s).map_err(|e| CoreError::InvalidCommitment(e.to_string()))?;
        if bytes.len() != COMMITMENT_SIZE {
            return Err(CoreError::InvalidCommitment(
                "invalid commitment length".into(),
            ));
        }
        let mut arr = [0u8; COMMITMENT_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Commitment({}...{})",
            hex::encode(&self.0[..4]),
            hex::encode(&self.0[28..])
        )
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Commitment {
    fn default() -> Self {
        Self::zero()
    }
}
