// swap-engine/src/allowlist.rs

use crate::providers::Creator;
use crate::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use swap_core::{Address, Commitment, MAX_ALLOWLIST_ENTRIES};

/// One slot of a pool's eligibility policy.
///
/// A pool carries up to six slots; an asset is eligible if it satisfies any
/// non-empty slot. `Any` short-circuits the whole list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowlistEntry {
    Empty,
    /// First verified creator of the asset
    FirstVerifiedCreator(Address),
    /// Exact mint / asset identity
    AssetId(Address),
    /// Verified collection membership
    VerifiedCollection(Address),
    /// Commitment to the asset's off-chain metadata URI
    MetadataCommitment(Commitment),
    /// Token-group identity
    TokenGroup(Address),
    /// Collection update authority
    CollectionUpdateAuthority(Address),
    /// Wildcard: every asset is eligible
    Any,
}

impl AllowlistEntry {
    pub fn is_empty(&self) -> bool {
        matches!(self, AllowlistEntry::Empty)
    }
}

/// Verified collection reference from the asset's metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub address: Address,
    pub verified: bool,
}

/// Trusted metadata snapshot for one asset, assembled from the metadata
/// provider. The matcher does not re-validate any of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFacts {
    pub asset: Address,
    pub creators: Vec<Creator>,
    pub collection: Option<CollectionInfo>,
    pub group: Option<Address>,
    pub update_authority: Option<Address>,
}

/// Validate the shape of an allowlist at pool create/update time
pub fn validate_allowlist(entries: &[AllowlistEntry]) -> EngineResult<()> {
    if entries.len() > MAX_ALLOWLIST_ENTRIES {
        return Err(EngineError::InvalidAllowlist(format!(
            "{} entries exceeds the {} slot limit",
            entries.len(),
            MAX_ALLOWLIST_ENTRIES
        )));
    }
    if entries.iter().all(AllowlistEntry::is_empty) {
        return Err(EngineError::InvalidAllowlist(
            "at least one non-empty entry is required".into(),
        ));
    }
    Ok(())
}

/// Pure eligibility predicate: OR across all slots.
///
/// `aux_uri` is the caller-supplied preimage for the metadata-commitment
/// kind; a missing or mismatching preimage is a deterministic rejection of
/// that slot, not an error.
pub fn eligible(facts: &AssetFacts, entries: &[AllowlistEntry], aux_uri: Option<&str>) -> bool {
    entries.iter().any(|entry| matches(facts, entry, aux_uri))
}

fn matches(facts: &AssetFacts, entry: &AllowlistEntry, aux_uri: Option<&str>) -> bool {
    match entry {
        AllowlistEntry::Empty => false,
        AllowlistEntry::Any => true,
        AllowlistEntry::AssetId(address) => facts.asset == *address,
        AllowlistEntry::FirstVerifiedCreator(address) => facts
            .creators
            .iter()
            .find(|c| c.verified)
            .map(|c| c.address == *address)
            .unwrap_or(false),
        AllowlistEntry::VerifiedCollection(address) => facts
            .collection
            .map(|c| c.verified && c.address == *address)
            .unwrap_or(false),
        AllowlistEntry::MetadataCommitment(commitment) => aux_uri
            .map(|uri| Commitment::of(uri.as_bytes()) == *commitment)
            .unwrap_or(false),
        AllowlistEntry::TokenGroup(address) => facts.group == Some(*address),
        AllowlistEntry::CollectionUpdateAuthority(address) => {
            facts.update_authority == Some(*address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> AssetFacts {
        AssetFacts {
            asset: Address::from_seed(b"asset"),
            creators: vec![
                Creator {
                    address: Address::from_seed(b"unverified"),
                    share_bp: 5000,
                    verified: false,
                },
                Creator {
                    address: Address::from_seed(b"creator"),
                    share_bp: 5000,
                    verified: true,
                },
            ],
            collection: Some(CollectionInfo {
                address: Address::from_seed(b"collection"),
                verified: true,
            }),
            group: Some(Address::from_seed(b"group")),
            update_authority: Some(Address::from_seed(b"authority")),
        }
    }

    #[test]
    fn test_any_slot_accepts_everything() {
        let entries = vec![
            AllowlistEntry::AssetId(Address::from_seed(b"someone-else")),
            AllowlistEntry::Any,
        ];
        assert!(eligible(&facts(), &entries, None));
    }

    #[test]
    fn test_or_semantics_one_match_suffices() {
        let entries = vec![
            AllowlistEntry::Empty,
            AllowlistEntry::AssetId(Address::from_seed(b"other")),
            AllowlistEntry::TokenGroup(Address::from_seed(b"group")),
        ];
        assert!(eligible(&facts(), &entries, None));
    }

    #[test]
    fn test_six_populated_slots_no_match_rejected() {
        let miss = Address::from_seed(b"miss");
        let entries = vec![
            AllowlistEntry::FirstVerifiedCreator(miss),
            AllowlistEntry::AssetId(miss),
            AllowlistEntry::VerifiedCollection(miss),
            AllowlistEntry::MetadataCommitment(Commitment::of(b"other uri")),
            AllowlistEntry::TokenGroup(miss),
            AllowlistEntry::CollectionUpdateAuthority(miss),
        ];
        assert!(!eligible(&facts(), &entries, Some("uri")));
    }

    #[test]
    fn test_first_verified_creator_skips_unverified() {
        // The first *verified* creator is second in the list.
        let entries = vec![AllowlistEntry::FirstVerifiedCreator(Address::from_seed(
            b"creator",
        ))];
        assert!(eligible(&facts(), &entries, None));

        let entries = vec![AllowlistEntry::FirstVerifiedCreator(Address::from_seed(
            b"unverified",
        ))];
        assert!(!eligible(&facts(), &entries, None));
    }

    #[test]
    fn test_unverified_collection_rejected() {
        let mut f = facts();
        f.collection = Some(CollectionInfo {
            address: Address::from_seed(b"collection"),
            verified: false,
        });
        let entries = vec![AllowlistEntry::VerifiedCollection(Address::from_seed(
            b"collection",
        ))];
        assert!(!eligible(&f, &entries, None));
    }

    #[test]
    fn test_metadata_commitment_needs_matching_preimage() {
        let uri = "https://example.test/1.json";
        let entries = vec![AllowlistEntry::MetadataCommitment(Commitment::of(
            uri.as_bytes(),
        ))];

        assert!(eligible(&facts(), &entries, Some(uri)));
        assert!(!eligible(&facts(), &entries, Some("https://example.test/2.json")));
        assert!(!eligible(&facts(), &entries, None));
    }

    #[test]
    fn test_validate_allowlist_shape() {
        assert!(validate_allowlist(&[AllowlistEntry::Any]).is_ok());
        assert!(validate_allowlist(&[AllowlistEntry::Empty; 6]).is_err());
        assert!(validate_allowlist(&[AllowlistEntry::Any; 7]).is_err());
    }
}
