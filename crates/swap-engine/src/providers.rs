// swap-engine/src/providers.rs

//! Capability interfaces for the engine's external collaborators: asset
//! metadata, standard-specific transfer mechanics, transfer-hook account
//! resolution, compressed-asset proof verification, and the clock. Any
//! failure surfaced by a collaborator aborts the operation that consulted
//! it.

use crate::allowlist::CollectionInfo;
use crate::ledger::Ledger;
use crate::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use swap_core::{merkle, Address, Commitment, Timestamp};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time for expiry checks
pub trait Clock {
    fn unix_now(&self) -> Timestamp;
}

/// Wall-clock time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests and replay
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn unix_now(&self) -> Timestamp {
        self.0
    }
}

/// Token standard discriminant. The engine never branches on this except
/// to pick the transfer provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStandard {
    Vanilla,
    Extension,
    Compressed,
    Programmable,
    PolicyWrapped,
}

/// One royalty recipient recorded in the asset's metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub address: Address,
    /// Share of the royalty pot, relative to the other creators
    pub share_bp: u16,
    pub verified: bool,
}

/// Read side of the asset metadata/ownership system
pub trait AssetMetadataProvider {
    fn creators(&self, asset: &Address) -> EngineResult<Vec<Creator>>;
    fn token_standard(&self, asset: &Address) -> EngineResult<TokenStandard>;
    /// Royalty rate from the asset's royalty ruleset
    fn royalty_bp(&self, asset: &Address) -> EngineResult<u16>;
    fn collection(&self, asset: &Address) -> EngineResult<Option<CollectionInfo>>;
    fn group(&self, asset: &Address) -> EngineResult<Option<Address>>;
    fn update_authority(&self, asset: &Address) -> EngineResult<Option<Address>>;
}

/// Resolves the extra accounts an extension-bearing asset's transfer hook
/// requires
pub trait TransferHookResolver {
    fn required_accounts(&self, asset: &Address) -> EngineResult<Vec<Address>>;
}

/// Hook resolver backed by a fixed table; assets without an entry need no
/// extra accounts
#[derive(Debug, Default)]
pub struct StaticHookResolver {
    accounts: HashMap<Address, Vec<Address>>,
}

impl StaticHookResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, asset: Address, accounts: Vec<Address>) {
        self.accounts.insert(asset, accounts);
    }
}

impl TransferHookResolver for StaticHookResolver {
    fn required_accounts(&self, asset: &Address) -> EngineResult<Vec<Address>> {
        Ok(self.accounts.get(asset).cloned().unwrap_or_default())
    }
}

/// Verifies compressed-asset inclusion proofs
pub trait ProofVerifier {
    fn verify(
        &self,
        root: &Commitment,
        leaf: &Commitment,
        proof: &[Commitment],
        index: u64,
    ) -> bool;
}

/// SHA-256 Merkle verifier
#[derive(Debug, Default)]
pub struct Sha256ProofVerifier;

impl ProofVerifier for Sha256ProofVerifier {
    fn verify(
        &self,
        root: &Commitment,
        leaf: &Commitment,
        proof: &[Commitment],
        index: u64,
    ) -> bool {
        merkle::verify_inclusion(root, leaf, proof, index)
    }
}

/// Inclusion proof accompanying a compressed-asset transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub root: Commitment,
    pub leaf: Commitment,
    pub proof: Vec<Commitment>,
    pub index: u64,
}

/// Caller-supplied auxiliary material for an asset transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAux {
    /// Required for compressed assets
    pub inclusion_proof: Option<InclusionProof>,
}

/// One custody movement requested by the engine
#[derive(Debug, Clone)]
pub struct TransferRequest<'a> {
    pub asset: Address,
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub aux: &'a TransferAux,
}

/// Standard-specific transfer mechanics. Implementations move holdings on
/// the ledger the engine hands them; the escrow/inventory accounting around
/// the move is standard-agnostic.
pub trait AssetTransferProvider {
    fn standard(&self) -> TokenStandard;
    fn transfer(&self, book: &mut Ledger, request: &TransferRequest<'_>) -> EngineResult<()>;
}

/// Plain transfer, no extra mechanics
#[derive(Debug, Default)]
pub struct VanillaTransfer;

impl AssetTransferProvider for VanillaTransfer {
    fn standard(&self) -> TokenStandard {
        TokenStandard::Vanilla
    }

    fn transfer(&self, book: &mut Ledger, request: &TransferRequest<'_>) -> EngineResult<()> {
        book.asset_transfer(&request.asset, &request.from, &request.to, request.amount)
    }
}

/// Extension-bearing transfer: the hook's account list must resolve before
/// custody moves
pub struct ExtensionTransfer {
    resolver: Box<dyn TransferHookResolver>,
}

impl ExtensionTransfer {
    pub fn new(resolver: Box<dyn TransferHookResolver>) -> Self {
        Self { resolver }
    }
}

impl AssetTransferProvider for ExtensionTransfer {
    fn standard(&self) -> TokenStandard {
        TokenStandard::Extension
    }

    fn transfer(&self, book: &mut Ledger, request: &TransferRequest<'_>) -> EngineResult<()> {
        let accounts = self.resolver.required_accounts(&request.asset)?;
        tracing::debug!(
            asset = %request.asset,
            hook_accounts = accounts.len(),
            "resolved transfer hook accounts"
        );
        book.asset_transfer(&request.asset, &request.from, &request.to, request.amount)
    }
}

/// Compressed transfer: custody only moves under a valid inclusion proof
pub struct CompressedTransfer {
    verifier: Box<dyn ProofVerifier>,
}

impl CompressedTransfer {
    pub fn new(verifier: Box<dyn ProofVerifier>) -> Self {
        Self { verifier }
    }
}

impl AssetTransferProvider for CompressedTransfer {
    fn standard(&self) -> TokenStandard {
        TokenStandard::Compressed
    }

    fn transfer(&self, book: &mut Ledger, request: &TransferRequest<'_>) -> EngineResult<()> {
        let proof = request.aux.inclusion_proof.as_ref().ok_or_else(|| {
            EngineError::ProviderFailure("compressed transfer requires an inclusion proof".into())
        })?;
        if !self
            .verifier
            .verify(&proof.root, &proof.leaf, &proof.proof, proof.index)
        {
            return Err(EngineError::ProviderFailure(
                "compressed-asset inclusion proof rejected".into(),
            ));
        }
        book.asset_transfer(&request.asset, &request.from, &request.to, request.amount)
    }
}

/// Programmable / policy-wrapped transfer. Rule evaluation lives with the
/// external policy engine; this in-memory variant approves engine-mediated
/// moves unconditionally.
#[derive(Debug)]
pub struct RuleGatedTransfer {
    standard: TokenStandard,
}

impl RuleGatedTransfer {
    pub fn new(standard: TokenStandard) -> Self {
        Self { standard }
    }
}

impl AssetTransferProvider for RuleGatedTransfer {
    fn standard(&self) -> TokenStandard {
        self.standard
    }

    fn transfer(&self, book: &mut Ledger, request: &TransferRequest<'_>) -> EngineResult<()> {
        book.asset_transfer(&request.asset, &request.from, &request.to, request.amount)
    }
}

/// Selects the transfer provider for an asset's standard
pub struct TransferRegistry {
    providers: HashMap<TokenStandard, Box<dyn AssetTransferProvider>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// All five standards wired to their default in-memory mechanics
    pub fn with_defaults(
        resolver: Box<dyn TransferHookResolver>,
        verifier: Box<dyn ProofVerifier>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(VanillaTransfer));
        registry.register(Box::new(ExtensionTransfer::new(resolver)));
        registry.register(Box::new(CompressedTransfer::new(verifier)));
        registry.register(Box::new(RuleGatedTransfer::new(TokenStandard::Programmable)));
        registry.register(Box::new(RuleGatedTransfer::new(TokenStandard::PolicyWrapped)));
        registry
    }

    pub fn register(&mut self, provider: Box<dyn AssetTransferProvider>) {
        self.providers.insert(provider.standard(), provider);
    }

    pub fn provider_for(
        &self,
        standard: TokenStandard,
    ) -> EngineResult<&dyn AssetTransferProvider> {
        self.providers
            .get(&standard)
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                EngineError::ProviderFailure(format!(
                    "no transfer provider registered for {standard:?}"
                ))
            })
    }
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::with_defaults(
            Box::new(StaticHookResolver::new()),
            Box::new(Sha256ProofVerifier),
        )
    }
}

/// Metadata record for one asset in the in-memory provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub creators: Vec<Creator>,
    pub token_standard: TokenStandard,
    pub royalty_bp: u16,
    pub collection: Option<CollectionInfo>,
    pub group: Option<Address>,
    pub update_authority: Option<Address>,
}

impl AssetRecord {
    /// Vanilla asset with no royalties or memberships
    pub fn basic() -> Self {
        Self {
            creators: Vec::new(),
            token_standard: TokenStandard::Vanilla,
            royalty_bp: 0,
            collection: None,
            group: None,
            update_authority: None,
        }
    }
}

/// Metadata provider backed by a plain table
#[derive(Debug, Default)]
pub struct InMemoryMetadata {
    records: HashMap<Address, AssetRecord>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: Address, record: AssetRecord) {
        self.records.insert(asset, record);
    }

    fn record(&self, asset: &Address) -> EngineResult<&AssetRecord> {
        self.records
            .get(asset)
            .ok_or_else(|| EngineError::ProviderFailure(format!("unknown asset {asset}")))
    }
}

impl AssetMetadataProvider for InMemoryMetadata {
    fn creators(&self, asset: &Address) -> EngineResult<Vec<Creator>> {
        Ok(self.record(asset)?.creators.clone())
    }

    fn token_standard(&self, asset: &Address) -> EngineResult<TokenStandard> {
        Ok(self.record(asset)?.token_standard)
    }

    fn royalty_bp(&self, asset: &Address) -> EngineResult<u16> {
        Ok(self.record(asset)?.royalty_bp)
    }

    fn collection(&self, asset: &Address) -> EngineResult<Option<CollectionInfo>> {
        Ok(self.record(asset)?.collection)
    }

    fn group(&self, asset: &Address) -> EngineResult<Option<Address>> {
        Ok(self.record(asset)?.group)
    }

    fn update_authority(&self, asset: &Address) -> EngineResult<Option<Address>> {
        Ok(self.record(asset)?.update_authority)
    }
}
