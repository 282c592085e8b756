//! The ledger collaborator interface.

use async_trait::async_trait;
use rbac_model::{AssetId, AssetPayload, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;
use crate::health::NodeHealth;
use crate::keys::Keypair;
use crate::transaction::{
    self, CommittedTransaction, PrepareRequest, SignedTransaction, UnsignedTransaction,
};

/// An output held by a public key, as listed by the outputs endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub transaction_id: String,
    pub output_index: u32,
}

/// One hit of an asset text search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMatch {
    /// Id of the CREATE transaction.
    pub id: AssetId,
    /// The asset `data` object, as returned by the node.
    pub data: serde_json::Value,
}

impl AssetMatch {
    /// The hit as a typed asset payload.
    pub fn payload(&self) -> Option<AssetPayload> {
        AssetPayload::from_value(serde_json::json!({ "data": self.data })).ok()
    }
}

/// A CREATE/TRANSFER asset ledger.
///
/// `prepare` and `fulfill` are local steps with default implementations;
/// everything else talks to the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Build an unsigned transaction.
    async fn prepare(&self, request: PrepareRequest) -> LedgerResult<UnsignedTransaction> {
        transaction::prepare(request)
    }

    /// Sign an unsigned transaction.
    async fn fulfill(
        &self,
        unsigned: UnsignedTransaction,
        keypairs: &[&Keypair],
    ) -> LedgerResult<SignedTransaction> {
        transaction::fulfill(unsigned, keypairs)
    }

    /// Submit and wait until the transaction is committed.
    async fn send_commit(&self, signed: SignedTransaction) -> LedgerResult<CommittedTransaction>;

    /// Fetch a committed transaction by id.
    async fn retrieve(&self, id: &str) -> LedgerResult<CommittedTransaction>;

    /// Outputs held by `public_key`; `spent` filters by spend state.
    async fn outputs(&self, public_key: &PublicKey, spent: Option<bool>) -> LedgerResult<Vec<OutputRef>>;

    /// Full-text search over asset data.
    async fn search_assets(&self, text: &str, limit: usize) -> LedgerResult<Vec<AssetMatch>>;

    /// Every transaction of an asset, CREATE first.
    async fn transactions_for_asset(&self, asset_id: &AssetId) -> LedgerResult<Vec<CommittedTransaction>>;

    /// Probe the node.
    async fn health(&self) -> NodeHealth;
}
