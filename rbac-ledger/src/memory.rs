//! In-process ledger.
//!
//! Validates transactions the way a node would for this model: ids and
//! signatures, unknown or spent inputs, and the `can_link` rule for CREATEs
//! that name a parent. Faults can be injected to exercise error paths:
//!
//! ```
//! use rbac_ledger::MemoryLedger;
//! use std::time::Duration;
//!
//! let ledger = MemoryLedger::new();
//! ledger.set_unavailable(true);
//! ledger.set_delay(Duration::from_millis(50));
//! ledger.fail_next_transfers(1);
//! ```

use async_trait::async_trait;
use rbac_model::{AssetId, Hierarchy, HierarchyNode, LinkDecision, PublicKey};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::{AssetMatch, LedgerClient, OutputRef};
use crate::error::{LedgerError, LedgerResult, RejectionReason};
use crate::health::NodeHealth;
use crate::transaction::{self, CommittedTransaction, Fulfills, Operation, SignedTransaction, Transaction, TxAsset};

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<String, CommittedTransaction>,
    /// Commit order.
    order: Vec<String>,
    /// Spent output -> id of the spending transaction.
    spent: HashMap<Fulfills, String>,
    hierarchy: Hierarchy,
}

/// An in-memory ledger.
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    unavailable: AtomicBool,
    delay_ms: AtomicU64,
    failing_transfers: AtomicUsize,
    commits: AtomicUsize,
}

fn rejected(reason: RejectionReason, message: impl Into<String>) -> LedgerError {
    LedgerError::Rejected {
        reason,
        message: message.into(),
    }
}

/// Whether any string value under `value` contains `needle` (lowercase).
fn mentions(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| mentions(v, needle)),
        Value::Object(map) => map.values().any(|v| mentions(v, needle)),
        _ => false,
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a connectivity error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail the next `n` TRANSFER commits with a connectivity error.
    pub fn fail_next_transfers(&self, n: usize) {
        self.failing_transfers.store(n, Ordering::SeqCst);
    }

    /// Number of committed transactions.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// A copy of the link graph built from committed CREATEs.
    pub async fn hierarchy(&self) -> Hierarchy {
        self.state.read().await.hierarchy.clone()
    }

    async fn guard(&self) -> LedgerResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Connectivity("ledger unavailable".to_string()));
        }
        Ok(())
    }

    fn take_transfer_failure(&self) -> bool {
        self.failing_transfers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_create(state: &LedgerState, tx: &Transaction) -> LedgerResult<()> {
        let payload = match &tx.asset {
            TxAsset::Data(payload) => payload,
            TxAsset::Link { .. } => {
                return Err(rejected(
                    RejectionReason::InvalidTransaction,
                    "CREATE must carry asset data",
                ))
            }
        };
        if tx.inputs.iter().any(|i| i.fulfills.is_some()) {
            return Err(rejected(
                RejectionReason::InvalidTransaction,
                "CREATE inputs must not spend outputs",
            ));
        }

        let Some(link) = payload.data().link() else {
            return Ok(());
        };
        for signer in tx.inputs.iter().flat_map(|i| i.owners_before.iter()) {
            match state.hierarchy.check_link(link, signer) {
                LinkDecision::Denied => {
                    return Err(rejected(
                        RejectionReason::Unauthorized,
                        format!("Signer {} is not authorized by can_link of {}", signer, link),
                    ))
                }
                LinkDecision::Dangling => {
                    warn!(link = %link, "CREATE links to an unknown asset; accepting as orphan")
                }
                LinkDecision::Allowed | LinkDecision::Unrestricted => {}
            }
        }
        Ok(())
    }

    fn check_transfer(state: &LedgerState, tx: &Transaction) -> LedgerResult<()> {
        let asset_id = match &tx.asset {
            TxAsset::Link { id } => id,
            TxAsset::Data(_) => {
                return Err(rejected(
                    RejectionReason::InvalidTransaction,
                    "TRANSFER must reference an asset id",
                ))
            }
        };

        for input in &tx.inputs {
            let fulfills = input.fulfills.as_ref().ok_or_else(|| {
                rejected(RejectionReason::InvalidTransaction, "TRANSFER input spends nothing")
            })?;
            let not_found = || {
                rejected(
                    RejectionReason::InputNotFound,
                    format!(
                        "InputDoesNotExist: output {} of {} doesn't exist",
                        fulfills.output_index, fulfills.transaction_id
                    ),
                )
            };
            let source = state
                .transactions
                .get(&fulfills.transaction_id)
                .ok_or_else(not_found)?;
            let output = source
                .outputs()
                .get(fulfills.output_index as usize)
                .ok_or_else(not_found)?;

            if let Some(spender) = state.spent.get(fulfills) {
                return Err(rejected(
                    RejectionReason::DoubleSpend,
                    format!("DoubleSpend: output already spent by {}", spender),
                ));
            }
            if &source.asset_id() != asset_id {
                return Err(rejected(
                    RejectionReason::InvalidTransaction,
                    format!("Input belongs to asset {}, not {}", source.asset_id(), asset_id),
                ));
            }

            let mut expected: Vec<&PublicKey> = output.public_keys.iter().collect();
            let mut given: Vec<&PublicKey> = input.owners_before.iter().collect();
            expected.sort();
            given.sort();
            if expected != given {
                return Err(rejected(
                    RejectionReason::InvalidTransaction,
                    "owners_before do not match the spent output",
                ));
            }
        }
        Ok(())
    }

    fn apply(state: &mut LedgerState, committed: &CommittedTransaction) {
        let owners = committed
            .outputs()
            .first()
            .map(|o| o.public_keys.clone())
            .unwrap_or_default();

        match committed.operation() {
            Operation::Create => {
                if let Some(payload) = committed.asset_payload() {
                    state.hierarchy.insert(HierarchyNode::from_payload(
                        committed.asset_id(),
                        payload,
                        committed.metadata(),
                        owners,
                    ));
                }
            }
            Operation::Transfer => {
                for fulfills in committed.inputs().iter().filter_map(|i| i.fulfills.clone()) {
                    state.spent.insert(fulfills, committed.id().to_string());
                }
                state.hierarchy.set_owners(&committed.asset_id(), owners);
            }
        }

        state.order.push(committed.id().to_string());
        state
            .transactions
            .insert(committed.id().to_string(), committed.clone());
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn send_commit(&self, signed: SignedTransaction) -> LedgerResult<CommittedTransaction> {
        self.guard().await?;

        let operation = signed.transaction().operation;
        if operation == Operation::Transfer && self.take_transfer_failure() {
            return Err(LedgerError::Connectivity("injected transfer failure".to_string()));
        }

        transaction::verify(signed.transaction())?;

        let mut state = self.state.write().await;
        if state.transactions.contains_key(signed.id()) {
            return Err(rejected(
                RejectionReason::Duplicate,
                format!("Transaction {} already exists", signed.id()),
            ));
        }
        match operation {
            Operation::Create => Self::check_create(&state, signed.transaction())?,
            Operation::Transfer => Self::check_transfer(&state, signed.transaction())?,
        }

        let committed = signed.into_committed();
        Self::apply(&mut state, &committed);
        self.commits.fetch_add(1, Ordering::SeqCst);

        info!(tx_id = %committed.id(), %operation, "Committed transaction");
        Ok(committed)
    }

    async fn retrieve(&self, id: &str) -> LedgerResult<CommittedTransaction> {
        self.guard().await?;
        self.state
            .read()
            .await
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    async fn outputs(&self, public_key: &PublicKey, spent: Option<bool>) -> LedgerResult<Vec<OutputRef>> {
        self.guard().await?;
        let state = self.state.read().await;

        let mut refs = Vec::new();
        for id in &state.order {
            let Some(tx) = state.transactions.get(id) else {
                continue;
            };
            for (index, output) in tx.outputs().iter().enumerate() {
                if !output.public_keys.contains(public_key) {
                    continue;
                }
                let fulfills = Fulfills {
                    output_index: index as u32,
                    transaction_id: id.clone(),
                };
                let is_spent = state.spent.contains_key(&fulfills);
                if spent.map_or(true, |want| want == is_spent) {
                    refs.push(OutputRef {
                        transaction_id: fulfills.transaction_id,
                        output_index: fulfills.output_index,
                    });
                }
            }
        }
        debug!(count = refs.len(), "Listed outputs");
        Ok(refs)
    }

    async fn search_assets(&self, text: &str, limit: usize) -> LedgerResult<Vec<AssetMatch>> {
        self.guard().await?;
        let needle = text.to_lowercase();
        let state = self.state.read().await;

        let matches = state
            .order
            .iter()
            .filter_map(|id| state.transactions.get(id))
            .filter_map(|tx| {
                let data = serde_json::to_value(tx.asset_payload()?.data()).ok()?;
                mentions(&data, &needle).then(|| AssetMatch {
                    id: tx.asset_id(),
                    data,
                })
            })
            .take(limit)
            .collect();
        Ok(matches)
    }

    async fn transactions_for_asset(&self, asset_id: &AssetId) -> LedgerResult<Vec<CommittedTransaction>> {
        self.guard().await?;
        let state = self.state.read().await;

        let txs: Vec<CommittedTransaction> = state
            .order
            .iter()
            .filter_map(|id| state.transactions.get(id))
            .filter(|tx| &tx.asset_id() == asset_id)
            .cloned()
            .collect();
        if txs.is_empty() {
            return Err(LedgerError::NotFound(asset_id.to_string()));
        }
        Ok(txs)
    }

    async fn health(&self) -> NodeHealth {
        match self.guard().await {
            Ok(()) => NodeHealth::reachable(self.delay_ms.load(Ordering::SeqCst), Some("memory".to_string())),
            Err(e) => NodeHealth::unreachable(self.delay_ms.load(Ordering::SeqCst), e.to_string()),
        }
    }
}
