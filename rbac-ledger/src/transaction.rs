//! # Transactions
//!
//! The CREATE/TRANSFER transaction model and its local build/sign/verify steps.
//!
//! ```text
//! prepare(request) -> UnsignedTransaction
//! fulfill(unsigned, keypairs) -> SignedTransaction     (id = sha256 of canonical body)
//! send_commit(signed) -> CommittedTransaction           (ledger side)
//! ```
//!
//! Conditions follow the ledger's JSON layout (`ed25519-sha-256` for one
//! owner, `threshold-sha-256` requiring every owner for several). The
//! fulfillment is a base64url JSON bundle of per-owner signatures rather than
//! a binary crypto-condition.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rbac_model::{AssetId, AssetPayload, MetadataPayload, OwnerSet, PublicKey};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{LedgerError, LedgerResult, RejectionReason};
use crate::keys::Keypair;

/// Transaction format version.
pub const TX_VERSION: &str = "2.0";

const ED25519_COST: u64 = 131_072;
const THRESHOLD_COST_PER_SUB: u64 = 1_024;

/// Transaction operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Transfer,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition details locking an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConditionDetails {
    /// One owner.
    #[serde(rename = "ed25519-sha-256")]
    Ed25519 { public_key: PublicKey },

    /// Several owners; `threshold` of the subconditions must sign.
    #[serde(rename = "threshold-sha-256")]
    Threshold {
        threshold: usize,
        subconditions: Vec<ConditionDetails>,
    },
}

impl ConditionDetails {
    /// Condition requiring every key in `owners`.
    pub fn for_owners(owners: &OwnerSet) -> Self {
        match owners.keys() {
            [single] => ConditionDetails::Ed25519 {
                public_key: single.clone(),
            },
            keys => ConditionDetails::Threshold {
                threshold: keys.len(),
                subconditions: keys
                    .iter()
                    .map(|k| ConditionDetails::Ed25519 {
                        public_key: k.clone(),
                    })
                    .collect(),
            },
        }
    }

    /// Every key named by the condition.
    pub fn public_keys(&self) -> Vec<PublicKey> {
        match self {
            ConditionDetails::Ed25519 { public_key } => vec![public_key.clone()],
            ConditionDetails::Threshold { subconditions, .. } => {
                subconditions.iter().flat_map(|c| c.public_keys()).collect()
            }
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ConditionDetails::Ed25519 { .. } => "ed25519-sha-256",
            ConditionDetails::Threshold { .. } => "threshold-sha-256",
        }
    }

    fn cost(&self) -> u64 {
        match self {
            ConditionDetails::Ed25519 { .. } => ED25519_COST,
            ConditionDetails::Threshold { subconditions, .. } => subconditions
                .iter()
                .map(|c| c.cost() + THRESHOLD_COST_PER_SUB)
                .sum(),
        }
    }

    /// `ni:///sha-256;<fingerprint>?fpt=<type>&cost=<cost>` URI of the condition.
    pub fn uri(&self) -> LedgerResult<String> {
        let fingerprint = URL_SAFE_NO_PAD.encode(Sha256::digest(canonical_bytes(self)?));
        let mut uri = format!(
            "ni:///sha-256;{}?fpt={}&cost={}",
            fingerprint,
            self.type_name(),
            self.cost()
        );
        if let ConditionDetails::Threshold { .. } = self {
            uri.push_str("&subtypes=ed25519-sha-256");
        }
        Ok(uri)
    }
}

/// Lock on an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub details: ConditionDetails,
    pub uri: String,
}

/// An output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub condition: Condition,
    pub public_keys: Vec<PublicKey>,
    pub amount: String,
}

impl Output {
    /// A single-unit output owned jointly by `owners`.
    pub fn for_owners(owners: &OwnerSet) -> LedgerResult<Self> {
        let details = ConditionDetails::for_owners(owners);
        let uri = details.uri()?;
        Ok(Self {
            condition: Condition { details, uri },
            public_keys: owners.keys().to_vec(),
            amount: "1".to_string(),
        })
    }
}

/// Pointer from an input to the output it spends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fulfills {
    pub output_index: u32,
    pub transaction_id: String,
}

/// Input fulfillment: condition details before signing, an encoded
/// signature bundle after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fulfillment {
    Signed(String),
    Unsigned(ConditionDetails),
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub owners_before: Vec<PublicKey>,
    pub fulfills: Option<Fulfills>,
    pub fulfillment: Option<Fulfillment>,
}

/// The asset field: full payload on CREATE, a reference on TRANSFER.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxAsset {
    Link { id: AssetId },
    Data(AssetPayload),
}

/// A transaction in its wire layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<String>,
    pub version: String,
    pub operation: Operation,
    pub asset: TxAsset,
    pub metadata: Option<MetadataPayload>,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SignatureEntry {
    public_key: PublicKey,
    signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SignatureBundle {
    signatures: Vec<SignatureEntry>,
}

impl Transaction {
    /// Canonical body that every input signature covers.
    fn signing_body(&self) -> LedgerResult<Vec<u8>> {
        let mut body = self.clone();
        body.id = None;
        for input in &mut body.inputs {
            input.fulfillment = None;
        }
        canonical_bytes(&body)
    }

    /// Hex SHA-256 of the canonical transaction without its id.
    pub fn compute_id(&self) -> LedgerResult<String> {
        let mut body = self.clone();
        body.id = None;
        Ok(format!("{:x}", Sha256::digest(canonical_bytes(&body)?)))
    }
}

fn input_message(body: &[u8], input: &Input) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(body);
    if let Some(fulfills) = &input.fulfills {
        hasher.update(fulfills.transaction_id.as_bytes());
        hasher.update(fulfills.output_index.to_string().as_bytes());
    }
    hasher.finalize().to_vec()
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Compact JSON with recursively sorted keys.
fn canonical_bytes<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    let value = serde_json::to_value(value)
        .map_err(|e| LedgerError::InvalidTransaction(format!("Unserializable transaction: {e}")))?;
    serde_json::to_vec(&sort_keys(value))
        .map_err(|e| LedgerError::InvalidTransaction(format!("Unserializable transaction: {e}")))
}

/// A transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UnsignedTransaction(Transaction);

impl UnsignedTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.0
    }

    pub fn operation(&self) -> Operation {
        self.0.operation
    }
}

/// A signed transaction with its derived id.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    id: String,
    tx: Transaction,
}

impl SignedTransaction {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Accept as committed; used by ledgers after validation.
    pub fn into_committed(self) -> CommittedTransaction {
        CommittedTransaction {
            id: self.id,
            tx: self.tx,
        }
    }
}

impl Serialize for SignedTransaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.tx.serialize(serializer)
    }
}

/// A transaction the ledger has accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Transaction", into = "Transaction")]
pub struct CommittedTransaction {
    id: String,
    tx: Transaction,
}

impl TryFrom<Transaction> for CommittedTransaction {
    type Error = String;

    fn try_from(tx: Transaction) -> Result<Self, Self::Error> {
        match tx.id.clone() {
            Some(id) => Ok(Self { id, tx }),
            None => Err("committed transaction without id".to_string()),
        }
    }
}

impl From<CommittedTransaction> for Transaction {
    fn from(committed: CommittedTransaction) -> Self {
        committed.tx
    }
}

impl CommittedTransaction {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operation(&self) -> Operation {
        self.tx.operation
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Id of the asset this transaction creates or moves.
    pub fn asset_id(&self) -> AssetId {
        match &self.tx.asset {
            TxAsset::Link { id } => id.clone(),
            TxAsset::Data(_) => AssetId::new(self.id.clone()),
        }
    }

    /// The asset payload, present on CREATE.
    pub fn asset_payload(&self) -> Option<&AssetPayload> {
        match &self.tx.asset {
            TxAsset::Data(payload) => Some(payload),
            TxAsset::Link { .. } => None,
        }
    }

    pub fn metadata(&self) -> Option<&MetadataPayload> {
        self.tx.metadata.as_ref()
    }

    pub fn inputs(&self) -> &[Input] {
        &self.tx.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.tx.outputs
    }

    /// Keys that signed the transaction.
    pub fn signers(&self) -> Vec<PublicKey> {
        self.tx
            .inputs
            .iter()
            .flat_map(|i| i.owners_before.iter().cloned())
            .collect()
    }
}

/// An output to spend in a TRANSFER.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInput {
    pub fulfillment: ConditionDetails,
    pub fulfills: Fulfills,
    pub owners_before: Vec<PublicKey>,
}

impl TransferInput {
    /// Spend output `output_index` of a committed transaction.
    pub fn spend(tx: &CommittedTransaction, output_index: u32) -> LedgerResult<Self> {
        let output = tx.outputs().get(output_index as usize).ok_or_else(|| {
            LedgerError::InvalidTransaction(format!(
                "Transaction {} has no output {}",
                tx.id(),
                output_index
            ))
        })?;
        Ok(Self {
            fulfillment: output.condition.details.clone(),
            fulfills: Fulfills {
                output_index,
                transaction_id: tx.id().to_string(),
            },
            owners_before: output.public_keys.clone(),
        })
    }
}

/// What to prepare.
#[derive(Debug, Clone)]
pub enum PrepareRequest {
    /// New asset. Without recipients the signer owns the single output.
    Create {
        signer: PublicKey,
        asset: AssetPayload,
        metadata: Option<MetadataPayload>,
        recipients: Option<OwnerSet>,
    },
    /// Move an existing asset to new owners.
    Transfer {
        asset_id: AssetId,
        metadata: Option<MetadataPayload>,
        inputs: Vec<TransferInput>,
        recipients: OwnerSet,
    },
}

/// Build an unsigned transaction.
pub fn prepare(request: PrepareRequest) -> LedgerResult<UnsignedTransaction> {
    let tx = match request {
        PrepareRequest::Create {
            signer,
            asset,
            metadata,
            recipients,
        } => {
            let recipients = recipients.unwrap_or_else(|| OwnerSet::single(signer.clone()));
            Transaction {
                id: None,
                version: TX_VERSION.to_string(),
                operation: Operation::Create,
                asset: TxAsset::Data(asset),
                metadata,
                inputs: vec![Input {
                    owners_before: vec![signer.clone()],
                    fulfills: None,
                    fulfillment: Some(Fulfillment::Unsigned(ConditionDetails::Ed25519 {
                        public_key: signer,
                    })),
                }],
                outputs: vec![Output::for_owners(&recipients)?],
            }
        }
        PrepareRequest::Transfer {
            asset_id,
            metadata,
            inputs,
            recipients,
        } => {
            if inputs.is_empty() {
                return Err(LedgerError::InvalidTransaction(
                    "TRANSFER requires at least one input".to_string(),
                ));
            }
            Transaction {
                id: None,
                version: TX_VERSION.to_string(),
                operation: Operation::Transfer,
                asset: TxAsset::Link { id: asset_id },
                metadata,
                inputs: inputs
                    .into_iter()
                    .map(|i| Input {
                        owners_before: i.owners_before,
                        fulfills: Some(i.fulfills),
                        fulfillment: Some(Fulfillment::Unsigned(i.fulfillment)),
                    })
                    .collect(),
                outputs: vec![Output::for_owners(&recipients)?],
            }
        }
    };
    Ok(UnsignedTransaction(tx))
}

/// Sign every input with the keypairs of its owners and derive the id.
pub fn fulfill(unsigned: UnsignedTransaction, keypairs: &[&Keypair]) -> LedgerResult<SignedTransaction> {
    let mut tx = unsigned.0;
    let body = tx.signing_body()?;

    for input in &mut tx.inputs {
        let message = input_message(&body, input);
        let mut signatures = Vec::with_capacity(input.owners_before.len());
        for owner in &input.owners_before {
            let keypair = keypairs
                .iter()
                .find(|kp| &kp.public_key() == owner)
                .ok_or_else(|| LedgerError::Signing(format!("No keypair for input owner {}", owner)))?;
            signatures.push(SignatureEntry {
                public_key: owner.clone(),
                signature: keypair.sign(&message),
            });
        }
        let bundle = serde_json::to_vec(&SignatureBundle { signatures })
            .map_err(|e| LedgerError::Signing(e.to_string()))?;
        input.fulfillment = Some(Fulfillment::Signed(URL_SAFE_NO_PAD.encode(bundle)));
    }

    let id = tx.compute_id()?;
    tx.id = Some(id.clone());
    Ok(SignedTransaction { id, tx })
}

fn invalid(message: impl Into<String>) -> LedgerError {
    LedgerError::Rejected {
        reason: RejectionReason::InvalidTransaction,
        message: message.into(),
    }
}

/// Check the id and every input signature of a transaction.
pub fn verify(tx: &Transaction) -> LedgerResult<()> {
    let id = tx.id.as_deref().ok_or_else(|| invalid("Transaction has no id"))?;
    if tx.compute_id()? != id {
        return Err(invalid(format!("InvalidHash: id {} does not match body", id)));
    }

    let body = tx.signing_body()?;
    for input in &tx.inputs {
        let encoded = match &input.fulfillment {
            Some(Fulfillment::Signed(encoded)) => encoded,
            _ => return Err(invalid("InvalidSignature: input is not fulfilled")),
        };
        let bundle: SignatureBundle = URL_SAFE_NO_PAD
            .decode(encoded)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| invalid("InvalidSignature: unreadable fulfillment"))?;

        let message = input_message(&body, input);
        for owner in &input.owners_before {
            let signed = bundle.signatures.iter().any(|entry| {
                &entry.public_key == owner && Keypair::verify(owner, &message, &entry.signature)
            });
            if !signed {
                return Err(invalid(format!("InvalidSignature: missing signature of {}", owner)));
            }
        }
    }
    Ok(())
}
