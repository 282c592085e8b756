//! # RBAC Ledger
//!
//! Client side of a CREATE/TRANSFER asset ledger:
//!
//! - [`transaction`]: transaction model with local prepare, fulfill and verify
//! - [`Keypair`]: Ed25519 keys in base58
//! - [`LedgerClient`]: the async interface the registry talks to
//! - [`HttpLedgerClient`]: reqwest client for a BigchainDB-style node
//! - [`MemoryLedger`]: in-process ledger enforcing `can_link`, with fault injection
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rbac_ledger::{HttpLedgerClient, Keypair, LedgerClient, LedgerConfig, PrepareRequest};
//! use rbac_model::AssetPayload;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpLedgerClient::from_config(&LedgerConfig::from_env()?)?;
//!     let alice = Keypair::generate();
//!
//!     let unsigned = client
//!         .prepare(PrepareRequest::Create {
//!             signer: alice.public_key(),
//!             asset: AssetPayload::empty(),
//!             metadata: None,
//!             recipients: None,
//!         })
//!         .await?;
//!     let signed = client.fulfill(unsigned, &[&alice]).await?;
//!     let committed = client.send_commit(signed).await?;
//!     println!("created {}", committed.id());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod keys;
pub mod memory;
pub mod retry;
pub mod transaction;

pub use client::{AssetMatch, LedgerClient, OutputRef};
pub use config::{ConfigError, LedgerConfig, LedgerEndpoint};
pub use error::{LedgerError, LedgerResult, RejectionReason};
pub use health::{HealthStatus, NodeHealth};
pub use http::HttpLedgerClient;
pub use keys::Keypair;
pub use memory::MemoryLedger;
pub use retry::RetryPolicy;
pub use transaction::{
    CommittedTransaction, ConditionDetails, Fulfills, Operation, Output, PrepareRequest,
    SignedTransaction, TransferInput, UnsignedTransaction,
};
