//! # RBAC Registry
//!
//! Role-based access control as a hierarchy of ledger assets:
//!
//! ```text
//! Admin Group (can_link: admin keys)
//!   └── App (can_link: admin group)
//!         └── Type "catalogers" (can_link: admin group)
//!               ├── User (owned by the user's key after TRANSFER)
//!               └── Type "works" (can_link: catalogers)
//!                     └── Type instance (signed by a cataloger)
//! ```
//!
//! The registry builds the payloads, signs and commits them, and maps the
//! ledger's answer onto [`RegistryError`]. Whether a signer may link under a
//! parent is decided by the ledger at commit time.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rbac_ledger::{HttpLedgerClient, LedgerConfig};
//! use rbac_registry::{ErrorKind, Registry, RegistryContext};
//! use std::sync::Arc;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = HttpLedgerClient::from_config(&LedgerConfig::from_env()?)?;
//!     let registry = Registry::new(Arc::new(ledger), RegistryContext::from_env()?);
//!
//!     let group = registry.bootstrap_admin_group().await?;
//!     let app = registry.bootstrap_app(&group).await?;
//!     let catalogers = registry.create_type("catalogers", &app, &group).await?;
//!
//!     let key = "9eH5Tq4CqXB1Xq3w8xNZmXp5eH6P8x5pZ4rTtQpQkVbF".parse()?;
//!     match registry.create_user(&catalogers, "catalogers", &key).await {
//!         Ok(user) => println!("user {user}"),
//!         Err(e) if e.kind() == ErrorKind::PartialFailure => {
//!             // The record exists; finish the hand-over later.
//!             eprintln!("{e}");
//!         }
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lookup;
pub mod registry;
pub mod templates;

pub use config::{RegistryConfig, RegistryContext};
pub use error::{ErrorKind, RegistryError, RegistryResult};
pub use lookup::{AssetRecord, LinkedNode, Membership};
pub use registry::Registry;
pub use templates::UserAction;
