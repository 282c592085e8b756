//! # RBAC Model
//!
//! Data model for role-based access control on an append-only asset ledger.
//!
//! Every record is an asset created by a CREATE transaction. Records form a
//! tree through their `link` field, and a record's metadata `can_link`
//! decides who may create children under it:
//!
//! - **Admin group**: `can_link` lists the admin public keys
//! - **App**: namespace anchor; `can_link` names the admin group
//! - **Type**: named category under the app; `can_link` names the group or
//!   type whose members may create instances of it
//! - **User**: principal linked to a type; membership comes from owning it
//! - **Type instance**: a concrete record under a type
//!
//! ## Usage
//!
//! ```
//! use rbac_model::{AssetId, CanLink, EntityKind, MetadataPayload, NamespaceIdentifier, AssetPayload};
//!
//! let asset = AssetPayload::empty()
//!     .with_link(AssetId::new("app-1"))
//!     .with_identifier(NamespaceIdentifier::qualified("org.library.catalog", "catalogers").unwrap());
//! let metadata = MetadataPayload::empty().with_can_link(CanLink::reference("group-1"));
//!
//! assert_eq!(EntityKind::infer(&asset, Some(&metadata)), EntityKind::Type);
//! ```

pub mod entities;
pub mod error;
pub mod hierarchy;
pub mod keys;
pub mod payload;
pub mod refs;

pub use entities::{EntityKind, EntityState, USER_LABEL};
pub use error::{ModelError, ModelResult};
pub use hierarchy::{Hierarchy, HierarchyNode, LinkDecision};
pub use keys::{OwnerSet, PublicKey, PUBLIC_KEY_LEN};
pub use payload::{
    AssetData, AssetPayload, CanLink, MetadataPayload, NamespaceIdentifier, CAN_LINK_FIELD,
    IDENTIFIER_FIELD, LINK_FIELD,
};
pub use refs::{AppRef, AssetId, AssetRef, GroupRef, InstanceRef, Linkable, TypeRef, UserRef};
