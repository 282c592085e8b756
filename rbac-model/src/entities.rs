//! # Entities
//!
//! Kinds of records in the RBAC hierarchy and their lifecycle.
//!
//! ```text
//! AdminGroup ─(can_link)─ App
//!                          └─ Type ─┬─ TypeInstance
//!                                   └─ User
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};
use crate::payload::{AssetPayload, CanLink, MetadataPayload};

/// Label carried by every user record's asset data.
pub const USER_LABEL: &str = "UserAsset";

/// Kinds of records the registry writes to the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Root group whose `can_link` lists the admin public keys.
    AdminGroup,

    /// Top-level namespace anchor, authorized through the admin group.
    App,

    /// Named resource category (e.g. "catalogers", "BIBFRAME_works").
    Type,

    /// Concrete record created under a type.
    TypeInstance,

    /// Principal record, handed over to its own key after creation.
    User,

    /// Anything created through the generic primitive.
    Asset,
}

impl EntityKind {
    /// Get the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::AdminGroup => "admin_group",
            EntityKind::App => "app",
            EntityKind::Type => "type",
            EntityKind::TypeInstance => "type_instance",
            EntityKind::User => "user",
            EntityKind::Asset => "asset",
        }
    }

    /// Parse a kind from its string representation.
    ///
    /// # Example
    ///
    /// ```
    /// use rbac_model::EntityKind;
    ///
    /// assert_eq!(EntityKind::parse("admin_group"), Some(EntityKind::AdminGroup));
    /// assert_eq!(EntityKind::parse("instance"), Some(EntityKind::TypeInstance));
    /// assert_eq!(EntityKind::parse("policy"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin_group" | "group" | "admins" => Some(EntityKind::AdminGroup),
            "app" | "application" => Some(EntityKind::App),
            "type" => Some(EntityKind::Type),
            "type_instance" | "instance" => Some(EntityKind::TypeInstance),
            "user" => Some(EntityKind::User),
            "asset" => Some(EntityKind::Asset),
            _ => None,
        }
    }

    /// Get all kinds.
    pub fn all() -> Vec<Self> {
        vec![
            EntityKind::AdminGroup,
            EntityKind::App,
            EntityKind::Type,
            EntityKind::TypeInstance,
            EntityKind::User,
            EntityKind::Asset,
        ]
    }

    /// Whether records of this kind must carry a `link` to a parent.
    pub fn requires_link(&self) -> bool {
        matches!(self, EntityKind::Type | EntityKind::TypeInstance | EntityKind::User)
    }

    /// Whether records of this kind must carry a namespace identifier.
    pub fn requires_namespace(&self) -> bool {
        matches!(
            self,
            EntityKind::AdminGroup | EntityKind::App | EntityKind::Type | EntityKind::TypeInstance
        )
    }

    /// Whether records of this kind may change owner after creation.
    pub fn supports_transfer(&self) -> bool {
        matches!(self, EntityKind::User)
    }

    /// Check whether a record of this kind may hang under `parent`.
    ///
    /// # Example
    ///
    /// ```
    /// use rbac_model::EntityKind;
    ///
    /// assert!(EntityKind::Type.can_link_under(EntityKind::App));
    /// assert!(EntityKind::User.can_link_under(EntityKind::AdminGroup));
    /// assert!(!EntityKind::TypeInstance.can_link_under(EntityKind::App));
    /// ```
    pub fn can_link_under(&self, parent: EntityKind) -> bool {
        match self {
            EntityKind::App => parent == EntityKind::AdminGroup,
            EntityKind::Type => matches!(
                parent,
                EntityKind::App | EntityKind::Type | EntityKind::AdminGroup
            ),
            EntityKind::TypeInstance => parent == EntityKind::Type,
            EntityKind::User => matches!(parent, EntityKind::Type | EntityKind::AdminGroup),
            EntityKind::AdminGroup | EntityKind::Asset => false,
        }
    }

    /// Infer the kind of a committed record from its payloads.
    ///
    /// Records are recognised structurally:
    /// - `label: "UserAsset"` marks a user
    /// - no link and a `can_link` key list marks the admin group
    /// - no link and a `can_link` reference marks an app
    /// - a link plus `can_link` marks a type
    /// - a link alone marks a type instance
    pub fn infer(asset: &AssetPayload, metadata: Option<&MetadataPayload>) -> Self {
        let data = asset.data();
        if data.field("label").and_then(|v| v.as_str()) == Some(USER_LABEL) {
            return EntityKind::User;
        }

        let can_link = metadata.and_then(|m| m.can_link());
        match (data.link(), can_link) {
            (None, Some(CanLink::Keys(_))) => EntityKind::AdminGroup,
            (None, Some(CanLink::Reference(_))) => EntityKind::App,
            (Some(_), Some(_)) => EntityKind::Type,
            (Some(_), None) => EntityKind::TypeInstance,
            (None, None) => EntityKind::Asset,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a record: `Unconstructed -> Created -> [Transferred]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Not yet written to the ledger.
    Unconstructed,
    /// CREATE committed.
    Created,
    /// Ownership handed over by the one-time TRANSFER.
    Transferred,
}

impl EntityState {
    /// Get the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Unconstructed => "unconstructed",
            EntityState::Created => "created",
            EntityState::Transferred => "transferred",
        }
    }

    /// State implied by a record's ledger history.
    pub fn from_history(transfer_count: usize) -> Self {
        if transfer_count == 0 {
            EntityState::Created
        } else {
            EntityState::Transferred
        }
    }

    /// Check if `next` is reachable from this state for the given kind.
    pub fn can_transition_to(&self, next: EntityState, kind: EntityKind) -> bool {
        match (self, next) {
            (EntityState::Unconstructed, EntityState::Created) => true,
            (EntityState::Created, EntityState::Transferred) => kind.supports_transfer(),
            _ => false,
        }
    }

    /// Move to `next`, or fail if the model forbids it.
    ///
    /// # Example
    ///
    /// ```
    /// use rbac_model::{EntityKind, EntityState};
    ///
    /// let state = EntityState::Unconstructed
    ///     .transition(EntityState::Created, EntityKind::User)
    ///     .unwrap();
    /// assert_eq!(state, EntityState::Created);
    ///
    /// assert!(EntityState::Created
    ///     .transition(EntityState::Transferred, EntityKind::Type)
    ///     .is_err());
    /// ```
    pub fn transition(self, next: EntityState, kind: EntityKind) -> ModelResult<EntityState> {
        if self.can_transition_to(next, kind) {
            Ok(next)
        } else {
            Err(ModelError::InvalidTransition {
                kind,
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PublicKey;
    use crate::payload::NamespaceIdentifier;
    use crate::refs::AssetId;
    use serde_json::json;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes(&[byte; 32])
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(EntityKind::parse("app"), Some(EntityKind::App));
        assert_eq!(EntityKind::parse("Application"), Some(EntityKind::App));
        assert_eq!(EntityKind::parse("group"), Some(EntityKind::AdminGroup));
        assert_eq!(EntityKind::parse("user"), Some(EntityKind::User));
        assert_eq!(EntityKind::parse("nope"), None);

        for kind in EntityKind::all() {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_link_requirements() {
        assert!(EntityKind::Type.requires_link());
        assert!(EntityKind::TypeInstance.requires_link());
        assert!(EntityKind::User.requires_link());
        assert!(!EntityKind::AdminGroup.requires_link());
        assert!(!EntityKind::App.requires_link());
        assert!(!EntityKind::Asset.requires_link());

        assert!(!EntityKind::User.requires_namespace());
        assert!(EntityKind::TypeInstance.requires_namespace());
    }

    #[test]
    fn test_only_users_transfer() {
        for kind in EntityKind::all() {
            assert_eq!(kind.supports_transfer(), kind == EntityKind::User);
        }
    }

    #[test]
    fn test_state_transitions() {
        let created = EntityState::Unconstructed
            .transition(EntityState::Created, EntityKind::User)
            .unwrap();
        let transferred = created
            .transition(EntityState::Transferred, EntityKind::User)
            .unwrap();
        assert_eq!(transferred, EntityState::Transferred);

        // a user is handed over once
        let err = transferred
            .transition(EntityState::Transferred, EntityKind::User)
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidTransition { .. }));

        // no create twice, no going back
        assert!(!EntityState::Created.can_transition_to(EntityState::Created, EntityKind::Type));
        assert!(!EntityState::Transferred.can_transition_to(EntityState::Created, EntityKind::User));
        assert!(!EntityState::Created.can_transition_to(EntityState::Transferred, EntityKind::App));
    }

    #[test]
    fn test_state_from_history() {
        assert_eq!(EntityState::from_history(0), EntityState::Created);
        assert_eq!(EntityState::from_history(1), EntityState::Transferred);
    }

    #[test]
    fn test_infer_kinds() {
        let admin = AssetPayload::empty()
            .with_identifier(NamespaceIdentifier::admin("org.library").unwrap());
        let admin_meta = MetadataPayload::empty().with_can_link(CanLink::keys([key(1)]).unwrap());
        assert_eq!(EntityKind::infer(&admin, Some(&admin_meta)), EntityKind::AdminGroup);

        let app = AssetPayload::empty()
            .with_identifier(NamespaceIdentifier::root("org.library").unwrap());
        let app_meta = MetadataPayload::empty().with_can_link(CanLink::reference("group-1"));
        assert_eq!(EntityKind::infer(&app, Some(&app_meta)), EntityKind::App);

        let ty = AssetPayload::empty().with_link(AssetId::new("app-1"));
        assert_eq!(EntityKind::infer(&ty, Some(&app_meta)), EntityKind::Type);
        assert_eq!(EntityKind::infer(&ty, None), EntityKind::TypeInstance);

        let user = AssetPayload::empty()
            .with_link(AssetId::new("type-1"))
            .with_field("label", json!(USER_LABEL))
            .unwrap();
        assert_eq!(EntityKind::infer(&user, None), EntityKind::User);

        assert_eq!(EntityKind::infer(&AssetPayload::empty(), None), EntityKind::Asset);
    }
}
