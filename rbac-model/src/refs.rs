//! Asset identifiers and typed references to registry records.
//!
//! The ledger assigns every record an identifier (the id of its CREATE
//! transaction). The typed wrappers keep a group reference from being passed
//! where a type is expected; [`Linkable`] lets any of them be used as a link
//! or `can_link` target.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::EntityKind;

/// Ledger-assigned identifier of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Anything that can be linked to or named in `can_link`.
pub trait Linkable {
    /// The referenced asset.
    fn asset_id(&self) -> &AssetId;

    /// The kind of record referenced, when known.
    fn entity_kind(&self) -> Option<EntityKind> {
        None
    }
}

impl Linkable for AssetId {
    fn asset_id(&self) -> &AssetId {
        self
    }
}

macro_rules! entity_ref {
    ($(#[$meta:meta])* $name:ident => $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(AssetId);

        impl $name {
            /// Wrap a ledger identifier.
            pub fn new(id: impl Into<AssetId>) -> Self {
                Self(id.into())
            }

            /// The referenced asset.
            pub fn id(&self) -> &AssetId {
                &self.0
            }
        }

        impl Linkable for $name {
            fn asset_id(&self) -> &AssetId {
                &self.0
            }

            fn entity_kind(&self) -> Option<EntityKind> {
                $kind
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

entity_ref!(
    /// Reference to the admin group.
    GroupRef => Some(EntityKind::AdminGroup)
);
entity_ref!(
    /// Reference to an app anchor.
    AppRef => Some(EntityKind::App)
);
entity_ref!(
    /// Reference to a type.
    TypeRef => Some(EntityKind::Type)
);
entity_ref!(
    /// Reference to a user record.
    UserRef => Some(EntityKind::User)
);
entity_ref!(
    /// Reference to a type instance.
    InstanceRef => Some(EntityKind::TypeInstance)
);
entity_ref!(
    /// Reference to a record created through the generic primitive.
    AssetRef => None
);
