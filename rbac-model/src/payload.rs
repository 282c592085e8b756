//! # Payloads
//!
//! Asset and metadata payloads as they travel inside ledger transactions.
//!
//! ```text
//! Asset    = { data: { <fields>, link?: string, "schema:identifier"?: {...} } }
//! Metadata = { <fields>, can_link?: string | string[] }
//! ```
//!
//! The RBAC-relevant fields (`link`, `schema:identifier`, `can_link`) are
//! typed and can only be set through their setters. Everything else is
//! arbitrary linked data kept in a free-form map and passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entities::EntityKind;
use crate::error::{ModelError, ModelResult};
use crate::keys::PublicKey;
use crate::refs::{AssetId, Linkable};

/// Asset field holding the parent reference.
pub const LINK_FIELD: &str = "link";

/// Asset field holding the namespace identifier.
pub const IDENTIFIER_FIELD: &str = "schema:identifier";

/// Metadata field holding the linking permission.
pub const CAN_LINK_FIELD: &str = "can_link";

/// Namespace segment appended for the admin group.
pub const ADMIN_SEGMENT: &str = "admin";

/// Namespace-qualified identifier of a record.
///
/// Serialized as a schema.org `PropertyValue`:
///
/// ```json
/// { "@type": "PropertyValue", "schema:name": "namespace", "schema:value": "org.library.catalogers" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceIdentifier {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "schema:name")]
    name: String,
    #[serde(rename = "schema:value")]
    value: String,
}

impl NamespaceIdentifier {
    /// Identifier of the namespace itself, used by the app anchor.
    pub fn root(namespace: &str) -> ModelResult<Self> {
        validate_namespace(namespace)?;
        Ok(Self::with_value(namespace.to_string()))
    }

    /// `<namespace>.<type_name>`, used by types and their instances.
    ///
    /// # Example
    ///
    /// ```
    /// use rbac_model::NamespaceIdentifier;
    ///
    /// let id = NamespaceIdentifier::qualified("org.library.catalog", "catalogers").unwrap();
    /// assert_eq!(id.value(), "org.library.catalog.catalogers");
    ///
    /// assert!(NamespaceIdentifier::qualified("org.library", "bad.name").is_err());
    /// ```
    pub fn qualified(namespace: &str, type_name: &str) -> ModelResult<Self> {
        validate_namespace(namespace)?;
        validate_type_name(type_name)?;
        Ok(Self::with_value(format!("{}.{}", namespace, type_name)))
    }

    /// `<namespace>.admin`, used by the admin group.
    pub fn admin(namespace: &str) -> ModelResult<Self> {
        Self::qualified(namespace, ADMIN_SEGMENT)
    }

    fn with_value(value: String) -> Self {
        Self {
            kind: "PropertyValue".to_string(),
            name: "namespace".to_string(),
            value,
        }
    }

    /// The qualified namespace string.
    pub fn value(&self) -> &str {
        &self.value
    }
}

fn validate_namespace(namespace: &str) -> ModelResult<()> {
    let valid = !namespace.is_empty()
        && namespace
            .split('.')
            .all(|segment| !segment.is_empty() && !segment.chars().any(char::is_whitespace));
    if valid {
        Ok(())
    } else {
        Err(ModelError::InvalidNamespace(namespace.to_string()))
    }
}

fn validate_type_name(type_name: &str) -> ModelResult<()> {
    if type_name.is_empty()
        || type_name.contains('.')
        || type_name.chars().any(char::is_whitespace)
    {
        return Err(ModelError::InvalidTypeName(type_name.to_string()));
    }
    Ok(())
}

fn reject_reserved(fields: &Map<String, Value>, reserved: &[&str]) -> ModelResult<()> {
    match reserved.iter().find(|key| fields.contains_key(**key)) {
        Some(key) => Err(ModelError::ReservedField(key.to_string())),
        None => Ok(()),
    }
}

/// The `data` object of an asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link: Option<AssetId>,

    #[serde(
        rename = "schema:identifier",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    identifier: Option<NamespaceIdentifier>,

    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl AssetData {
    /// Parent reference, if any.
    pub fn link(&self) -> Option<&AssetId> {
        self.link.as_ref()
    }

    /// Namespace identifier, if any.
    pub fn identifier(&self) -> Option<&NamespaceIdentifier> {
        self.identifier.as_ref()
    }

    /// The untyped linked-data fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look up one untyped field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Display name (`schema:name`, falling back to `name`).
    pub fn name(&self) -> Option<&str> {
        self.field("schema:name")
            .or_else(|| self.field("name"))
            .and_then(Value::as_str)
    }
}

/// An asset payload: `{ "data": { ... } }`.
///
/// # Example
///
/// ```
/// use rbac_model::{AssetId, AssetPayload, EntityKind};
/// use serde_json::json;
///
/// let asset = AssetPayload::empty()
///     .with_field("@type", json!("bf:Work")).unwrap()
///     .with_link(AssetId::new("type-1"));
///
/// assert_eq!(asset.data().link().unwrap().as_str(), "type-1");
/// assert!(asset.validate_for(EntityKind::User).is_ok());
/// assert!(asset.validate_for(EntityKind::TypeInstance).is_err()); // no namespace yet
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPayload {
    data: AssetData,
}

impl AssetPayload {
    /// An asset with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from free-form fields, rejecting the reserved keys.
    pub fn new(fields: Map<String, Value>) -> ModelResult<Self> {
        reject_reserved(&fields, &[LINK_FIELD, IDENTIFIER_FIELD])?;
        Ok(Self {
            data: AssetData {
                link: None,
                identifier: None,
                fields,
            },
        })
    }

    /// Parse a `{ "data": {...} }` JSON value.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        serde_json::from_value(value).map_err(|e| ModelError::NotAnObject(e.to_string()))
    }

    /// The `data` object.
    pub fn data(&self) -> &AssetData {
        &self.data
    }

    /// Set the parent reference.
    pub fn with_link(mut self, link: AssetId) -> Self {
        self.data.link = Some(link);
        self
    }

    /// Set the namespace identifier.
    pub fn with_identifier(mut self, identifier: NamespaceIdentifier) -> Self {
        self.data.identifier = Some(identifier);
        self
    }

    /// Add one untyped field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> ModelResult<Self> {
        let key = key.into();
        if key == LINK_FIELD || key == IDENTIFIER_FIELD {
            return Err(ModelError::ReservedField(key));
        }
        self.data.fields.insert(key, value);
        Ok(self)
    }

    /// Check the fields a record of `kind` must carry.
    pub fn validate_for(&self, kind: EntityKind) -> ModelResult<()> {
        if kind.requires_link() && self.data.link.is_none() {
            return Err(ModelError::MissingLink(kind));
        }
        if kind.requires_namespace() && self.data.identifier.is_none() {
            return Err(ModelError::MissingNamespace(kind));
        }
        Ok(())
    }
}

/// The linking permission stored in metadata.
///
/// On the wire this is either a single asset id or a list of public keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanLink {
    /// Members of the referenced group or type may link.
    Reference(AssetId),
    /// The listed keys may link.
    Keys(Vec<PublicKey>),
}

impl CanLink {
    /// Permission delegated to another record's members.
    pub fn reference(target: impl Into<AssetId>) -> Self {
        CanLink::Reference(target.into())
    }

    /// Permission delegated to a typed reference.
    pub fn to(target: &impl Linkable) -> Self {
        CanLink::Reference(target.asset_id().clone())
    }

    /// Permission granted to explicit keys; duplicates are dropped.
    pub fn keys<I>(keys: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = PublicKey>,
    {
        let mut unique: Vec<PublicKey> = Vec::new();
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        if unique.is_empty() {
            return Err(ModelError::EmptyKeySet(CAN_LINK_FIELD));
        }
        Ok(CanLink::Keys(unique))
    }

    /// The referenced record, for the delegated form.
    pub fn reference_id(&self) -> Option<&AssetId> {
        match self {
            CanLink::Reference(id) => Some(id),
            CanLink::Keys(_) => None,
        }
    }

    /// Check whether `key` is listed directly.
    pub fn lists_key(&self, key: &PublicKey) -> bool {
        match self {
            CanLink::Keys(keys) => keys.contains(key),
            CanLink::Reference(_) => false,
        }
    }
}

/// Transaction metadata: free fields plus an optional `can_link`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    can_link: Option<CanLink>,

    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl MetadataPayload {
    /// Metadata with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from free-form fields, rejecting `can_link`.
    pub fn new(fields: Map<String, Value>) -> ModelResult<Self> {
        reject_reserved(&fields, &[CAN_LINK_FIELD])?;
        Ok(Self {
            can_link: None,
            fields,
        })
    }

    /// Parse a metadata JSON object.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        let metadata: Self =
            serde_json::from_value(value).map_err(|e| ModelError::NotAnObject(e.to_string()))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Set the linking permission.
    pub fn with_can_link(mut self, can_link: CanLink) -> Self {
        self.can_link = Some(can_link);
        self
    }

    /// Add one untyped field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> ModelResult<Self> {
        let key = key.into();
        if key == CAN_LINK_FIELD {
            return Err(ModelError::ReservedField(key));
        }
        self.fields.insert(key, value);
        Ok(self)
    }

    /// Replace an untyped field in place.
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) -> ModelResult<()> {
        let key = key.into();
        if key == CAN_LINK_FIELD {
            return Err(ModelError::ReservedField(key));
        }
        self.fields.insert(key, value);
        Ok(())
    }

    /// The linking permission, if any.
    pub fn can_link(&self) -> Option<&CanLink> {
        self.can_link.as_ref()
    }

    /// The untyped fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look up one untyped field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Check that a `can_link` key list, if present, is not empty.
    pub fn validate(&self) -> ModelResult<()> {
        match &self.can_link {
            Some(CanLink::Keys(keys)) if keys.is_empty() => {
                Err(ModelError::EmptyKeySet(CAN_LINK_FIELD))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes(&[byte; 32])
    }

    #[test]
    fn test_namespace_validation() {
        assert!(NamespaceIdentifier::root("org.library.catalog").is_ok());
        assert!(NamespaceIdentifier::root("").is_err());
        assert!(NamespaceIdentifier::root("org..catalog").is_err());
        assert!(NamespaceIdentifier::root("org.library catalog").is_err());

        assert_eq!(
            NamespaceIdentifier::admin("org.library").unwrap().value(),
            "org.library.admin"
        );
        assert_eq!(
            NamespaceIdentifier::qualified("org", "").unwrap_err(),
            ModelError::InvalidTypeName(String::new())
        );
    }

    #[test]
    fn test_identifier_wire_shape() {
        let id = NamespaceIdentifier::qualified("org.library", "catalogers").unwrap();
        assert_eq!(
            serde_json::to_value(&id).unwrap(),
            json!({
                "@type": "PropertyValue",
                "schema:name": "namespace",
                "schema:value": "org.library.catalogers"
            })
        );
    }

    #[test]
    fn test_asset_wire_shape() {
        let asset = AssetPayload::empty()
            .with_field("schema:name", json!("catalogers"))
            .unwrap()
            .with_link(AssetId::new("app-1"))
            .with_identifier(NamespaceIdentifier::qualified("org.lib", "catalogers").unwrap());

        let value = serde_json::to_value(&asset).unwrap();
        assert_eq!(value["data"]["link"], json!("app-1"));
        assert_eq!(value["data"]["schema:name"], json!("catalogers"));
        assert_eq!(
            value["data"]["schema:identifier"]["schema:value"],
            json!("org.lib.catalogers")
        );
        // the misspelled key never appears
        assert!(value["data"].get("schema:identifer").is_none());
    }

    #[test]
    fn test_asset_parse_extracts_typed_fields() {
        let asset = AssetPayload::from_value(json!({
            "data": {
                "@type": "bf:Item",
                "link": "type-7",
                "schema:identifier": {
                    "@type": "PropertyValue",
                    "schema:name": "namespace",
                    "schema:value": "org.lib.items"
                }
            }
        }))
        .unwrap();

        assert_eq!(asset.data().link().unwrap().as_str(), "type-7");
        assert_eq!(asset.data().identifier().unwrap().value(), "org.lib.items");
        assert_eq!(asset.data().fields().len(), 1);
        assert_eq!(asset.data().field("@type"), Some(&json!("bf:Item")));

        let back = serde_json::to_value(&asset).unwrap();
        assert_eq!(AssetPayload::from_value(back).unwrap(), asset);
    }

    #[test]
    fn test_asset_rejects_reserved_fields() {
        let mut fields = Map::new();
        fields.insert("link".to_string(), json!("sneaky"));
        assert_eq!(
            AssetPayload::new(fields).unwrap_err(),
            ModelError::ReservedField("link".to_string())
        );

        let err = AssetPayload::empty()
            .with_field(IDENTIFIER_FIELD, json!({}))
            .unwrap_err();
        assert_eq!(err, ModelError::ReservedField(IDENTIFIER_FIELD.to_string()));

        assert!(AssetPayload::from_value(json!("just a string")).is_err());
    }

    #[test]
    fn test_asset_validation_per_kind() {
        let bare = AssetPayload::empty();
        assert_eq!(
            bare.validate_for(EntityKind::Type).unwrap_err(),
            ModelError::MissingLink(EntityKind::Type)
        );
        assert_eq!(
            bare.validate_for(EntityKind::App).unwrap_err(),
            ModelError::MissingNamespace(EntityKind::App)
        );
        assert!(bare.validate_for(EntityKind::Asset).is_ok());
    }

    #[test]
    fn test_asset_name() {
        let a = AssetPayload::empty().with_field("schema:name", json!("Works")).unwrap();
        assert_eq!(a.data().name(), Some("Works"));

        let b = AssetPayload::empty().with_field("name", json!("catalogers")).unwrap();
        assert_eq!(b.data().name(), Some("catalogers"));

        assert_eq!(AssetPayload::empty().data().name(), None);
    }

    #[test]
    fn test_can_link_wire_forms() {
        let reference = CanLink::reference("group-1");
        assert_eq!(serde_json::to_value(&reference).unwrap(), json!("group-1"));

        let keys = CanLink::keys([key(1), key(2), key(1)]).unwrap();
        let value = serde_json::to_value(&keys).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);

        let parsed: CanLink = serde_json::from_value(value).unwrap();
        assert!(parsed.lists_key(&key(2)));
        assert!(!parsed.lists_key(&key(3)));
        assert_eq!(parsed.reference_id(), None);

        let parsed: CanLink = serde_json::from_value(json!("type-4")).unwrap();
        assert_eq!(parsed.reference_id().unwrap().as_str(), "type-4");
    }

    #[test]
    fn test_can_link_requires_keys() {
        assert_eq!(
            CanLink::keys(Vec::new()).unwrap_err(),
            ModelError::EmptyKeySet(CAN_LINK_FIELD)
        );
        assert!(MetadataPayload::from_value(json!({ "can_link": [] })).is_err());
    }

    #[test]
    fn test_metadata_fields() {
        let mut metadata = MetadataPayload::empty()
            .with_field("schema:name", json!("User Added"))
            .unwrap()
            .with_can_link(CanLink::reference("g"));

        metadata
            .set_field("schema:name", json!("User Assigned to Group"))
            .unwrap();
        assert_eq!(
            metadata.field("schema:name"),
            Some(&json!("User Assigned to Group"))
        );
        assert!(metadata.set_field(CAN_LINK_FIELD, json!("x")).is_err());

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["can_link"], json!("g"));
        assert_eq!(MetadataPayload::from_value(value).unwrap(), metadata);
    }
}
