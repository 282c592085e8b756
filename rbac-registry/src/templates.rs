//! Linked-data payloads for each kind of registry record.

use chrono::{DateTime, Utc};
use rbac_model::{
    AssetId, AssetPayload, CanLink, Linkable, MetadataPayload, ModelResult, NamespaceIdentifier,
    OwnerSet, PublicKey, USER_LABEL,
};
use serde_json::{json, Value};

/// Action recorded in user metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// The admin created the user record.
    Added,
    /// The record was handed to the user's key.
    AssignedToGroup,
}

impl UserAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserAction::Added => "User Added",
            UserAction::AssignedToGroup => "User Assigned to Group",
        }
    }
}

fn group_context() -> Value {
    json!({
        "foaf": "http://xmlns.com/foaf/0.1/",
        "schema": "http://schema.org/"
    })
}

/// Admin group: `foaf:Group` whose `can_link` lists the admin keys.
pub fn admin_group(
    app_name: &str,
    namespace: &str,
    admins: &OwnerSet,
) -> ModelResult<(AssetPayload, MetadataPayload)> {
    let asset = AssetPayload::empty()
        .with_field("@context", group_context())?
        .with_field("@type", json!("foaf:Group"))?
        .with_field("schema:name", json!(format!("{} Admin User Group Asset", app_name)))?
        .with_identifier(NamespaceIdentifier::admin(namespace)?);

    let metadata = MetadataPayload::empty()
        .with_field("@context", group_context())?
        .with_field("@type", json!("foaf:Group"))?
        .with_field("schema:name", json!(format!("{} Admin User Group Metadata", app_name)))?
        .with_can_link(CanLink::keys(admins.keys().iter().cloned())?);

    Ok((asset, metadata))
}

/// App anchor: `SoftwareApplication` delegating `can_link` to the admin group.
pub fn app(app_name: &str, namespace: &str, group: &impl Linkable) -> ModelResult<(AssetPayload, MetadataPayload)> {
    let asset = AssetPayload::empty()
        .with_field("@context", json!("http://schema.org"))?
        .with_field("@type", json!("SoftwareApplication"))?
        .with_field("schema:name", json!(app_name))?
        .with_identifier(NamespaceIdentifier::root(namespace)?);

    let metadata = MetadataPayload::empty()
        .with_field("@context", group_context())?
        .with_field("@type", json!("foaf:Group"))?
        .with_field("schema:name", json!(format!("{} Metadata", app_name)))?
        .with_can_link(CanLink::to(group));

    Ok((asset, metadata))
}

/// Type: named category under `parent`, instantiable by members of `authorizing`.
pub fn type_record(
    namespace: &str,
    type_name: &str,
    parent: &AssetId,
    authorizing: &AssetId,
) -> ModelResult<(AssetPayload, MetadataPayload)> {
    let asset = AssetPayload::empty()
        .with_field("@context", json!({ "schema": "http://schema.org/" }))?
        .with_field("schema:name", json!(type_name))?
        .with_link(parent.clone())
        .with_identifier(NamespaceIdentifier::qualified(namespace, type_name)?);

    let metadata = MetadataPayload::empty().with_can_link(CanLink::reference(authorizing.clone()));

    Ok((asset, metadata))
}

/// User record, created by `creator` and linked to its type.
pub fn user(type_name: &str, link: &AssetId, creator: &PublicKey) -> ModelResult<AssetPayload> {
    Ok(AssetPayload::empty()
        .with_field(
            "@context",
            json!({
                "name": "http://schema.org/name",
                "creator": "http://purl.org/dc/terms/creator",
                "label": "http://www.w3.org/2000/01/rdf-schema#label"
            }),
        )?
        .with_field("name", json!(type_name))?
        .with_field("creator", json!(creator.as_str()))?
        .with_field("label", json!(USER_LABEL))?
        .with_link(link.clone()))
}

/// `Action` metadata describing a user assignment.
pub fn user_metadata(
    action: UserAction,
    type_name: &str,
    user_key: &PublicKey,
    at: DateTime<Utc>,
) -> ModelResult<MetadataPayload> {
    MetadataPayload::empty()
        .with_field(
            "@context",
            json!({
                "date": "http://purl.org/dc/terms/date",
                "schema": "http://schema.org/"
            }),
        )?
        .with_field("@type", json!("Action"))?
        .with_field("schema:name", json!(action.as_str()))?
        .with_field("date", json!(at.format("%Y-%m-%d %H:%M:%S%.6f").to_string()))?
        .with_field(
            "schema:additionalProperty",
            json!([
                property("timestamp", json!(at.timestamp())),
                property("UserType", json!(type_name)),
                property("PublicKey", json!(user_key.as_str())),
            ]),
        )
}

fn property(name: &str, value: Value) -> Value {
    json!({
        "@type": "schema:PropertyValue",
        "schema:name": name,
        "schema:value": value
    })
}

/// Stamp a caller's payload as an instance of `type_name`.
pub fn type_instance(
    namespace: &str,
    type_name: &str,
    type_id: &AssetId,
    payload: AssetPayload,
) -> ModelResult<AssetPayload> {
    Ok(payload
        .with_link(type_id.clone())
        .with_identifier(NamespaceIdentifier::qualified(namespace, type_name)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rbac_model::{EntityKind, GroupRef};

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes(&[byte; 32])
    }

    #[test]
    fn test_admin_group_payload() {
        let admins = OwnerSet::new([key(1), key(2)]).unwrap();
        let (asset, metadata) = admin_group("Library", "org.lib", &admins).unwrap();

        assert_eq!(asset.data().name(), Some("Library Admin User Group Asset"));
        assert_eq!(asset.data().identifier().unwrap().value(), "org.lib.admin");
        assert_eq!(asset.data().field("@type"), Some(&json!("foaf:Group")));
        assert!(metadata.can_link().unwrap().lists_key(&key(2)));
        assert_eq!(EntityKind::infer(&asset, Some(&metadata)), EntityKind::AdminGroup);
    }

    #[test]
    fn test_app_payload() {
        let (asset, metadata) = app("Library", "org.lib", &GroupRef::new("group-1")).unwrap();

        assert_eq!(asset.data().identifier().unwrap().value(), "org.lib");
        assert_eq!(
            metadata.can_link().unwrap().reference_id().unwrap().as_str(),
            "group-1"
        );
        assert_eq!(EntityKind::infer(&asset, Some(&metadata)), EntityKind::App);
    }

    #[test]
    fn test_type_payload() {
        let (asset, metadata) =
            type_record("org.lib", "catalogers", &AssetId::new("app"), &AssetId::new("group")).unwrap();

        assert_eq!(asset.data().link().unwrap().as_str(), "app");
        assert_eq!(asset.data().identifier().unwrap().value(), "org.lib.catalogers");
        assert_eq!(EntityKind::infer(&asset, Some(&metadata)), EntityKind::Type);

        assert!(type_record("org.lib", "two words", &AssetId::new("a"), &AssetId::new("g")).is_err());
    }

    #[test]
    fn test_user_payloads() {
        let asset = user("catalogers", &AssetId::new("type-1"), &key(1)).unwrap();
        assert_eq!(asset.data().field("label"), Some(&json!("UserAsset")));
        assert_eq!(asset.data().field("creator"), Some(&json!(key(1).as_str())));
        assert_eq!(EntityKind::infer(&asset, None), EntityKind::User);

        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let metadata = user_metadata(UserAction::Added, "catalogers", &key(2), at).unwrap();
        assert_eq!(metadata.field("schema:name"), Some(&json!("User Added")));
        assert_eq!(metadata.field("date"), Some(&json!("2024-03-01 12:30:00.000000")));

        let props = metadata.field("schema:additionalProperty").unwrap().as_array().unwrap();
        assert_eq!(props[0]["schema:value"], json!(at.timestamp()));
        assert_eq!(props[1]["schema:value"], json!("catalogers"));
        assert_eq!(props[2]["schema:value"], json!(key(2).as_str()));
    }

    #[test]
    fn test_type_instance_stamp() {
        let payload = AssetPayload::empty().with_field("@type", json!("bf:Work")).unwrap();
        let stamped = type_instance("org.lib", "works", &AssetId::new("t-9"), payload).unwrap();

        assert_eq!(stamped.data().link().unwrap().as_str(), "t-9");
        assert_eq!(stamped.data().identifier().unwrap().value(), "org.lib.works");
        assert_eq!(stamped.data().field("@type"), Some(&json!("bf:Work")));
        assert!(stamped.validate_for(EntityKind::TypeInstance).is_ok());
    }
}
