//! Read side of the registry: committed records and link traversal.

use rbac_ledger::{CommittedTransaction, LedgerError, NodeHealth, Operation};
use rbac_model::{
    AssetId, AssetPayload, EntityKind, EntityState, Hierarchy, HierarchyNode, MetadataPayload,
    PublicKey, TypeRef, UserRef,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::registry::Registry;

/// A committed record, folded from its transaction history.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub id: AssetId,
    pub kind: EntityKind,
    /// Asset payload as submitted in the CREATE.
    pub asset: AssetPayload,
    /// Metadata of the CREATE.
    pub metadata: Option<MetadataPayload>,
    /// Current holders of the asset.
    pub owners: Vec<PublicKey>,
    pub state: EntityState,
    latest: CommittedTransaction,
}

impl AssetRecord {
    /// Fold a history ordered CREATE first.
    pub fn from_history(history: Vec<CommittedTransaction>) -> RegistryResult<Self> {
        let create = history
            .first()
            .ok_or_else(|| RegistryError::Validation("empty asset history".to_string()))?;
        if create.operation() != Operation::Create {
            return Err(RegistryError::Validation(format!(
                "history of {} does not start with a CREATE",
                create.asset_id()
            )));
        }
        let asset = create.asset_payload().cloned().ok_or_else(|| {
            RegistryError::Validation(format!("CREATE {} carries no asset data", create.id()))
        })?;

        let id = create.asset_id();
        let metadata = create.metadata().cloned();
        let kind = EntityKind::infer(&asset, metadata.as_ref());
        let state = EntityState::from_history(history.len() - 1);

        let latest = history
            .last()
            .cloned()
            .ok_or_else(|| RegistryError::Validation("empty asset history".to_string()))?;
        let owners = latest
            .outputs()
            .first()
            .map(|output| output.public_keys.clone())
            .unwrap_or_default();

        Ok(Self {
            id,
            kind,
            asset,
            metadata,
            owners,
            state,
            latest,
        })
    }

    /// The transaction holding the current output.
    pub fn latest_transaction(&self) -> &CommittedTransaction {
        &self.latest
    }

    pub fn link(&self) -> Option<&AssetId> {
        self.asset.data().link()
    }

    pub fn name(&self) -> Option<&str> {
        self.asset.data().name()
    }

    fn to_node(&self) -> HierarchyNode {
        HierarchyNode::from_payload(
            self.id.clone(),
            &self.asset,
            self.metadata.as_ref(),
            self.owners.clone(),
        )
    }
}

/// A record visited while following links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedNode {
    pub id: AssetId,
    pub kind: EntityKind,
    pub name: Option<String>,
}

impl From<&AssetRecord> for LinkedNode {
    fn from(record: &AssetRecord) -> Self {
        Self {
            id: record.id.clone(),
            kind: record.kind,
            name: record.name().map(str::to_string),
        }
    }
}

/// Where a key sits in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Membership {
    /// User record owned by the key.
    pub user: UserRef,
    /// Type (or admin group) the user record links to.
    pub role: LinkedNode,
    /// What the type hangs under, when it resolves.
    pub anchor: Option<LinkedNode>,
}

impl Membership {
    /// The type, unless the user hangs directly under the admin group.
    pub fn type_ref(&self) -> Option<TypeRef> {
        (self.role.kind == EntityKind::Type).then(|| TypeRef::new(self.role.id.clone()))
    }

    pub fn type_name(&self) -> Option<&str> {
        self.role.name.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.role.kind == EntityKind::AdminGroup
    }

    /// Ids visited, user first.
    pub fn path(&self) -> Vec<AssetId> {
        let mut path = vec![self.user.id().clone(), self.role.id.clone()];
        if let Some(anchor) = &self.anchor {
            path.push(anchor.id.clone());
        }
        path
    }

    /// Number of `link` references followed.
    pub fn hops(&self) -> usize {
        self.path().len() - 1
    }
}

impl Registry {
    /// Fetch a record and its current owners.
    #[instrument(skip(self), fields(asset_id = %id))]
    pub async fn fetch_asset(&self, id: &AssetId) -> RegistryResult<AssetRecord> {
        let history = self
            .call("fetch_asset", self.ledger_client().transactions_for_asset(id))
            .await?;
        AssetRecord::from_history(history)
    }

    /// Like [`Registry::fetch_asset`], with `None` for unknown ids.
    pub async fn fetch_asset_opt(&self, id: &AssetId) -> RegistryResult<Option<AssetRecord>> {
        match self
            .within("fetch_asset", self.ledger_client().transactions_for_asset(id))
            .await?
        {
            Ok(history) => AssetRecord::from_history(history).map(Some),
            Err(LedgerError::NotFound(_)) => Ok(None),
            Err(e) => Err(RegistryError::from_ledger("fetch_asset", e)),
        }
    }

    /// Resolve the type a key was assigned to.
    ///
    /// Finds a user record the key holds after its TRANSFER, then follows
    /// `user.link` to the type and `type.link` to whatever anchors it. A
    /// user linked straight to the admin group resolves with the group as
    /// its role and no anchor.
    #[instrument(skip(self), fields(public_key = %public_key))]
    pub async fn authorized_type(&self, public_key: &PublicKey) -> RegistryResult<Membership> {
        let outputs = self
            .call(
                "authorized_type",
                self.ledger_client().outputs(public_key, Some(false)),
            )
            .await?;

        let mut visited = HashSet::new();
        let mut unresolved = None;
        for output in outputs {
            let tx = self
                .call("authorized_type", self.ledger_client().retrieve(&output.transaction_id))
                .await?;
            if tx.operation() != Operation::Transfer {
                continue;
            }

            let asset_id = tx.asset_id();
            if !visited.insert(asset_id.clone()) {
                continue;
            }

            let user = self.fetch_asset(&asset_id).await?;
            if user.kind != EntityKind::User || user.state != EntityState::Transferred {
                continue;
            }
            let Some(type_id) = user.link() else {
                continue;
            };

            let role = match self.fetch_asset_opt(type_id).await? {
                Some(record) if matches!(record.kind, EntityKind::Type | EntityKind::AdminGroup) => record,
                _ => {
                    debug!(user_id = %user.id, "User link does not resolve to a type");
                    unresolved = Some(user.id.clone());
                    continue;
                }
            };
            let anchor = match role.link() {
                Some(parent) => self.fetch_asset_opt(parent).await?,
                None => None,
            };

            return Ok(Membership {
                user: UserRef::new(user.id.clone()),
                role: LinkedNode::from(&role),
                anchor: anchor.as_ref().map(LinkedNode::from),
            });
        }

        match unresolved {
            Some(user_id) => Err(RegistryError::Validation(format!(
                "authorized_type: user record {} of {} is not linked to a type",
                user_id, public_key
            ))),
            None => Err(RegistryError::Validation(format!(
                "authorized_type: {} holds no assigned user record",
                public_key
            ))),
        }
    }

    /// Load records and their ancestors into a [`Hierarchy`].
    ///
    /// Parents that cannot be found are left out; their children show up
    /// in [`Hierarchy::orphans`].
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn load_hierarchy(&self, ids: &[AssetId]) -> RegistryResult<Hierarchy> {
        let mut hierarchy = Hierarchy::new();
        let mut pending: Vec<AssetId> = ids.to_vec();

        while let Some(id) = pending.pop() {
            if hierarchy.get(&id).is_some() {
                continue;
            }
            match self.fetch_asset_opt(&id).await? {
                Some(record) => {
                    if let Some(parent) = record.link() {
                        pending.push(parent.clone());
                    }
                    hierarchy.insert(record.to_node());
                }
                None => warn!(asset_id = %id, "Record not found on the ledger"),
            }
        }

        Ok(hierarchy)
    }

    /// Probe the ledger node under the call deadline.
    pub async fn ledger_health(&self) -> NodeHealth {
        let after = self.context().config().call_timeout();
        match tokio::time::timeout(after, self.ledger_client().health()).await {
            Ok(health) => health,
            Err(_) => {
                warn!(timeout_ms = after.as_millis() as u64, "Ledger health probe timed out");
                NodeHealth::unreachable(after.as_millis() as u64, "no response within deadline")
            }
        }
    }
}
