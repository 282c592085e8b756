//! # Registry
//!
//! Writes the RBAC hierarchy to the ledger.
//!
//! ```text
//! bootstrap_admin_group()            -> GroupRef
//! bootstrap_app(&group)              -> AppRef
//! create_type(name, &parent, &auth)  -> TypeRef
//! create_user(&type, name, key)      -> UserRef     (CREATE by admin, TRANSFER to key)
//! create_type_instance(...)          -> InstanceRef (signed by the acting key)
//! create_asset(...)                  -> AssetRef
//! ```
//!
//! Authorization is never checked here. The ledger applies `can_link` when a
//! CREATE is committed, and its refusal comes back as
//! [`RegistryError::Authorization`].

use chrono::Utc;
use rbac_ledger::{
    CommittedTransaction, Keypair, LedgerClient, LedgerResult, PrepareRequest, TransferInput,
};
use rbac_model::{
    AppRef, AssetId, AssetPayload, AssetRef, EntityKind, EntityState, GroupRef, InstanceRef,
    Linkable, MetadataPayload, NamespaceIdentifier, OwnerSet, PublicKey, TypeRef, UserRef,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RegistryContext;
use crate::error::{RegistryError, RegistryResult};
use crate::templates::{self, UserAction};

/// First page size of the duplicate search; doubled until the hits run out.
const DUPLICATE_SEARCH_LIMIT: usize = 50;

/// The RBAC registry.
///
/// # Example
///
/// ```
/// use rbac_ledger::{Keypair, MemoryLedger};
/// use rbac_registry::{Registry, RegistryConfig, RegistryContext};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let admin = Keypair::generate();
/// let context = RegistryContext::new(RegistryConfig::default(), admin, [])?;
/// let registry = Registry::new(Arc::new(MemoryLedger::new()), context);
///
/// let group = registry.bootstrap_admin_group().await?;
/// let app = registry.bootstrap_app(&group).await?;
/// let catalogers = registry.create_type("catalogers", &app, &group).await?;
///
/// let alice = Keypair::generate();
/// registry.create_user(&catalogers, "catalogers", &alice.public_key()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Registry {
    ledger: Arc<dyn LedgerClient>,
    context: RegistryContext,
}

impl Registry {
    /// Create a registry over `ledger`.
    pub fn new(ledger: Arc<dyn LedgerClient>, context: RegistryContext) -> Self {
        Self { ledger, context }
    }

    pub fn context(&self) -> &RegistryContext {
        &self.context
    }

    pub(crate) fn ledger_client(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    /// Run a ledger call under the configured deadline.
    pub(crate) async fn within<T, F>(&self, operation: &'static str, call: F) -> RegistryResult<LedgerResult<T>>
    where
        F: Future<Output = LedgerResult<T>>,
    {
        let after = self.context.config().call_timeout();
        tokio::time::timeout(after, call).await.map_err(|_| {
            warn!(operation, timeout_ms = after.as_millis() as u64, "Ledger call timed out");
            RegistryError::Timeout { operation, after }
        })
    }

    /// Run a ledger call under the deadline and map its error.
    pub(crate) async fn call<T, F>(&self, operation: &'static str, call: F) -> RegistryResult<T>
    where
        F: Future<Output = LedgerResult<T>>,
    {
        self.within(operation, call)
            .await?
            .map_err(|e| RegistryError::from_ledger(operation, e))
    }

    /// Prepare, sign and commit.
    async fn submit(
        &self,
        operation: &'static str,
        request: PrepareRequest,
        signer: &Keypair,
    ) -> RegistryResult<CommittedTransaction> {
        let link = match &request {
            PrepareRequest::Create { asset, .. } => asset.data().link().cloned(),
            PrepareRequest::Transfer { .. } => None,
        };

        let unsigned = self.call(operation, self.ledger.prepare(request)).await?;
        let signed = self.call(operation, self.ledger.fulfill(unsigned, &[signer])).await?;
        debug!(operation, tx_id = %signed.id(), "Submitting transaction");

        self.call(operation, self.ledger.send_commit(signed))
            .await
            .map_err(|e| e.with_link_context(signer.public_key(), link))
    }

    /// Validate and CREATE one record.
    async fn create_record(
        &self,
        operation: &'static str,
        kind: EntityKind,
        asset: AssetPayload,
        metadata: Option<MetadataPayload>,
        signer: &Keypair,
        recipients: Option<OwnerSet>,
    ) -> RegistryResult<CommittedTransaction> {
        asset.validate_for(kind)?;
        if let Some(metadata) = &metadata {
            metadata.validate()?;
        }

        let request = PrepareRequest::Create {
            signer: signer.public_key(),
            asset,
            metadata,
            recipients,
        };
        let tx = self.submit(operation, request, signer).await?;
        EntityState::Unconstructed.transition(EntityState::Created, kind)?;
        Ok(tx)
    }

    /// Fail if a record with the same identifier and parent is already on the ledger.
    ///
    /// Instances share their type's identifier, so the search widens until
    /// the ledger returns fewer hits than asked for. Two concurrent callers
    /// can still both pass.
    async fn ensure_unique(
        &self,
        operation: &'static str,
        identifier: &NamespaceIdentifier,
        parent: Option<&AssetId>,
    ) -> RegistryResult<()> {
        let mut limit = DUPLICATE_SEARCH_LIMIT;
        loop {
            let hits = self
                .call(operation, self.ledger.search_assets(identifier.value(), limit))
                .await?;

            let existing = hits.iter().find(|hit| {
                hit.payload().is_some_and(|payload| {
                    payload.data().identifier() == Some(identifier) && payload.data().link() == parent
                })
            });
            if let Some(hit) = existing {
                return Err(RegistryError::Validation(format!(
                    "{operation}: {} already exists as {}",
                    identifier.value(),
                    hit.id
                )));
            }

            if hits.len() < limit {
                return Ok(());
            }
            debug!(operation, limit, "Duplicate search page full, widening");
            limit = limit.saturating_mul(2);
        }
    }

    fn check_parent(child: EntityKind, parent: &impl Linkable) -> RegistryResult<()> {
        match parent.entity_kind() {
            Some(kind) if !child.can_link_under(kind) => Err(RegistryError::Validation(format!(
                "a {} cannot be linked under a {}",
                child, kind
            ))),
            _ => Ok(()),
        }
    }

    /// Create the admin group; its `can_link` lists the admin keys.
    #[instrument(skip(self), fields(namespace = %self.context.config().namespace))]
    pub async fn bootstrap_admin_group(&self) -> RegistryResult<GroupRef> {
        let config = self.context.config();
        let (asset, metadata) =
            templates::admin_group(&config.app_name, &config.namespace, self.context.admin_public_keys())?;

        if config.reject_duplicates {
            if let Some(identifier) = asset.data().identifier() {
                self.ensure_unique("bootstrap_admin_group", identifier, None).await?;
            }
        }

        let tx = self
            .create_record(
                "bootstrap_admin_group",
                EntityKind::AdminGroup,
                asset,
                Some(metadata),
                self.context.admin(),
                None,
            )
            .await?;

        info!(group_id = %tx.id(), admins = self.context.admin_public_keys().len(), "Admin group created");
        Ok(GroupRef::new(tx.id()))
    }

    /// Create the app anchor, delegating `can_link` to `admin_group`.
    #[instrument(skip(self, admin_group), fields(group_id = %admin_group))]
    pub async fn bootstrap_app(&self, admin_group: &GroupRef) -> RegistryResult<AppRef> {
        let group_tx = self
            .call("bootstrap_app", self.ledger.retrieve(admin_group.id().as_str()))
            .await?;
        let kind = group_tx
            .asset_payload()
            .map(|asset| EntityKind::infer(asset, group_tx.metadata()));
        if kind != Some(EntityKind::AdminGroup) {
            return Err(RegistryError::Validation(format!(
                "bootstrap_app: {} is not an admin group",
                admin_group
            )));
        }

        let config = self.context.config();
        let (asset, metadata) = templates::app(&config.app_name, &config.namespace, admin_group)?;
        let tx = self
            .create_record(
                "bootstrap_app",
                EntityKind::App,
                asset,
                Some(metadata),
                self.context.admin(),
                None,
            )
            .await?;

        info!(app_id = %tx.id(), "App created");
        Ok(AppRef::new(tx.id()))
    }

    /// Create a type under `parent` whose instances members of `authorizing` may create.
    #[instrument(skip(self, parent, authorizing), fields(parent = %parent.asset_id(), authorizing = %authorizing.asset_id()))]
    pub async fn create_type(
        &self,
        type_name: &str,
        parent: &(impl Linkable + Sync),
        authorizing: &(impl Linkable + Sync),
    ) -> RegistryResult<TypeRef> {
        Self::check_parent(EntityKind::Type, parent)?;

        let config = self.context.config();
        let (asset, metadata) = templates::type_record(
            &config.namespace,
            type_name,
            parent.asset_id(),
            authorizing.asset_id(),
        )?;

        if config.reject_duplicates {
            if let Some(identifier) = asset.data().identifier() {
                self.ensure_unique("create_type", identifier, Some(parent.asset_id()))
                    .await?;
            }
        }

        let tx = self
            .create_record(
                "create_type",
                EntityKind::Type,
                asset,
                Some(metadata),
                self.context.admin(),
                None,
            )
            .await?;

        info!(type_id = %tx.id(), "Type created");
        Ok(TypeRef::new(tx.id()))
    }

    /// Create a user under `type_ref` and hand it to `user_public_key`.
    ///
    /// Two commits: CREATE signed by the admin, then TRANSFER of its output.
    /// If the second fails the user exists but is still admin-owned; the
    /// error is [`RegistryError::PartialFailure`] and
    /// [`Registry::complete_user_transfer`] finishes the job.
    #[instrument(skip(self, type_ref, user_public_key), fields(type_id = %type_ref.asset_id(), user = %user_public_key))]
    pub async fn create_user(
        &self,
        type_ref: &(impl Linkable + Sync),
        type_name: &str,
        user_public_key: &PublicKey,
    ) -> RegistryResult<UserRef> {
        Self::check_parent(EntityKind::User, type_ref)?;

        let admin = self.context.admin();
        let now = Utc::now();
        let asset = templates::user(type_name, type_ref.asset_id(), &admin.public_key())?;
        let mut metadata = templates::user_metadata(UserAction::Added, type_name, user_public_key, now)?;

        let created = self
            .create_record(
                "create_user",
                EntityKind::User,
                asset,
                Some(metadata.clone()),
                admin,
                None,
            )
            .await?;
        let user = UserRef::new(created.id());
        debug!(user_id = %user, "User record created, transferring");

        metadata.set_field("schema:name", json!(UserAction::AssignedToGroup.as_str()))?;
        match self.transfer_user(&created, user_public_key, metadata).await {
            Ok(_) => {
                info!(user_id = %user, "User created and assigned");
                Ok(user)
            }
            Err(source) => {
                error!(user_id = %user, error = %source, "User created but transfer failed");
                Err(RegistryError::PartialFailure {
                    user,
                    user_public_key: user_public_key.clone(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Finish a user creation that stopped after the CREATE.
    #[instrument(skip(self, user, user_public_key), fields(user_id = %user))]
    pub async fn complete_user_transfer(
        &self,
        user: &UserRef,
        type_name: &str,
        user_public_key: &PublicKey,
    ) -> RegistryResult<UserRef> {
        let record = self.fetch_asset(user.id()).await?;
        if record.kind != EntityKind::User {
            return Err(RegistryError::Validation(format!(
                "complete_user_transfer: {} is a {}, not a user",
                user, record.kind
            )));
        }
        record.state.transition(EntityState::Transferred, record.kind)?;

        let metadata =
            templates::user_metadata(UserAction::AssignedToGroup, type_name, user_public_key, Utc::now())?;
        self.transfer_user(record.latest_transaction(), user_public_key, metadata)
            .await?;

        info!("User transfer completed");
        Ok(user.clone())
    }

    async fn transfer_user(
        &self,
        created: &CommittedTransaction,
        user_public_key: &PublicKey,
        metadata: MetadataPayload,
    ) -> RegistryResult<CommittedTransaction> {
        let input = TransferInput::spend(created, 0)
            .map_err(|e| RegistryError::from_ledger("transfer_user", e))?;

        let request = PrepareRequest::Transfer {
            asset_id: created.asset_id(),
            metadata: Some(metadata),
            inputs: vec![input],
            recipients: OwnerSet::single(user_public_key.clone()),
        };
        self.submit("transfer_user", request, self.context.admin()).await
    }

    /// Create an instance of a type, signed by the acting key.
    ///
    /// The ledger accepts it only if the signer is a member of the type's
    /// `can_link`.
    #[instrument(skip(self, payload, metadata, keypair), fields(type_id = %type_ref, signer = %keypair.public_key()))]
    pub async fn create_type_instance(
        &self,
        type_name: &str,
        type_ref: &TypeRef,
        payload: AssetPayload,
        metadata: MetadataPayload,
        keypair: &Keypair,
    ) -> RegistryResult<InstanceRef> {
        if metadata.can_link().is_some() {
            return Err(RegistryError::Validation(
                "create_type_instance: instance metadata must not carry can_link".to_string(),
            ));
        }
        let asset = templates::type_instance(
            &self.context.config().namespace,
            type_name,
            type_ref.id(),
            payload,
        )?;

        let tx = self
            .create_record(
                "create_type_instance",
                EntityKind::TypeInstance,
                asset,
                Some(metadata),
                keypair,
                None,
            )
            .await?;

        info!(instance_id = %tx.id(), "Type instance created");
        Ok(InstanceRef::new(tx.id()))
    }

    /// Create an arbitrary asset.
    ///
    /// Signed by `keypair`, or by the admin when `None`. Without `owners`
    /// the signer owns the single output; with `owners` (even one key) the
    /// output is co-owned by exactly those keys.
    #[instrument(skip(self, payload, metadata, keypair, owners))]
    pub async fn create_asset(
        &self,
        payload: AssetPayload,
        metadata: Option<MetadataPayload>,
        keypair: Option<&Keypair>,
        owners: Option<OwnerSet>,
    ) -> RegistryResult<AssetRef> {
        let signer = keypair.unwrap_or_else(|| self.context.admin());
        let tx = self
            .create_record("create_asset", EntityKind::Asset, payload, metadata, signer, owners)
            .await?;

        info!(asset_id = %tx.id(), "Asset created");
        Ok(AssetRef::new(tx.id()))
    }
}
