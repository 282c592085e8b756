//! Registry configuration and the admin context.

use rbac_ledger::config::parse_var;
use rbac_ledger::{ConfigError, Keypair};
use rbac_model::{NamespaceIdentifier, OwnerSet, PublicKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Dotted namespace of the app (e.g. "org.library.catalog").
    pub namespace: String,

    /// Display name of the app.
    pub app_name: String,

    /// Deadline for each ledger call, in milliseconds.
    pub call_timeout_ms: u64,

    /// Look for an existing admin group or type before creating one.
    pub reject_duplicates: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "org.library.catalog".to_string(),
            app_name: "Shared Library Catalog".to_string(),
            call_timeout_ms: 10_000,
            reject_duplicates: true,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RBAC_NAMESPACE`: app namespace (default: org.library.catalog)
    /// - `RBAC_APP_NAME`: app display name (default: Shared Library Catalog)
    /// - `RBAC_CALL_TIMEOUT_MS`: per-call ledger deadline (default: 10000)
    /// - `RBAC_REJECT_DUPLICATES`: check for existing records first (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        let config = Self {
            namespace: std::env::var("RBAC_NAMESPACE").unwrap_or(default.namespace),
            app_name: std::env::var("RBAC_APP_NAME").unwrap_or(default.app_name),
            call_timeout_ms: parse_var("RBAC_CALL_TIMEOUT_MS", default.call_timeout_ms)?,
            reject_duplicates: std::env::var("RBAC_REJECT_DUPLICATES")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(default.reject_duplicates),
        };
        config.validate()?;
        Ok(config)
    }

    /// Get the per-call deadline as a Duration.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        NamespaceIdentifier::root(&self.namespace).map_err(|e| ConfigError::InvalidValue {
            key: "RBAC_NAMESPACE".to_string(),
            message: e.to_string(),
        })?;
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "RBAC_APP_NAME".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RBAC_CALL_TIMEOUT_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Everything a registry needs besides the ledger: settings, the admin
/// keypair that signs administrative records, and the admin key list.
#[derive(Debug, Clone)]
pub struct RegistryContext {
    config: RegistryConfig,
    admin: Keypair,
    admin_public_keys: OwnerSet,
}

impl RegistryContext {
    /// Build a context. The admin's own key is always part of the admin key list.
    pub fn new<I>(config: RegistryConfig, admin: Keypair, other_admins: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = PublicKey>,
    {
        config.validate()?;
        let admin_public_keys = OwnerSet::new(std::iter::once(admin.public_key()).chain(other_admins))
            .map_err(|e| ConfigError::InvalidValue {
                key: "RBAC_ADMIN_PUBLIC_KEYS".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            config,
            admin,
            admin_public_keys,
        })
    }

    /// Load from environment variables.
    ///
    /// In addition to [`RegistryConfig::from_env`]:
    /// - `RBAC_ADMIN_PRIVATE_KEY`: base58 private key of the signing admin (required)
    /// - `RBAC_ADMIN_PUBLIC_KEYS`: comma-separated base58 keys of further admins
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = RegistryConfig::from_env()?;

        let private_key = std::env::var("RBAC_ADMIN_PRIVATE_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("RBAC_ADMIN_PRIVATE_KEY".to_string()))?;
        let admin = Keypair::from_private_key(private_key.trim()).map_err(|e| ConfigError::InvalidValue {
            key: "RBAC_ADMIN_PRIVATE_KEY".to_string(),
            message: e.to_string(),
        })?;

        let others = std::env::var("RBAC_ADMIN_PUBLIC_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                PublicKey::parse(s).map_err(|e| ConfigError::InvalidValue {
                    key: "RBAC_ADMIN_PUBLIC_KEYS".to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(config, admin, others)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The signing admin.
    pub fn admin(&self) -> &Keypair {
        &self.admin
    }

    /// Keys listed in the admin group's `can_link`.
    pub fn admin_public_keys(&self) -> &OwnerSet {
        &self.admin_public_keys
    }
}
