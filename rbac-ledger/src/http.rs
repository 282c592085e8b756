//! HTTP client for a BigchainDB-style ledger node.
//!
//! Endpoints used:
//! - `POST /api/v1/transactions?mode=commit`
//! - `GET /api/v1/transactions/{id}`
//! - `GET /api/v1/transactions?asset_id={id}`
//! - `GET /api/v1/outputs?public_key={key}&spent={bool}`
//! - `GET /api/v1/assets?search={text}&limit={n}`
//! - `GET /` for health
//!
//! Only the endpoints and JSON layout follow BigchainDB. Transactions are
//! signed with this crate's own scheme: the id is the SHA-256 of our
//! canonical body and each fulfillment is a base64url JSON signature bundle,
//! not a DER crypto-condition fulfillment. A stock BigchainDB node rejects
//! these commits; the client needs a node that validates the same scheme.

use async_trait::async_trait;
use rbac_model::{AssetId, PublicKey};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

use crate::client::{AssetMatch, LedgerClient, OutputRef};
use crate::config::{LedgerConfig, LedgerEndpoint};
use crate::error::{LedgerError, LedgerResult};
use crate::health::NodeHealth;
use crate::retry::{retry_if, RetryPolicy};
use crate::transaction::{CommittedTransaction, SignedTransaction};

const TRANSACTIONS_PATH: &str = "/api/v1/transactions";
const OUTPUTS_PATH: &str = "/api/v1/outputs";
const ASSETS_PATH: &str = "/api/v1/assets";

/// Ledger node client.
#[derive(Clone)]
pub struct HttpLedgerClient {
    /// HTTP client instance.
    client: Client,

    /// Node endpoint and credentials.
    endpoint: LedgerEndpoint,

    /// Request timeout.
    timeout: Duration,

    /// Backoff for reads.
    retry: RetryPolicy,
}

impl HttpLedgerClient {
    /// Create a client for `endpoint`.
    pub fn new(endpoint: LedgerEndpoint, timeout: Duration) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Connectivity(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
            retry: RetryPolicy::default(),
        })
    }

    /// Create a client from loaded configuration.
    pub fn from_config(config: &LedgerConfig) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| LedgerError::Connectivity(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout: config.timeout(),
            retry: RetryPolicy::with_retries(config.max_retries),
        })
    }

    /// Replace the read retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &LedgerEndpoint {
        &self.endpoint
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let (Some(app_id), Some(app_key)) = (&self.endpoint.app_id, &self.endpoint.app_key) {
            request = request.header("app_id", app_id).header("app_key", app_key);
        }
        request
    }

    fn transport_error(&self, e: reqwest::Error) -> LedgerError {
        if e.is_timeout() {
            LedgerError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            LedgerError::Connectivity(e.to_string())
        }
    }

    /// GET with retries on connectivity failures.
    async fn get_json<T>(&self, operation: &str, path: &str, query: &[(&str, String)], resource: &str) -> LedgerResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint.url(path);
        let url = url.as_str();

        retry_if(
            &self.retry,
            operation,
            || async move {
                let response = self
                    .authorize(self.client.get(url))
                    .query(query)
                    .send()
                    .await
                    .map_err(|e| self.transport_error(e))?;
                self.handle_response(response, resource).await
            },
            LedgerError::is_retryable,
        )
        .await
    }

    /// Map the status code and parse JSON.
    async fn handle_response<T>(&self, response: reqwest::Response, resource: &str) -> LedgerResult<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(resource.to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            let message = error_message(&body);

            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Ledger node error ({}): {}", status.as_u16(), message);
                return Err(LedgerError::Connectivity(format!("HTTP {}: {}", status.as_u16(), message)));
            }
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                error!("Ledger node refused app credentials");
                return Err(LedgerError::Connectivity(format!(
                    "HTTP {}: app credentials rejected",
                    status.as_u16()
                )));
            }

            warn!("Ledger rejected request ({}): {}", status.as_u16(), message);
            return Err(LedgerError::rejected(message));
        }

        response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }
}

/// Pull `message` out of a JSON error body, or return the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    #[instrument(skip(self, signed), fields(tx_id = %signed.id(), operation = %signed.transaction().operation))]
    async fn send_commit(&self, signed: SignedTransaction) -> LedgerResult<CommittedTransaction> {
        debug!("Committing transaction");

        let url = self.endpoint.url(TRANSACTIONS_PATH);
        let response = self
            .authorize(self.client.post(&url))
            .query(&[("mode", "commit")])
            .json(&signed)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        self.handle_response(response, signed.id()).await
    }

    #[instrument(skip(self))]
    async fn retrieve(&self, id: &str) -> LedgerResult<CommittedTransaction> {
        debug!("Fetching transaction {}", id);
        let path = format!("{}/{}", TRANSACTIONS_PATH, id);
        self.get_json("retrieve", &path, &[], id).await
    }

    #[instrument(skip(self), fields(public_key = %public_key))]
    async fn outputs(&self, public_key: &PublicKey, spent: Option<bool>) -> LedgerResult<Vec<OutputRef>> {
        let mut query = vec![("public_key", public_key.to_string())];
        if let Some(spent) = spent {
            query.push(("spent", spent.to_string()));
        }
        self.get_json("outputs", OUTPUTS_PATH, &query, public_key.as_str())
            .await
    }

    #[instrument(skip(self))]
    async fn search_assets(&self, text: &str, limit: usize) -> LedgerResult<Vec<AssetMatch>> {
        let query = [("search", text.to_string()), ("limit", limit.to_string())];
        self.get_json("search_assets", ASSETS_PATH, &query, text).await
    }

    #[instrument(skip(self), fields(asset_id = %asset_id))]
    async fn transactions_for_asset(&self, asset_id: &AssetId) -> LedgerResult<Vec<CommittedTransaction>> {
        let query = [("asset_id", asset_id.to_string())];
        let txs: Vec<CommittedTransaction> = self
            .get_json("transactions_for_asset", TRANSACTIONS_PATH, &query, asset_id.as_str())
            .await?;
        if txs.is_empty() {
            return Err(LedgerError::NotFound(asset_id.to_string()));
        }
        Ok(txs)
    }

    #[instrument(skip(self))]
    async fn health(&self) -> NodeHealth {
        let start = Instant::now();
        let url = self.endpoint.url("/");

        match self.authorize(self.client.get(&url)).send().await {
            Ok(response) if response.status().is_success() => {
                let latency = start.elapsed().as_millis() as u64;
                let version = response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("version").and_then(|v| v.as_str()).map(String::from));
                NodeHealth::reachable(latency, version)
            }
            Ok(response) => {
                let latency = start.elapsed().as_millis() as u64;
                warn!(status_code = response.status().as_u16(), "Ledger health check failed");
                NodeHealth::unreachable(latency, format!("HTTP {}", response.status().as_u16()))
            }
            Err(e) => {
                let latency = start.elapsed().as_millis() as u64;
                error!(error = %e, "Ledger unreachable");
                NodeHealth::unreachable(latency, e.to_string())
            }
        }
    }
}
