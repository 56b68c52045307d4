//! HTTP client for the workspace document surface of the backend.
//!
//! Issues create/read/update/delete operations for the workspace document
//! and its child documents, decrypting envelopes transparently (with the
//! legacy fallback) and mapping authorization failures to
//! [`SyncError::SessionExpired`]. Uses reqwest with JSON serialization.

use crate::config::SyncConfig;
use crate::envelope::{obfuscate_user_key, Envelope, EnvelopeBuilder};
use crate::error::{SyncError, SyncResult};
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use vaultsync_crypto::derive_user_key;

/// Result of one conditional workspace read.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The revalidation token still matches; no body was transferred.
    Unchanged,
    /// No document exists yet (or the stored envelope was unreadable).
    Missing,
    /// A document body, not yet decrypted, plus the next revalidation token.
    Document {
        envelope: Envelope,
        revalidation: Option<String>,
    },
}

/// Client for workspace and child documents.
pub struct RemoteDocumentClient {
    http: Client,
    config: SyncConfig,
    builder: EnvelopeBuilder,
}

impl RemoteDocumentClient {
    pub fn new(config: SyncConfig) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        let builder = EnvelopeBuilder::new(config.encryption);
        Self {
            http,
            config,
            builder,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ── Workspace document ──

    /// Conditional read of the workspace document.
    ///
    /// Supplies the revalidation token from the previous successful fetch
    /// so the backend can answer "unchanged" without a body.
    pub async fn fetch_workspace(
        &self,
        user_id: &str,
        revalidation: Option<&str>,
    ) -> SyncResult<FetchOutcome> {
        let user_key = obfuscate_user_key(user_id);
        let url = self.workspace_url(&user_key);

        let mut req = self
            .http
            .get(&url)
            .query(&[("collection", self.config.collection.as_str())]);
        if let Some(token) = revalidation {
            req = req.header(IF_MODIFIED_SINCE, token);
        }

        let resp = req.send().await?;
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::Unchanged);
        }
        let resp = self.check_owned(resp, &user_key, "fetch workspace")?;

        let next_token = resp
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body: Value = resp.json().await?;
        if body.is_null() {
            debug!(user = %user_key, "no workspace document yet");
            return Ok(FetchOutcome::Missing);
        }

        match Envelope::from_value(body) {
            Ok(envelope) => Ok(FetchOutcome::Document {
                envelope,
                revalidation: next_token,
            }),
            Err(SyncError::MalformedEnvelope(reason)) => {
                // Validation failures are "no data", never a crash.
                warn!(user = %user_key, %reason, "stored envelope is malformed, treating as absent");
                Ok(FetchOutcome::Missing)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads the workspace document, creating it from `default_payload`
    /// on first access. Returns the full stamped, decrypted document.
    pub async fn load_workspace(&self, user_id: &str, default_payload: &Value) -> SyncResult<Value> {
        let key = derive_user_key(user_id)?;

        match self.fetch_workspace(user_id, None).await? {
            FetchOutcome::Document { envelope, .. } => envelope.open(&key),
            FetchOutcome::Unchanged | FetchOutcome::Missing => {
                debug!(user = %obfuscate_user_key(user_id), "creating workspace from default document");
                let envelope = self.builder.build(user_id, &key, default_payload)?;
                self.post_workspace(user_id, &envelope).await?;
                envelope.open(&key)
            }
        }
    }

    /// Writes the workspace document, re-stamping `metadata.updatedAt`.
    pub async fn upsert_workspace(&self, user_id: &str, payload: &Value) -> SyncResult<()> {
        let key = derive_user_key(user_id)?;
        let envelope = self.builder.build(user_id, &key, payload)?;
        self.post_workspace(user_id, &envelope).await
    }

    /// Deletes the workspace document.
    pub async fn delete_workspace(&self, user_id: &str) -> SyncResult<()> {
        let user_key = obfuscate_user_key(user_id);
        let resp = self
            .http
            .delete(self.workspace_url(&user_key))
            .query(&[("collection", self.config.collection.as_str())])
            .send()
            .await?;
        self.check_owned(resp, &user_key, "delete workspace")?;
        debug!(user = %user_key, "workspace deleted");
        Ok(())
    }

    // ── Public share read ──

    /// Resolves a share token to the owner's published workspace.
    ///
    /// The response carries the owner's raw identifier so this client can
    /// derive the decryption key: the one intentional exception to the
    /// identifier staying on the owner's device, scoped to content the
    /// owner chose to publish.
    pub async fn fetch_shared(&self, share_token: &str) -> SyncResult<Value> {
        #[derive(Deserialize)]
        struct SharedResponse {
            #[serde(rename = "ownerKey")]
            owner_key: String,
            document: Value,
        }

        let url = format!("{}/shared/{share_token}", self.config.api_base_url);
        let resp = self.http.get(&url).send().await?;

        let status = resp.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            return Err(SyncError::NotFound(format!(
                "share token not resolvable ({status})"
            )));
        }
        if !status.is_success() {
            return Err(SyncError::Transport(format!(
                "shared read failed with status {status}"
            )));
        }

        let body: SharedResponse = resp.json().await?;
        let key = derive_user_key(&body.owner_key)?;
        Envelope::from_value(body.document)?.open(&key)
    }

    // ── Child documents ──
    //
    // Callers go through `ChildDocuments`, which sanitizes both name
    // components before they reach these methods.

    pub(crate) async fn fetch_child(
        &self,
        user_id: &str,
        child_collection: &str,
        doc_id: &str,
    ) -> SyncResult<Option<Value>> {
        let user_key = obfuscate_user_key(user_id);
        let key = derive_user_key(user_id)?;
        let resp = self
            .http
            .get(self.child_url(&user_key, child_collection, doc_id))
            .query(&[("collection", self.config.collection.as_str())])
            .send()
            .await?;
        let resp = self.check_owned(resp, &user_key, "fetch child document")?;

        let body: Value = resp.json().await?;
        if body.is_null() {
            return Ok(None);
        }
        match Envelope::from_value(body) {
            Ok(envelope) => Ok(Some(envelope.open(&key)?)),
            Err(SyncError::MalformedEnvelope(reason)) => {
                warn!(user = %user_key, collection = child_collection, %reason,
                    "malformed child envelope, treating as absent");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn upsert_child(
        &self,
        user_id: &str,
        child_collection: &str,
        doc_id: &str,
        payload: &Value,
    ) -> SyncResult<()> {
        let user_key = obfuscate_user_key(user_id);
        let key = derive_user_key(user_id)?;
        let envelope = self.builder.build(user_id, &key, payload)?;
        let resp = self
            .http
            .post(self.child_url(&user_key, child_collection, doc_id))
            .query(&[("collection", self.config.collection.as_str())])
            .json(&envelope.to_value()?)
            .send()
            .await?;
        self.check_owned(resp, &user_key, "upsert child document")?;
        debug!(user = %user_key, collection = child_collection, doc = doc_id, "child document written");
        Ok(())
    }

    pub(crate) async fn delete_child(
        &self,
        user_id: &str,
        child_collection: &str,
        doc_id: &str,
    ) -> SyncResult<()> {
        let user_key = obfuscate_user_key(user_id);
        let resp = self
            .http
            .delete(self.child_url(&user_key, child_collection, doc_id))
            .query(&[("collection", self.config.collection.as_str())])
            .send()
            .await?;
        self.check_owned(resp, &user_key, "delete child document")?;
        Ok(())
    }

    // ── Internals ──

    async fn post_workspace(&self, user_id: &str, envelope: &Envelope) -> SyncResult<()> {
        let user_key = obfuscate_user_key(user_id);
        let resp = self
            .http
            .post(self.workspace_url(&user_key))
            .query(&[("collection", self.config.collection.as_str())])
            .json(&envelope.to_value()?)
            .send()
            .await?;
        self.check_owned(resp, &user_key, "upsert workspace")?;
        debug!(user = %user_key, "workspace written");
        Ok(())
    }

    fn workspace_url(&self, user_key: &str) -> String {
        format!("{}/workspaces/{user_key}", self.config.api_base_url)
    }

    fn child_url(&self, user_key: &str, child_collection: &str, doc_id: &str) -> String {
        format!(
            "{}/workspaces/{user_key}/children/{child_collection}/{doc_id}",
            self.config.api_base_url
        )
    }

    /// Maps the status classes of an owned-resource response.
    ///
    /// 401/403/404 are indistinguishable to this client: the session (or
    /// the identity behind it) is gone, and retrying cannot help.
    fn check_owned(&self, resp: Response, user_key: &str, op: &str) -> SyncResult<Response> {
        let status = resp.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            warn!(user = %user_key, %op, %status, "authorization failure, session must end");
            return Err(SyncError::SessionExpired(format!("{op} returned {status}")));
        }
        if !status.is_success() {
            return Err(SyncError::Transport(format!(
                "{op} failed with status {status}"
            )));
        }
        Ok(resp)
    }
}
