//! Named sub-documents scoped under a workspace.
//!
//! Same envelope and crypto path as the workspace document, addressed by
//! `(user identifier, child collection, document id)`. Both name
//! components are sanitized before composing the remote path: the
//! collection once at construction, the document id on every call, so all
//! operations address identically.

use crate::client::RemoteDocumentClient;
use crate::error::SyncResult;
use crate::sanitize::sanitize_name;
use serde_json::Value;
use std::sync::Arc;

/// Handle for one child collection of one user's workspace.
#[derive(Clone)]
pub struct ChildDocuments {
    client: Arc<RemoteDocumentClient>,
    user_id: String,
    collection: String,
}

impl ChildDocuments {
    pub fn new(
        client: Arc<RemoteDocumentClient>,
        user_id: impl Into<String>,
        collection: &str,
    ) -> Self {
        Self {
            client,
            user_id: user_id.into(),
            collection: sanitize_name(collection),
        }
    }

    /// The sanitized collection name this handle addresses.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Reads and decrypts a child document. `None` if it does not exist.
    pub async fn get(&self, doc_id: &str) -> SyncResult<Option<Value>> {
        self.client
            .fetch_child(&self.user_id, &self.collection, &sanitize_name(doc_id))
            .await
    }

    /// Creates or replaces a child document.
    pub async fn upsert(&self, doc_id: &str, payload: &Value) -> SyncResult<()> {
        self.client
            .upsert_child(
                &self.user_id,
                &self.collection,
                &sanitize_name(doc_id),
                payload,
            )
            .await
    }

    /// Deletes a child document.
    pub async fn delete(&self, doc_id: &str) -> SyncResult<()> {
        self.client
            .delete_child(&self.user_id, &self.collection, &sanitize_name(doc_id))
            .await
    }
}
