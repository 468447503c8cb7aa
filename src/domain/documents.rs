use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

/// Metadata of a document a share can point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub backing_url: String,
    pub title: String,
    pub document_type: String,
}

/// Resolves share backing URLs to known documents.
#[async_trait::async_trait]
pub trait DocumentCatalog: Send + Sync {
    /// Returns `None` when the URL names nothing we can serve.
    async fn resolve(&self, backing_url: &str) -> Result<Option<DocumentMeta>>;
}

/// Type alias for any backend that implements DocumentCatalog.
pub type DocumentCatalogPtr = Arc<dyn DocumentCatalog>;
