use anyhow::Result;
use std::collections::HashMap;

use crate::domain::{DocumentCatalog, DocumentMeta};

/// A fixed set of documents, keyed by backing URL.
#[derive(Debug, Clone, Default)]
pub struct StaticDocumentCatalog {
    documents: HashMap<String, DocumentMeta>,
}

impl StaticDocumentCatalog {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, backing_url: &str, title: &str, document_type: &str) -> Self {
        // ---
        self.documents.insert(
            backing_url.to_string(),
            DocumentMeta {
                backing_url: backing_url.to_string(),
                title: title.to_string(),
                document_type: document_type.to_string(),
            },
        );
        self
    }
}

#[async_trait::async_trait]
impl DocumentCatalog for StaticDocumentCatalog {
    async fn resolve(&self, backing_url: &str) -> Result<Option<DocumentMeta>> {
        Ok(self.documents.get(backing_url).cloned())
    }
}
