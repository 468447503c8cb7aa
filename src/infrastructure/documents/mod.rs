//! Documents stored as plain files under a root directory.
//!
//! A backing URL has the form `/documents/<relative path>`. The title is the
//! file stem and the type is the lowercased extension.

use anyhow::Result;
use std::path::{Component, Path, PathBuf};

use crate::domain::{DocumentCatalog, DocumentMeta};

const URL_PREFIX: &str = "/documents/";

pub struct FsDocumentCatalog {
    root: PathBuf,
}

impl FsDocumentCatalog {
    // ---
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Maps a backing URL onto a path below the root, or `None` when it
    /// names something outside it.
    fn locate(&self, backing_url: &str) -> Option<PathBuf> {
        // ---
        let relative = backing_url.strip_prefix(URL_PREFIX)?;
        if relative.is_empty() || relative.contains('\\') {
            return None;
        }
        let relative = Path::new(relative);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl DocumentCatalog for FsDocumentCatalog {
    // ---
    async fn resolve(&self, backing_url: &str) -> Result<Option<DocumentMeta>> {
        // ---
        let Some(path) = self.locate(backing_url) else {
            tracing::debug!("Backing URL outside document root: {}", backing_url);
            return Ok(None);
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let document_type = path
            .extension()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Ok(Some(DocumentMeta {
            backing_url: backing_url.to_string(),
            title,
            document_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn temp_root() -> PathBuf {
        // ---
        let root = std::env::temp_dir().join(format!("passkey-docs-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("reports")).unwrap();
        std::fs::write(root.join("reports").join("Q3 Summary.PDF"), b"%PDF").unwrap();
        root
    }

    #[tokio::test]
    async fn resolves_files_below_root() {
        // ---
        let root = temp_root();
        let catalog = FsDocumentCatalog::new(&root);

        let meta = catalog
            .resolve("/documents/reports/Q3 Summary.PDF")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.title, "Q3 Summary");
        assert_eq!(meta.document_type, "pdf");

        assert!(catalog.resolve("/documents/reports").await.unwrap().is_none());
        assert!(catalog.resolve("/documents/missing.txt").await.unwrap().is_none());

        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn rejects_paths_leaving_root() {
        // ---
        let catalog = FsDocumentCatalog::new("/srv/documents");
        for url in [
            "/documents/../etc/passwd",
            "/documents//etc/passwd",
            "/documents/",
            "/elsewhere/file.txt",
            "/documents/a\\..\\b",
        ] {
            assert!(catalog.locate(url).is_none(), "{url} should be rejected");
        }
        assert_eq!(
            catalog.locate("/documents/a/b.md"),
            Some(PathBuf::from("/srv/documents/a/b.md"))
        );
    }
}
