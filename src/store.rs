use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{RenderError, Result};

/// HTML handed to the renderer, stored under a fresh id.
#[derive(Debug, Clone)]
pub struct StoredHtml {
    /// Opaque id, the `id` parameter of callback URLs.
    pub id: String,
    /// Where the HTML is written.
    pub path: PathBuf,
}

/// Temporary HTML documents waiting to be rendered.
///
/// The host application's callback endpoint serves documents out of the same
/// store with [`HtmlStore::fetch`].
#[derive(Debug, Clone)]
pub struct HtmlStore {
    dir: PathBuf,
}

impl HtmlStore {
    /// A store rooted at `dir`, created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory documents are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a fresh id and its path without writing anything.
    pub fn reserve(&self) -> StoredHtml {
        let id = Uuid::new_v4().simple().to_string();
        let path = self.dir.join(format!("{id}.htm"));
        StoredHtml { id, path }
    }

    /// Write `html` to a reserved slot.
    pub fn write(&self, slot: &StoredHtml, html: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(RenderError::io(&self.dir))?;
        fs::write(&slot.path, html).map_err(RenderError::io(&slot.path))
    }

    /// Store `html` under a new id.
    pub fn put(&self, html: &str) -> Result<StoredHtml> {
        let slot = self.reserve();
        self.write(&slot, html)?;
        Ok(slot)
    }

    /// Read back a stored document. Ids that were not issued by this store are
    /// rejected, so a request parameter cannot escape the directory.
    pub fn fetch(&self, id: &str) -> Result<String> {
        let path = self.path_for(id)?;
        fs::read_to_string(&path).map_err(RenderError::io(path))
    }

    /// Delete a stored document. Best-effort.
    pub fn remove(&self, id: &str) {
        if let Ok(path) = self.path_for(id) {
            remove_best_effort(&path);
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let id = Uuid::try_parse(id)
            .map_err(|_| RenderError::Configuration(format!("invalid document id `{id}`")))?;
        Ok(self.dir.join(format!("{}.htm", id.simple())))
    }
}

/// Delete a file, logging instead of failing.
pub(crate) fn remove_best_effort(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::debug!("could not remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn put_fetch_remove() {
        let dir = TempDir::new("htmlpress").unwrap();
        let store = HtmlStore::new(dir.path().join("input"));

        let stored = store.put("<html>hi</html>").unwrap();
        assert!(stored.path.starts_with(store.dir()));
        assert_eq!(store.fetch(&stored.id).unwrap(), "<html>hi</html>");

        store.remove(&stored.id);
        assert!(!stored.path.exists());
        assert!(matches!(store.fetch(&stored.id), Err(RenderError::Io { .. })));
    }

    #[test]
    fn ids_are_unique() {
        let store = HtmlStore::new("/nonexistent");
        let a = store.reserve();
        let b = store.reserve();
        assert_ne!(a.id, b.id);
        assert_ne!(a.path, b.path);
    }

    #[test]
    fn rejects_foreign_ids() {
        let store = HtmlStore::new("/tmp");
        let err = store.fetch("../etc/passwd").unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
    }
}
