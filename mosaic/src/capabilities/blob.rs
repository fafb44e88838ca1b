use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::BlobStore;

/// Blob store rooted at a local directory; URLs are `file://` paths
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, remote_path: &str) -> Result<PathBuf> {
        let relative = Path::new(remote_path);
        let safe = !remote_path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            bail!("invalid object path: {:?}", remote_path);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<String> {
        let destination = self.resolve(remote_path)?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        tokio::fs::copy(local_path, &destination)
            .await
            .with_context(|| format!("Failed to store {:?} as {}", local_path, remote_path))?;

        let absolute = tokio::fs::canonicalize(&destination)
            .await
            .with_context(|| format!("Failed to resolve {:?}", destination))?;

        debug!("Stored blob {} at {:?}", remote_path, absolute);
        Ok(format!("file://{}", absolute.display()))
    }
}
