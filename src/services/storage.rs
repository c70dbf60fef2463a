use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::EntityType;
use crate::utils::naming;

/// Local-disk store for originals and derivatives.
///
/// Keys are relative (`products/thumb/066/name.webp`); the same key is joined
/// onto the uploads root for the on-disk path and onto the public prefix for
/// the URL, so a URL always mirrors its path.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_prefix: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str) -> Self {
        let trimmed = public_prefix.trim_end_matches('/');
        let public_prefix = if trimmed.starts_with('/') || trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };

        Self {
            root: root.into(),
            public_prefix,
        }
    }

    pub fn from_config() -> Self {
        let config = crate::config::get_config();
        Self::new(config.uploads_dir.clone(), &config.public_url_prefix)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// `{entity folder}/{template or originals}/{shard}/{filename}`
    pub fn key_for(
        &self,
        entity_type: EntityType,
        slot: &str,
        entity_id: &str,
        filename: &str,
    ) -> String {
        format!(
            "{}/{}/{}/{}",
            entity_type.folder(),
            slot,
            naming::shard(entity_id),
            filename
        )
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_prefix, key)
    }

    /// Storage key of a public URL or a path under the public prefix.
    pub fn key_from_url(&self, url: &str) -> Option<String> {
        let path = url_path(url);
        let prefix = url_path(&self.public_prefix);
        let key = path
            .strip_prefix(prefix.as_str())
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(&path)
            .trim_start_matches('/');
        (!key.is_empty()).then(|| key.to_string())
    }

    /// Storage key of a path under the root; `None` for paths elsewhere.
    pub fn key_from_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    pub async fn ensure_parent(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Best effort delete. A missing file counts as removed; any other
    /// failure is logged and reported as `false`.
    pub async fn remove_file(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete file");
                false
            }
        }
    }
}

/// Path component of an absolute URL, or the input minus query/fragment.
fn url_path(s: &str) -> String {
    match url::Url::parse(s) {
        Ok(parsed) => parsed.path().trim_end_matches('/').to_string(),
        Err(_) => s.split(['?', '#']).next().unwrap_or(s).trim_end_matches('/').to_string(),
    }
}
