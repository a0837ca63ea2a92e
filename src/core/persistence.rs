// src/core/persistence.rs

//! The Persistence contract (spec §6), consumed only with the client read
//! lock held, never the write lock. `FilePersistence` is the default,
//! swappable implementation: a minimal on-disk key/value store keyed by
//! `(namespace, user_key)`, the client-side analogue of `spineldb`'s
//! snapshot persistence.

use crate::core::errors::FlagsError;
use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save(&self, namespace: &str, user_key: &str, payload_text: &str) -> Result<(), FlagsError>;
    async fn load(&self, namespace: &str, user_key: &str) -> Result<Option<String>, FlagsError>;
}

pub struct FilePersistence {
    base_dir: PathBuf,
}

impl FilePersistence {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, namespace: &str, user_key: &str) -> PathBuf {
        self.base_dir.join(namespace).join(sanitize(user_key))
    }
}

fn sanitize(user_key: &str) -> String {
    user_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl Persistence for FilePersistence {
    async fn save(&self, namespace: &str, user_key: &str, payload_text: &str) -> Result<(), FlagsError> {
        let path = self.path_for(namespace, user_key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, payload_text).await?;
        Ok(())
    }

    async fn load(&self, namespace: &str, user_key: &str) -> Result<Option<String>, FlagsError> {
        let path = self.path_for(namespace, user_key);
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::new(dir.path());
        persistence.save("features", "user-1", "payload").await.unwrap();
        let loaded = persistence.load("features", "user-1").await.unwrap();
        assert_eq!(loaded, Some("payload".to_string()));
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::new(dir.path());
        let loaded = persistence.load("features", "nobody").await.unwrap();
        assert_eq!(loaded, None);
    }
}
