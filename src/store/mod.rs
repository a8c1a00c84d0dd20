//! Flat JSON persistence: one file per logical table, atomic replace on
//! write, and a per-file async lock so a read-modify-write never interleaves
//! with another writer.

pub mod events;
pub mod polls;
pub mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::Result;

pub struct Store {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Store {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub async fn read<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.read_unlocked(name).await
    }

    pub async fn write<T>(&self, name: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.write_unlocked(name, value).await
    }

    /// Read-modify-write under the file lock. The closure's result is
    /// returned after the modified table has been persisted.
    pub async fn update<T, R, F>(&self, name: &str, f: F) -> Result<R>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> R,
    {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let mut value: T = self.read_unlocked(name).await?;
        let result = f(&mut value);
        self.write_unlocked(name, &value).await?;

        Ok(result)
    }

    async fn read_unlocked<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(name);
        if !path.exists() {
            return Ok(T::default());
        }

        let content = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_unlocked<T>(&self, name: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write to a temp file, then move it in place.
        let json = serde_json::to_string_pretty(value)?;
        let tmp = self.dir.join(format!("{}.tmp", name));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.path(name)).await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn temp_store() -> Store {
    let dir = std::env::temp_dir().join(format!("camppoll-test-{}", uuid::Uuid::new_v4()));
    Store::new(dir)
}
