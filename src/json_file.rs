use std::{
    io::ErrorKind,
    marker::PhantomData,
    path::PathBuf,
};

use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::debug;

/// A pretty-printed JSON array on disk.
///
/// Writers hold `lock` for the whole read-modify-write cycle and replace the
/// file through a sibling temp file plus `rename`, so readers only ever see a
/// complete array.
pub struct JsonFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Reads every entry. A missing file is an empty collection.
    pub async fn read_all(&self) -> anyhow::Result<Vec<T>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", self.path.display()));
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&raw).with_context(|| format!("parse {}", self.path.display()))
    }

    /// Runs `f` against the current contents and persists the result.
    ///
    /// Nothing is written when `f` returns `Ok(None)` or an error.
    pub async fn update<R, F>(&self, f: F) -> anyhow::Result<Option<R>>
    where
        F: FnOnce(&mut Vec<T>) -> anyhow::Result<Option<R>>,
    {
        let _guard = self.lock.lock().await;
        let mut items = self.read_all().await?;
        let Some(out) = f(&mut items)? else {
            return Ok(None);
        };
        self.write_all(&items).await?;
        Ok(Some(out))
    }

    async fn write_all(&self, items: &[T]) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(items).context("serialize json array")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp)
            .await
            .with_context(|| format!("create {}", tmp.display()))?;
        file.write_all(&body)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("sync {}", tmp.display()))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        debug!(path = %self.path.display(), entries = items.len(), "json file written");
        Ok(())
    }
}
