use std::{io::ErrorKind, path::PathBuf};

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;

use crate::config::S3Config;

const PRESIGN_TTL_SECS: u64 = 10 * 60;

/// How a stored object is handed back to a client.
#[derive(Debug)]
pub enum StoredObject {
    Inline { body: Bytes, content_type: String },
    Redirect(String),
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<StoredObject>>;
}

/// Keys are flat file names; anything that could escape the upload root is refused.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && !key.contains("..")
        && !key.contains('/')
        && !key.contains('\\')
        && !key.contains('\0')
}

pub fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Uploads kept in a directory on the local disk.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Creates the upload directory when it does not exist yet.
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create upload dir {}", root.display()))?;
        Ok(Self { root })
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        anyhow::ensure!(is_safe_key(key), "refusing to store object under {key:?}");
        let path = self.root.join(key);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        anyhow::ensure!(is_safe_key(key), "refusing to delete object {key:?}");
        let path = self.root.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<Option<StoredObject>> {
        if !is_safe_key(key) {
            return Ok(None);
        }
        let path = self.root.join(key);
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(StoredObject::Inline {
                body: Bytes::from(body),
                content_type: content_type_for(key).to_string(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }
}

/// Uploads kept in an S3-compatible bucket (MinIO, AWS).
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        })
    }

    fn object_key(key: &str) -> String {
        format!("uploads/{}", key)
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        anyhow::ensure!(is_safe_key(key), "refusing to store object under {key:?}");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::object_key(key))
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(Self::object_key(key))
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    // Existence is not checked; a missing key surfaces as a 404 from the bucket.
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<StoredObject>> {
        if !is_safe_key(key) {
            return Ok(None);
        }
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(Self::object_key(key))
            .presigned(PresigningConfig::expires_in(std::time::Duration::from_secs(
                PRESIGN_TTL_SECS,
            ))?)
            .await
            .context("s3 presign_get")?;
        Ok(Some(StoredObject::Redirect(presigned.uri().to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unsafe_keys_are_rejected() {
        assert!(is_safe_key("1700000000000-deadbeef.png"));
        assert!(!is_safe_key(""));
        assert!(!is_safe_key("../feedback.json"));
        assert!(!is_safe_key("a/b.png"));
        assert!(!is_safe_key("a\\b.png"));
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("x.JPG"), "image/jpeg");
        assert_eq!(content_type_for("x.png"), "image/png");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
        assert_eq!(content_type_for("x.svg"), "application/octet-stream");
    }

    #[tokio::test]
    async fn local_put_fetch_delete() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("uploads")).await.unwrap();

        storage
            .put_object("pic.png", Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();

        match storage.fetch("pic.png").await.unwrap() {
            Some(StoredObject::Inline { body, content_type }) => {
                assert_eq!(&body[..], b"\x89PNG");
                assert_eq!(content_type, "image/png");
            }
            other => panic!("unexpected {:?}", other),
        }

        storage.delete_object("pic.png").await.unwrap();
        assert!(storage.fetch("pic.png").await.unwrap().is_none());
        // deleting twice is fine
        storage.delete_object("pic.png").await.unwrap();
    }

    #[tokio::test]
    async fn local_fetch_refuses_traversal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("secret.txt"), "x").unwrap();
        let storage = LocalStorage::new(dir.path().join("uploads")).await.unwrap();
        assert!(storage.fetch("../secret.txt").await.unwrap().is_none());
    }
}
