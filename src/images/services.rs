use anyhow::Context;
use bytes::Bytes;
use time::OffsetDateTime;

use crate::storage::{content_type_for, StorageClient};

pub const PUBLIC_PREFIX: &str = "/uploads";

/// An image part taken from a submission, already size-checked.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// A stored upload: the storage key and the path clients fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub key: String,
    pub public_path: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Extension of the client's file name, lowercased, if it looks like one.
fn ext_from_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > 10
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn raster_ext(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" => Some("jpg"),
        "jpeg" => Some("jpeg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        "heic" => Some("heic"),
        _ => None,
    }
}

/// Extension the upload is stored under, or `None` when it is not an accepted
/// raster image. A file name extension wins over the declared content type.
pub fn image_ext(upload: &ImageUpload) -> Option<&'static str> {
    match upload.file_name.as_deref().and_then(ext_from_file_name) {
        Some(ext) => raster_ext(&ext),
        None => upload.content_type.as_deref().and_then(ext_from_mime),
    }
}

/// `<unix millis>-<8 hex>.<ext>`; the random part keeps same-millisecond uploads apart.
pub fn object_name(ext: &str, now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    let suffix: u32 = rand::random();
    format!("{}-{:08x}.{}", millis, suffix, ext)
}

pub fn public_path(key: &str) -> String {
    format!("{}/{}", PUBLIC_PREFIX, key)
}

pub async fn store_image(
    storage: &dyn StorageClient,
    upload: ImageUpload,
) -> anyhow::Result<StoredImage> {
    let ext = image_ext(&upload).context("unsupported image type")?;
    let key = object_name(ext, OffsetDateTime::now_utc());
    // The served type follows the stored extension, never the client's header.
    storage
        .put_object(&key, upload.body, content_type_for(&key))
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(StoredImage {
        public_path: public_path(&key),
        key,
    })
}
