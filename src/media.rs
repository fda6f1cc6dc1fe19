use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::storage::StorageClient;

pub const AVATAR_FOLDER: &str = "avatars";
pub const COVER_FOLDER: &str = "covers";

/// One uploaded file, as read from a multipart field.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Stores an image under `<folder>/<uuid>.<ext>` and returns its public URL.
pub async fn upload_image(
    storage: &dyn StorageClient,
    folder: &str,
    item: UploadItem,
) -> anyhow::Result<String> {
    anyhow::ensure!(!item.body.is_empty(), "empty file");
    let ext = ext_from_mime(&item.content_type)
        .with_context(|| format!("unsupported image type {}", item.content_type))?;
    let key = format!("{}/{}.{}", folder, Uuid::new_v4(), ext);
    storage
        .put_object(&key, item.body, &item.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(public_url(storage, &key))
}

/// Deletes the object behind `url` if it lives in our bucket. Returns whether anything was deleted.
pub async fn delete_by_url(storage: &dyn StorageClient, url: &str) -> anyhow::Result<bool> {
    let Some(key) = key_from_url(storage, url) else {
        return Ok(false);
    };
    storage
        .delete_object(key)
        .await
        .with_context(|| format!("delete_object {}", key))?;
    Ok(true)
}

fn public_url(storage: &dyn StorageClient, key: &str) -> String {
    format!("{}/{}", storage.public_base().trim_end_matches('/'), key)
}

fn key_from_url<'a>(storage: &dyn StorageClient, url: &'a str) -> Option<&'a str> {
    let base = storage.public_base().trim_end_matches('/');
    url.strip_prefix(base)?
        .strip_prefix('/')
        .filter(|k| !k.is_empty())
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
