//! Flat-directory media store keyed by content hash.

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::fs,
    tracing::{debug, info, warn},
};

use {
    crate::error::{Context, Error, Result},
    wabridge_common::MediaKind,
};

/// Extensions the cache-clear operation is allowed to delete. Anything else
/// sharing the directory (job record, audit log) must survive a clear.
pub const MEDIA_EXTENSIONS: &[&str] = &["gif", "jpeg", "jpg", "mp4", "png", "webp"];

/// Inbound attachment descriptor, as reported by the network gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRef {
    /// Opaque reference the gateway's download primitive is keyed by.
    pub message_ref: String,
    pub kind: MediaKind,
    pub mimetype: String,
    /// Content hash of the attachment bytes, as declared by the network.
    #[serde(default)]
    pub content_hash: Option<String>,
}

/// A completed download. Immutable once written; existence of `path` is
/// sufficient proof the bytes are on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub key: String,
    pub extension: String,
    pub path: PathBuf,
    pub mimetype: String,
    pub kind: MediaKind,
}

/// Transfer primitive supplied by the network collaborator.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(&self, media: &MediaRef) -> anyhow::Result<Vec<u8>>;
}

/// Content-addressed store over a flat cache directory.
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Return the cached asset for `media`, downloading it first if this
    /// content hash has never been seen.
    pub async fn fetch_or_download(
        &self,
        media: &MediaRef,
        downloader: &dyn MediaDownloader,
    ) -> Result<MediaAsset> {
        let hash = media.content_hash.as_deref().ok_or(Error::NoContentHash)?;
        let key = cache_key(hash);
        let extension = extension_from_mime(&media.mimetype);
        let filename = format!("{key}.{extension}");
        let path = self.dir.join(&filename);

        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!(file = %filename, "media cache hit, using existing file");
        } else {
            info!(file = %filename, "media cache miss, downloading");
            let bytes = downloader
                .download(media)
                .await
                .map_err(|e| Error::download(e.to_string()))?;
            fs::create_dir_all(&self.dir).await?;
            fs::write(&path, &bytes)
                .await
                .with_context(|| format!("write media file {}", path.display()))?;
            info!(file = %filename, bytes = bytes.len(), "media saved");
        }

        Ok(MediaAsset {
            key,
            extension,
            path,
            mimetype: media.mimetype.clone(),
            kind: media.kind,
        })
    }

    /// Delete every cache entry with an allow-listed media extension.
    /// Returns the number of files removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            let Some(ext) = ext else { continue };
            if !MEDIA_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to delete cache entry"),
            }
        }

        info!(deleted, "media cache cleared");
        Ok(deleted)
    }
}

/// Filename-safe cache key from a declared content hash. Standard-base64
/// hashes are folded onto the url-safe alphabet so the key never contains a
/// path separator.
fn cache_key(hash: &str) -> String {
    hash.chars()
        .filter(|c| *c != '=')
        .map(|c| match c {
            '/' => '_',
            '+' => '-',
            other => other,
        })
        .collect()
}

/// File extension from a declared MIME type: `image/jpeg;codecs=…` → `jpeg`.
fn extension_from_mime(mimetype: &str) -> String {
    mimetype
        .split('/')
        .nth(1)
        .and_then(|sub| sub.split(';').next())
        .map(|sub| sub.trim().to_ascii_lowercase())
        .filter(|sub| !sub.is_empty())
        .unwrap_or_else(|| "bin".into())
}
