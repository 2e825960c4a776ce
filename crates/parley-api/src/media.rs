use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use uuid::Uuid;

use parley_types::models::MessageKind;

use crate::error::ApiError;

/// 10 MiB upload limit for media
pub const MAX_MEDIA_SIZE: usize = 10 * 1024 * 1024;

/// Flat directory of uploaded media. Files are named
/// `{kind}_{uuid}.{ext}` and that file name is the reference clients send
/// back in media messages.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` under a fresh name and returns that name.
    pub async fn save(&self, kind: MessageKind, ext: &str, bytes: &[u8]) -> Result<String, ApiError> {
        let name = format!("{}_{}.{}", kind, Uuid::new_v4(), ext);
        let path = self.dir.join(&name);

        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            error!("Failed to create media file {}: {}", path.display(), e);
            ApiError::Internal("media write failed".into())
        })?;
        file.write_all(bytes).await.map_err(|e| {
            error!("Failed to write media file {}: {}", path.display(), e);
            ApiError::Internal("media write failed".into())
        })?;
        file.flush().await.map_err(|e| ApiError::Internal(e.to_string()))?;

        debug!("Stored {} bytes as {}", bytes.len(), name);
        Ok(name)
    }

    /// True when `reference` is a well-formed name that exists in the store.
    pub async fn exists(&self, reference: &str) -> bool {
        if parse_reference(reference).is_none() {
            return false;
        }
        tokio::fs::try_exists(self.dir.join(reference))
            .await
            .unwrap_or(false)
    }
}

/// Raster image subtypes. Vector formats such as SVG can carry script and
/// are served from our own origin, so they are refused.
const RASTER_IMAGE_SUBTYPES: &[&str] = &[
    "png", "jpeg", "jpg", "pjpeg", "gif", "webp", "bmp", "avif", "heic", "heif", "tiff",
];

/// Maps a declared content type to a message kind plus a file extension.
/// Accepts raster `image/*` subtypes and any `video/*`.
pub fn classify_content_type(content_type: &str) -> Option<(MessageKind, String)> {
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    let (top, sub) = essence.split_once('/')?;
    let kind = match top {
        "image" if RASTER_IMAGE_SUBTYPES.contains(&sub) => MessageKind::Image,
        "video" => MessageKind::Video,
        _ => return None,
    };

    let ext: String = sub.chars().filter(char::is_ascii_alphanumeric).take(16).collect();
    let ext = if ext.is_empty() { "bin".to_string() } else { ext };
    Some((kind, ext))
}

/// Splits `{kind}_{uuid}.{ext}` into its kind. Anything else, including
/// names carrying path separators, is rejected.
pub fn parse_reference(reference: &str) -> Option<MessageKind> {
    if reference.contains(['/', '\\']) {
        return None;
    }
    let (kind, rest) = reference.split_once('_')?;
    let (id, ext) = rest.split_once('.')?;
    id.parse::<Uuid>().ok()?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    match kind.parse::<MessageKind>().ok()? {
        MessageKind::Text => None,
        media => Some(media),
    }
}

pub fn reference_matches_kind(reference: &str, kind: MessageKind) -> bool {
    parse_reference(reference) == Some(kind)
}
