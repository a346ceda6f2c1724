//! Proof-of-delivery media: picking a single image and validating it.
//!
//! A picker either yields one file or reports that the handler cancelled.
//! Cancelling is not an error. The picked bytes are sniffed before upload,
//! falling back to the file extension and then to a MIME type the picker
//! declared. Anything that does not resolve to `image/*` is rejected
//! without touching the network.

use async_trait::async_trait;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Raw file chosen by the handler.
#[derive(Debug, Clone)]
pub struct PickedMedia {
    /// Original file name or path. Its extension is a type hint.
    pub source: String,
    pub bytes: Vec<u8>,
    /// MIME type reported by the picker, if any.
    pub declared_mime: Option<String>,
}

/// A validated image ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofImage {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ProofImage {
    /// Validate picked bytes as an image. The upload name is
    /// `delivery_proof.<subtype>`, taken from the resolved MIME type.
    pub fn from_picked(picked: &PickedMedia) -> Result<Self> {
        if picked.bytes.is_empty() {
            return Err(Error::InvalidImage(format!("{} is empty", picked.source)));
        }
        let mime = detect_mime(picked)
            .ok_or_else(|| Error::InvalidImage(format!("{} is not an image", picked.source)))?;
        let subtype = mime
            .strip_prefix("image/")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidImage(format!("{} has MIME type {mime}", picked.source)))?
            .to_string();
        debug!(source = %picked.source, mime = %mime, size = picked.bytes.len(), "proof image validated");
        Ok(Self {
            file_name: format!("delivery_proof.{subtype}"),
            mime,
            bytes: picked.bytes.clone(),
        })
    }
}

/// Content first, then the extension of `source`, then the declared type.
fn detect_mime(picked: &PickedMedia) -> Option<String> {
    if let Ok(format) = image::guess_format(&picked.bytes) {
        return Some(format.to_mime_type().to_string());
    }
    if let Some(mime) = mime_from_extension(Path::new(&picked.source)) {
        return Some(mime);
    }
    picked
        .declared_mime
        .as_deref()
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| m.starts_with("image/"))
}

fn mime_from_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        // Phone camera formats the image crate does not decode.
        "heic" => Some("image/heic".into()),
        "heif" => Some("image/heif".into()),
        _ => image::ImageFormat::from_extension(&ext).map(|f| f.to_mime_type().to_string()),
    }
}

/// Source of a single proof image.
#[async_trait]
pub trait MediaPicker: Send + Sync {
    /// `Ok(None)` when the handler cancelled the selection.
    async fn pick_image(&self) -> Result<Option<PickedMedia>>;
}

/// Picks a file from the local filesystem: either a path fixed up front or
/// one typed at a prompt (an empty answer cancels).
pub struct FilePicker {
    path: Option<PathBuf>,
}

impl FilePicker {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn prompt() -> Self {
        Self { path: None }
    }

    async fn read(path: &Path) -> Result<PickedMedia> {
        let bytes = tokio::fs::read(path).await?;
        Ok(PickedMedia {
            source: path.display().to_string(),
            bytes,
            declared_mime: None,
        })
    }

    fn ask_for_path() -> Result<Option<PathBuf>> {
        let mut stderr = std::io::stderr();
        write!(stderr, "Path to proof-of-delivery photo (empty to cancel): ")?;
        stderr.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        let answer = line.trim();
        if answer.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathBuf::from(answer)))
        }
    }
}

#[async_trait]
impl MediaPicker for FilePicker {
    async fn pick_image(&self) -> Result<Option<PickedMedia>> {
        let path = match &self.path {
            Some(p) => p.clone(),
            None => {
                let answer = tokio::task::spawn_blocking(Self::ask_for_path)
                    .await
                    .map_err(|e| Error::Io(std::io::Error::other(e)))??;
                match answer {
                    Some(p) => p,
                    None => return Ok(None),
                }
            }
        };
        Self::read(&path).await.map(Some)
    }
}
