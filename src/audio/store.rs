use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Upload extensions we trust enough to keep. Anything else is stored
/// under the default client capture format.
const UPLOAD_EXTENSIONS: [&str; 4] = ["wav", "webm", "ogg", "mp4"];
const DEFAULT_UPLOAD_EXTENSION: &str = "webm";

/// Owns the audio directory: allocates output paths, persists uploads,
/// and removes files the session no longer references.
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create audio directory {}", self.dir.display()))
    }

    /// Timestamp-named path for a new capture or upload.
    pub fn allocate(&self, extension: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S%3f");
        self.dir.join(format!("rec-{stamp}.{extension}"))
    }

    /// Write an uploaded audio body to disk, deriving the extension from
    /// the client's file name.
    pub async fn save_upload(&self, original_name: Option<&str>, bytes: &[u8]) -> Result<PathBuf> {
        self.ensure_dir().await?;
        let extension = original_name
            .and_then(upload_extension)
            .unwrap_or(DEFAULT_UPLOAD_EXTENSION);
        let path = self.allocate(extension);
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write upload to {}", path.display()))?;
        info!("saved upload {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Remove every stored file. Runs at startup so a new server run
    /// begins with a clean session.
    pub async fn purge(&self) -> Result<usize> {
        self.remove_matching(|_| true).await
    }

    /// Remove all files except the ones still referenced by the session.
    pub async fn prune_except(&self, keep: &[&Path]) -> Result<usize> {
        self.remove_matching(|path| !keep.contains(&path)).await
    }

    async fn remove_matching(&self, mut should_remove: impl FnMut(&Path) -> bool) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to read audio directory {}", self.dir.display()))?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || !should_remove(&path) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("failed to remove {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

/// Media type for the direct audio-understanding path.
pub fn mime_type(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("ogg") => "audio/ogg",
        Some("mp4") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn upload_extension(name: &str) -> Option<&'static str> {
    let ext = extension_of(Path::new(name))?;
    UPLOAD_EXTENSIONS.iter().find(|&&e| e == ext).copied()
}
