use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::error::PipelineError;

/// An audio file that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Confirm an audio file exists and has content.
///
/// A zero-length file gets one delayed recheck: the capture process
/// flushes asynchronously and the bytes may simply not have landed yet.
pub async fn validate(path: &Path, empty_recheck: Duration) -> Result<ValidatedFile, PipelineError> {
    let metadata = match fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => return Err(PipelineError::FileNotFound(path.to_path_buf())),
    };
    if metadata.len() > 0 {
        return Ok(ValidatedFile {
            path: path.to_path_buf(),
            size: metadata.len(),
        });
    }

    debug!(
        "{} is empty, rechecking in {:?}",
        path.display(),
        empty_recheck
    );
    tokio::time::sleep(empty_recheck).await;

    match fs::metadata(path).await {
        Ok(m) if m.len() > 0 => Ok(ValidatedFile {
            path: path.to_path_buf(),
            size: m.len(),
        }),
        Ok(_) => Err(PipelineError::EmptyFile(path.to_path_buf())),
        Err(_) => Err(PipelineError::FileDisappeared(path.to_path_buf())),
    }
}
