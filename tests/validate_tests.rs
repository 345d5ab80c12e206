// Integration tests for audio file validation
//
// A zero-length file gets one delayed recheck before the operation is
// failed; these tests cover every outcome of that window.

use anyhow::Result;
use std::time::Duration;
use tempfile::TempDir;
use voice_qa::audio::validate;
use voice_qa::error::PipelineError;

mod support;

const RECHECK: Duration = Duration::from_millis(120);

#[tokio::test]
async fn test_valid_audio_passes_immediately() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("rec-valid.wav");
    support::write_wav(&path)?;

    let validated = validate::validate(&path, RECHECK).await?;
    assert_eq!(validated.path, path);
    assert!(validated.size > 44, "WAV fixture should be bigger than its header");
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("rec-gone.wav");

    let error = validate::validate(&path, RECHECK).await.unwrap_err();
    assert!(matches!(error, PipelineError::FileNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_empty_file_that_stays_empty_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("rec-empty.wav");
    std::fs::write(&path, b"")?;

    let error = validate::validate(&path, RECHECK).await.unwrap_err();
    assert!(matches!(error, PipelineError::EmptyFile(_)));
    Ok(())
}

#[tokio::test]
async fn test_late_flush_during_the_recheck_window_passes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("rec-late.wav");
    std::fs::write(&path, b"")?;

    // Simulate the capture process flushing mid-window.
    let writer_path = path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        let _ = support::write_wav(&writer_path);
    });

    let validated = validate::validate(&path, RECHECK).await?;
    assert!(validated.size > 0);
    Ok(())
}

#[tokio::test]
async fn test_file_deleted_during_the_recheck_window_is_reported() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("rec-vanish.wav");
    std::fs::write(&path, b"")?;

    let remover_path = path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        let _ = std::fs::remove_file(&remover_path);
    });

    let error = validate::validate(&path, RECHECK).await.unwrap_err();
    assert!(matches!(error, PipelineError::FileDisappeared(_)));
    Ok(())
}
