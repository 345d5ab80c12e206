// Explicit transcription retries: strategy rotation, the simple-settings
// fallback and the preconditions for retrying at all.

use anyhow::Result;
use std::path::Path;
use tempfile::TempDir;
use voice_qa::error::PipelineError;
use voice_qa::events::PipelineEvent;
use voice_qa::params::{RequestParams, SpeechSpeed};

mod support;
use support::{build_pipeline, wait_for_events, MockModel, MockSpeech, RecordingPublisher};

fn params() -> RequestParams {
    RequestParams {
        language: "en".to_string(),
        speech_language: "en-US".to_string(),
        speech_speed: SpeechSpeed::Normal,
        question_context: None,
        custom_context: None,
        is_follow_up: false,
        use_streaming: false,
        audio_file: None,
    }
}

fn params_for(file: &Path) -> RequestParams {
    RequestParams {
        audio_file: Some(file.to_path_buf()),
        ..params()
    }
}

fn update_count(events: &[PipelineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Update { .. }))
        .count()
}

#[tokio::test]
async fn test_retries_rotate_through_the_strategies_and_wrap() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("rec-1.wav");
    support::write_wav(&path)?;

    let speech = MockSpeech::new();
    let publisher = RecordingPublisher::new();
    let pipeline = build_pipeline(speech.clone(), MockModel::new(), publisher.clone(), temp_dir.path());

    for round in 1..=4 {
        speech.push_text("a recognized question");
        pipeline.process_retry(params_for(&path))?;
        wait_for_events(&publisher, |events| update_count(events) == round).await;
    }

    let configs = speech.call_configs();
    let models: Vec<_> = configs.iter().map(|c| c.model.as_deref()).collect();
    assert_eq!(
        models,
        vec![
            Some("latest_long"),
            Some("video"),
            Some("command_and_search"),
            Some("latest_long")
        ]
    );
    assert!(configs[0].use_enhanced);
    assert!(configs[1].use_enhanced);
    assert!(!configs[2].use_enhanced);
    assert_eq!(pipeline.session().retry_count(), 4);
    Ok(())
}

#[tokio::test]
async fn test_retrying_a_different_file_restarts_the_rotation() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let first = temp_dir.path().join("rec-2.wav");
    let second = temp_dir.path().join("rec-3.wav");
    support::write_wav(&first)?;
    support::write_wav(&second)?;

    let speech = MockSpeech::new();
    let publisher = RecordingPublisher::new();
    let pipeline = build_pipeline(speech.clone(), MockModel::new(), publisher.clone(), temp_dir.path());

    speech.push_text("q");
    pipeline.process_retry(params_for(&first))?;
    wait_for_events(&publisher, |events| update_count(events) == 1).await;
    speech.push_text("q");
    pipeline.process_retry(params_for(&first))?;
    wait_for_events(&publisher, |events| update_count(events) == 2).await;

    // New file, fresh rotation.
    speech.push_text("q");
    pipeline.process_retry(params_for(&second))?;
    wait_for_events(&publisher, |events| update_count(events) == 3).await;

    let configs = speech.call_configs();
    assert_eq!(configs[0].model.as_deref(), Some("latest_long"));
    assert_eq!(configs[1].model.as_deref(), Some("video"));
    assert_eq!(configs[2].model.as_deref(), Some("latest_long"));
    assert_eq!(pipeline.session().retry_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_retry_without_any_processed_audio_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let publisher = RecordingPublisher::new();
    let pipeline = build_pipeline(
        MockSpeech::new(),
        MockModel::new(),
        publisher.clone(),
        temp_dir.path(),
    );

    let result = pipeline.process_retry(params());
    assert!(matches!(result, Err(PipelineError::NoAudioAvailable)));
    assert!(publisher.events().is_empty(), "nothing should be emitted");
    Ok(())
}

#[tokio::test]
async fn test_failed_retry_falls_back_to_simple_settings() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("rec-4.wav");
    support::write_wav(&path)?;

    let speech = MockSpeech::new();
    speech.push_error("strategy attempt refused");
    let model = MockModel::new();
    let publisher = RecordingPublisher::new();
    let pipeline = build_pipeline(speech.clone(), model.clone(), publisher.clone(), temp_dir.path());

    pipeline.process_retry(params_for(&path))?;
    wait_for_events(&publisher, |events| update_count(events) == 1).await;

    // The strategy call failed, the simple-settings call came back
    // empty, and the failure was absorbed into the apology.
    let configs = speech.call_configs();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].model.as_deref(), Some("latest_long"));
    assert!(configs[1].simple, "second call uses simple settings");
    assert_eq!(configs[1].model, None);
    assert_eq!(model.generate_calls(), 0);

    let events = publisher.events();
    assert_eq!(support::kinds(&events), vec!["processing", "update"]);
    match &events[1] {
        PipelineEvent::Update { answer, .. } => assert!(answer.starts_with("Sorry")),
        other => panic!("expected an update event, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_retrying_a_missing_file_reports_not_found() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let missing = temp_dir.path().join("rec-gone.wav");

    let publisher = RecordingPublisher::new();
    let pipeline = build_pipeline(
        MockSpeech::new(),
        MockModel::new(),
        publisher.clone(),
        temp_dir.path(),
    );

    pipeline.process_retry(params_for(&missing))?;
    wait_for_events(&publisher, |events| {
        events.iter().any(|e| matches!(e, PipelineEvent::Error { .. }))
    })
    .await;

    let events = publisher.events();
    assert_eq!(support::kinds(&events), vec!["processing", "error"]);
    match &events[1] {
        PipelineEvent::Error { message } => assert!(message.contains("not found")),
        other => panic!("expected an error event, got {:?}", other),
    }
    Ok(())
}
