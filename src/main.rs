use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use voice_qa::answer::{AnswerGenerator, GenerativeClient};
use voice_qa::audio::{AudioStore, Recorder, RecorderConfig};
use voice_qa::events::{ChannelPublisher, EventPublisher};
use voice_qa::pipeline::PipelineTimings;
use voice_qa::stt::{SpeechClient, Transcriber};
use voice_qa::{create_router, AppState, Config, Pipeline, SessionStore};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "voice-qa")]
#[command(about = "Voice question-answering pipeline server")]
struct Args {
    /// Configuration file name, without extension
    #[arg(short, long, default_value = "config/voice-qa")]
    config: String,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Audio directory: {}", cfg.audio.dir);

    let store = AudioStore::new(&cfg.audio.dir);
    store.ensure_dir().await?;
    // A fresh server run starts a fresh session: stale audio goes away.
    let purged = store.purge().await?;
    if purged > 0 {
        info!("Purged {} audio files from a previous run", purged);
    }

    let session = SessionStore::new(Duration::from_millis(cfg.pipeline.cancel_rearm_ms));
    let recorder = Recorder::new(
        RecorderConfig {
            capture_bin: cfg.audio.capture_bin.clone(),
            sample_rate: cfg.audio.sample_rate,
            channels: cfg.audio.channels,
            max_duration_secs: cfg.audio.max_duration_secs,
            stop_grace: Duration::from_millis(cfg.pipeline.stop_grace_ms),
        },
        store.clone(),
    );
    let transcriber = Arc::new(Transcriber::new(Arc::new(SpeechClient::new(
        &cfg.speech.base_url,
        &cfg.speech.api_key,
    )?)));
    let answers = Arc::new(AnswerGenerator::new(Arc::new(GenerativeClient::new(
        &cfg.answer.base_url,
        &cfg.answer.api_key,
        &cfg.answer.model,
    )?)));

    let events = Arc::new(ChannelPublisher::new(EVENT_CHANNEL_CAPACITY));
    let publisher: Arc<dyn EventPublisher> = events.clone();
    let pipeline = Pipeline::new(
        session,
        recorder,
        store,
        transcriber,
        answers,
        publisher,
        PipelineTimings {
            empty_recheck: Duration::from_millis(cfg.pipeline.empty_recheck_ms),
        },
    );
    let state = AppState::new(pipeline, events, cfg.speech.language.clone());
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
