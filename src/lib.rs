pub mod answer;
pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod locale;
pub mod params;
pub mod pipeline;
pub mod session;
pub mod stt;

pub use answer::{AnswerGenerator, AnswerModel, AnswerRequest, AnswerResult, GenerativeClient};
pub use audio::{AudioStore, Recorder, RecorderConfig};
pub use config::Config;
pub use error::{DeviceFault, PipelineError};
pub use events::{ChannelPublisher, EventPublisher, PipelineEvent};
pub use http::{create_router, AppState};
pub use params::{RawParams, RequestParams, SpeechSpeed};
pub use pipeline::{Pipeline, PipelineTimings};
pub use session::{SessionSnapshot, SessionStore};
pub use stt::{SpeechClient, SpeechToText, Transcriber};
