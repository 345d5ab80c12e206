use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub speech: SpeechConfig,
    pub answer: AnswerConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Directory holding captured and uploaded audio files.
    pub dir: String,
    /// External capture binary, invoked arecord-style.
    pub capture_bin: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Safety cap on a single capture, in seconds.
    pub max_duration_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Base URL of the speech recognition service.
    pub base_url: String,
    pub api_key: String,
    /// Default answer language code (`en` or `vi`).
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Base URL of the generative answer service.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How long to let the capture process flush after an interrupt.
    pub stop_grace_ms: u64,
    /// Delay before rechecking a zero-length audio file.
    pub empty_recheck_ms: u64,
    /// How long a cancellation stays armed before it clears itself.
    pub cancel_rearm_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            audio: AudioConfig::default(),
            speech: SpeechConfig::default(),
            answer: AnswerConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-qa".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3456,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            dir: "audio".to_string(),
            capture_bin: "arecord".to_string(),
            sample_rate: 16000,
            channels: 1,
            max_duration_secs: 60,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://speech.googleapis.com".to_string(),
            api_key: String::new(),
            language: "en".to_string(),
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: String::new(),
            model: "gemini-1.5-flash".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: 1000,
            empty_recheck_ms: 2000,
            cancel_rearm_ms: 1500,
        }
    }
}

impl Config {
    /// Load configuration from a file, environment variables and built-in
    /// defaults. The file is optional; `VOICE_QA_SPEECH__API_KEY`-style
    /// variables override it.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICE_QA").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
