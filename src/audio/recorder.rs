use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::audio::store::AudioStore;
use crate::error::{DeviceFault, PipelineError};

/// Capture lifecycle. `Error` is only held while a device fault is
/// being cleaned up; the recorder returns to `Idle` on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Starting,
    Recording,
    Stopping,
    Error,
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// External capture binary, invoked arecord-style.
    pub capture_bin: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Cap applied when the request does not name a duration.
    pub max_duration_secs: u64,
    /// How long the process gets to flush after an interrupt.
    pub stop_grace: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    pub duration_secs: Option<u64>,
}

/// Callback invoked when the capture process reports a device fault.
pub type FaultHook = Arc<dyn Fn(DeviceFault) + Send + Sync>;

struct RecorderInner {
    state: CaptureState,
    child: Option<Child>,
    output: Option<PathBuf>,
}

impl Default for RecorderInner {
    fn default() -> Self {
        Self {
            state: CaptureState::Idle,
            child: None,
            output: None,
        }
    }
}

/// Owns the external capture process. Only this type spawns or signals
/// the capture child, and only it decides the output path.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Mutex<RecorderInner>>,
    config: RecorderConfig,
    store: AudioStore,
}

impl Recorder {
    pub fn new(config: RecorderConfig, store: AudioStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecorderInner::default())),
            config,
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    /// Spawn the capture process writing a fresh file. The fault hook
    /// fires if the process reports a device problem while recording.
    pub async fn start(
        &self,
        options: StartOptions,
        on_fault: FaultHook,
    ) -> Result<PathBuf, PipelineError> {
        let path = {
            let mut inner = self.lock();
            if inner.state != CaptureState::Idle {
                return Err(PipelineError::AlreadyRecording);
            }
            inner.state = CaptureState::Starting;
            self.store.allocate("wav")
        };

        if let Err(e) = self.store.ensure_dir().await {
            self.lock().state = CaptureState::Idle;
            return Err(PipelineError::CaptureFailed(e.to_string()));
        }

        let duration = options
            .duration_secs
            .unwrap_or(self.config.max_duration_secs)
            .min(self.config.max_duration_secs);
        let args = capture_args(&self.config, duration, &path);
        info!("starting capture: {} {}", self.config.capture_bin, args.join(" "));

        let mut child = match Command::new(&self.config.capture_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                self.lock().state = CaptureState::Idle;
                return Err(PipelineError::CaptureFailed(format!(
                    "failed to spawn {}: {}",
                    self.config.capture_bin, e
                )));
            }
        };

        let stderr = child.stderr.take();
        {
            let mut inner = self.lock();
            inner.state = CaptureState::Recording;
            inner.child = Some(child);
            inner.output = Some(path.clone());
        }

        if let Some(stderr) = stderr {
            let recorder = self.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    warn!("capture: {}", line);
                    if let Some(fault) = classify_fault(&line) {
                        recorder.handle_fault(fault, &on_fault).await;
                        break;
                    }
                }
            });
        }

        Ok(path)
    }

    /// Interrupt the capture process so it can finalize the file, wait
    /// out the grace period, then force-kill if it is still running.
    pub async fn stop(&self) -> Result<PathBuf, PipelineError> {
        let (mut child, path) = {
            let mut inner = self.lock();
            if inner.state != CaptureState::Recording {
                return Err(PipelineError::NotRecording);
            }
            inner.state = CaptureState::Stopping;
            match (inner.child.take(), inner.output.take()) {
                (Some(child), Some(path)) => (child, path),
                _ => {
                    inner.state = CaptureState::Idle;
                    return Err(PipelineError::NotRecording);
                }
            }
        };

        interrupt(&child);
        tokio::time::sleep(self.config.stop_grace).await;

        let status = match child.try_wait() {
            Ok(Some(status)) => Some(status),
            Ok(None) => {
                warn!("capture process ignored the interrupt, killing it");
                let _ = child.start_kill();
                child.wait().await.ok()
            }
            Err(e) => {
                warn!("failed to reap capture process: {}", e);
                None
            }
        };
        self.lock().state = CaptureState::Idle;

        // A non-zero exit with nothing written means the capture never
        // produced audio; keep anything that did get flushed.
        let crashed = status.map(|s| !s.success()).unwrap_or(true);
        if crashed {
            if let Ok(metadata) = fs::metadata(&path).await {
                if metadata.len() == 0 {
                    let _ = fs::remove_file(&path).await;
                    info!("removed empty capture {}", path.display());
                }
            }
        }

        info!("capture stopped: {}", path.display());
        Ok(path)
    }

    async fn handle_fault(&self, fault: DeviceFault, on_fault: &FaultHook) {
        let (child, output) = {
            let mut inner = self.lock();
            // A fault line racing a clean stop is already handled there.
            if inner.state != CaptureState::Recording {
                return;
            }
            inner.state = CaptureState::Error;
            (inner.child.take(), inner.output.take())
        };

        if let Some(mut child) = child {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        if let Some(path) = output {
            let _ = fs::remove_file(&path).await;
            warn!("removed partial capture {} after device fault", path.display());
        }

        on_fault(fault);
        self.lock().state = CaptureState::Idle;
    }
}

fn capture_args(config: &RecorderConfig, duration_secs: u64, path: &std::path::Path) -> Vec<String> {
    vec![
        "-q".to_string(),
        "-f".to_string(),
        "S16_LE".to_string(),
        "-r".to_string(),
        config.sample_rate.to_string(),
        "-c".to_string(),
        config.channels.to_string(),
        "-d".to_string(),
        duration_secs.to_string(),
        path.display().to_string(),
    ]
}

/// Map a capture diagnostic line to a fault category. Lines that do not
/// look like device problems are only logged.
fn classify_fault(line: &str) -> Option<DeviceFault> {
    let line = line.to_ascii_lowercase();
    if line.contains("no such device") || line.contains("device not found") {
        return Some(DeviceFault::NotFound);
    }
    if line.contains("permission denied") {
        return Some(DeviceFault::PermissionDenied);
    }
    if line.contains("input/output error")
        || line.contains("device or resource busy")
        || line.contains("broken pipe")
    {
        return Some(DeviceFault::Generic);
    }
    None
}

#[cfg(unix)]
fn interrupt(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else { return };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        warn!("failed to interrupt capture process {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) {
    // No interrupt signal here; stop() falls through to a hard kill
    // after the grace period.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config() -> RecorderConfig {
        RecorderConfig {
            capture_bin: "arecord".to_string(),
            sample_rate: 16000,
            channels: 1,
            max_duration_secs: 60,
            stop_grace: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_capture_args_follow_arecord_conventions() {
        let args = capture_args(&config(), 30, Path::new("audio/rec-1.wav"));
        assert_eq!(
            args,
            vec![
                "-q", "-f", "S16_LE", "-r", "16000", "-c", "1", "-d", "30", "audio/rec-1.wav"
            ]
        );
    }

    #[test]
    fn test_fault_lines_are_categorized() {
        assert_eq!(
            classify_fault("arecord: main:830: audio open error: No such device"),
            Some(DeviceFault::NotFound)
        );
        assert_eq!(
            classify_fault("ALSA lib pcm.c: Permission denied"),
            Some(DeviceFault::PermissionDenied)
        );
        assert_eq!(
            classify_fault("read error: Input/output error"),
            Some(DeviceFault::Generic)
        );
        assert_eq!(
            classify_fault("arecord: Device or resource busy"),
            Some(DeviceFault::Generic)
        );
        assert_eq!(classify_fault("Recording WAVE 'rec.wav'"), None);
    }
}
