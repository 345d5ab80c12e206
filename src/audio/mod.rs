pub mod recorder;
pub mod store;
pub mod validate;

pub use recorder::{CaptureState, FaultHook, Recorder, RecorderConfig, StartOptions};
pub use store::{mime_type, AudioStore};
pub use validate::{validate, ValidatedFile};
