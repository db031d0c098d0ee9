pub mod buffer;
pub mod coordinator;
pub mod devices;
pub mod errors;
pub mod ffmpeg;
pub mod media;
pub mod sampler;
pub mod state;
pub mod types;

pub use coordinator::{Acquisition, CaptureConfig, CaptureLoop, CaptureStatus};
pub use errors::{CaptureError, MediaError};
pub use media::{MediaDevices, MediaSession, MediaStream};
