pub mod capture;
pub mod encoder;
pub mod format;
pub mod playback;

pub use capture::{CaptureDriver, MicDriver, StreamHandle};
pub use format::AudioFormat;
