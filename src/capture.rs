//! Camera boundary: frame acquisition trait, frame handle, capture errors.
//! Real webcams live outside this crate; the replay camera drives tests and the CLI.

use tokio::time::Instant;

/// One captured frame. Pixel layout is owned by the camera/model pair.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub captured_at: Instant,
}

impl Frame {
    pub fn empty(seq: u64) -> Self {
        Self {
            seq,
            width: 0,
            height: 0,
            data: Vec::new(),
            captured_at: Instant::now(),
        }
    }
}

/// Platform-agnostic camera trait.
pub trait Camera: Send + Sync {
    /// Open and start the device. Failure aborts session start.
    fn start(&self) -> Result<(), CaptureError>;

    /// Grab the current frame.
    fn capture_frame(&self) -> Result<Frame, CaptureError>;
}

#[derive(Debug)]
pub enum CaptureError {
    DeviceUnavailable(String),
    CaptureFailed(String),
    /// Finite sources (replay files) have no more frames.
    StreamEnded,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::DeviceUnavailable(msg) => write!(f, "camera unavailable: {msg}"),
            CaptureError::CaptureFailed(msg) => write!(f, "frame capture failed: {msg}"),
            CaptureError::StreamEnded => write!(f, "frame stream ended"),
        }
    }
}

impl std::error::Error for CaptureError {}
