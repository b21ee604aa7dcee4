//! Exclusive ownership of a capture stream.

use tracing::debug;

use crate::model::Frame;
use crate::ports::{CaptureError, CapturePort, FrameStream};

/// An open stream that is stopped exactly once, on whichever path the viewer leaves by.
pub struct ActiveCapture {
    stream: Option<Box<dyn FrameStream>>,
}

impl ActiveCapture {
    /// Open a stream from `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`CaptureError`] when the source cannot be opened.
    pub fn start(source: &dyn CapturePort) -> Result<Self, CaptureError> {
        let stream = source.start()?;
        debug!("capture stream started");
        Ok(Self {
            stream: Some(stream),
        })
    }

    /// Grab a still frame from the open stream.
    ///
    /// # Errors
    ///
    /// Returns a [`CaptureError`] when the stream is already stopped or the grab fails.
    pub fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        self.stream
            .as_mut()
            .ok_or_else(|| CaptureError::Unavailable("stream already stopped".to_owned()))?
            .capture_frame()
    }

    /// Stop the stream now instead of at drop.
    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("capture stream stopped");
        }
    }
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        self.release();
    }
}
