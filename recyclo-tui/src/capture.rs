use std::path::PathBuf;

use recyclo_core::{
    model::Frame,
    ports::{CaptureError, CapturePort, FrameStream},
};
use tracing::debug;

/// Capture source that reads a still image from disk.
pub(crate) struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub(crate) fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl CapturePort for FileCapture {
    fn start(&self) -> Result<Box<dyn FrameStream>, CaptureError> {
        if !self.path.is_file() {
            return Err(CaptureError::Unavailable(format!(
                "{} is not a readable file",
                self.path.display()
            )));
        }
        Ok(Box::new(FileStream {
            path: self.path.clone(),
        }))
    }
}

struct FileStream {
    path: PathBuf,
}

impl FrameStream for FileStream {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let image = image::open(&self.path)
            .map_err(|err| CaptureError::Frame(format!("{}: {err}", self.path.display())))?
            .to_rgb8();
        Ok(Frame::new(image.width(), image.height(), image.into_raw()))
    }

    fn stop(&mut self) {
        debug!(path = %self.path.display(), "file capture closed");
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    #[test]
    fn reads_a_png_as_rgb_frame() {
        let path = std::env::temp_dir().join(format!("recyclo-capture-{}.png", std::process::id()));
        RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]))
            .save(&path)
            .expect("writes test image");

        let mut stream = FileCapture::new(&path).start().expect("opens");
        let frame = stream.capture_frame().expect("decodes");
        stream.stop();
        std::fs::remove_file(&path).expect("cleans up");

        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.rgb.get(..3), Some(&[10, 20, 30][..]));
        assert!(frame.is_valid());
    }

    #[test]
    fn missing_file_is_unavailable() {
        let source = FileCapture::new("/nonexistent/recyclo.png");
        assert!(matches!(source.start(), Err(CaptureError::Unavailable(_))));
    }
}
