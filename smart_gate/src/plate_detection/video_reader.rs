use log::{info, warn};
use opencv::prelude::*;
use opencv::videoio::{VideoCapture, CAP_ANY};

use super::FrameSource;
use crate::error::VisionError;

/// Live camera. The device is only held between `open` and `release`, so a
/// paused pipeline leaves the camera free for other processes.
pub struct CameraReader {
    index: i32,
    capture: Option<VideoCapture>,
}

impl CameraReader {
    pub fn new(index: i32) -> Self {
        Self {
            index,
            capture: None,
        }
    }
}

impl FrameSource for CameraReader {
    type Frame = Mat;

    fn open(&mut self) -> Result<(), VisionError> {
        if self.capture.is_some() {
            return Ok(());
        }
        let capture = VideoCapture::new(self.index, CAP_ANY)
            .map_err(|err| VisionError::Capture(err.to_string()))?;
        let opened = capture
            .is_opened()
            .map_err(|err| VisionError::Capture(err.to_string()))?;
        if !opened {
            return Err(VisionError::Capture(format!(
                "camera {} could not be opened",
                self.index
            )));
        }
        info!("Camera {} opened", self.index);
        self.capture = Some(capture);
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Mat> {
        let capture = self.capture.as_mut()?;
        let mut image = Mat::default();
        match capture.read(&mut image) {
            Ok(true) if !image.empty() => Some(image),
            Ok(_) => None,
            Err(err) => {
                warn!("Failed to read from camera {}: {err}", self.index);
                None
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(err) = capture.release() {
                warn!("Failed to release camera {}: {err}", self.index);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.capture.is_some()
    }
}

impl Drop for CameraReader {
    fn drop(&mut self) {
        self.release();
    }
}
