//! Collaborator seams of the detection loop.
//!
//! Screen grabbing, speech output and debug rendering live outside this
//! crate. The loop only sees these traits; closures implement them too.

use crate::calibration::CalibrationOffset;
use crate::image::OwnedImage;
use thiserror::Error;

/// Integer rectangle handed to a capture source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// Failure to grab one region. Never fatal to the loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The region does not lie inside the source.
    #[error("region {0:?} is outside the capture source")]
    OutOfBounds(CaptureRect),
    /// The source could not produce a frame.
    #[error("capture source unavailable: {0}")]
    Unavailable(String),
}

/// Produces a grayscale image of a screen region.
pub trait Capture: Send {
    fn capture(&mut self, rect: CaptureRect) -> Result<OwnedImage, CaptureError>;
}

impl<F> Capture for F
where
    F: FnMut(CaptureRect) -> Result<OwnedImage, CaptureError> + Send,
{
    fn capture(&mut self, rect: CaptureRect) -> Result<OwnedImage, CaptureError> {
        self(rect)
    }
}

/// Announcer failure; logged by the loop, never propagated.
#[derive(Debug, Error)]
#[error("announcer failed: {0}")]
pub struct AnnounceError(pub String);

/// Receives short texts such as `"Slot 3: Empty"`.
pub trait Announcer: Send {
    fn announce(&mut self, text: &str) -> Result<(), AnnounceError>;
}

impl<F> Announcer for F
where
    F: FnMut(&str) -> Result<(), AnnounceError> + Send,
{
    fn announce(&mut self, text: &str) -> Result<(), AnnounceError> {
        self(text)
    }
}

/// Per-slot part of a debug annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotAnnotation {
    /// Accepted label, `None` when empty.
    pub label: Option<String>,
    /// Best raw score, when any reference was scored.
    pub score: Option<f32>,
    /// False when the capture failed this tick.
    pub captured: bool,
}

/// Observational snapshot of one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct DebugFrame {
    pub slots: Vec<SlotAnnotation>,
    pub threshold: f32,
    pub offset: CalibrationOffset,
}

/// Renders debug annotations. Must not feed back into detection.
pub trait DebugSink: Send {
    fn annotate(&mut self, frame: &DebugFrame);
}

/// Capture source that crops regions out of one still frame.
///
/// The frame's origin is screen coordinate (0, 0).
#[derive(Clone, Debug)]
pub struct FrameCapture {
    frame: OwnedImage,
}

impl FrameCapture {
    pub fn new(frame: OwnedImage) -> Self {
        Self { frame }
    }

    /// Replaces the frame used by later captures.
    pub fn set_frame(&mut self, frame: OwnedImage) {
        self.frame = frame;
    }

    /// Crops `rect` out of `frame`.
    pub fn crop(frame: &OwnedImage, rect: CaptureRect) -> Result<OwnedImage, CaptureError> {
        let (Ok(x), Ok(y)) = (usize::try_from(rect.left), usize::try_from(rect.top)) else {
            return Err(CaptureError::OutOfBounds(rect));
        };
        frame
            .view()
            .roi(x, y, rect.width as usize, rect.height as usize)
            .and_then(OwnedImage::from_view)
            .map_err(|_| CaptureError::OutOfBounds(rect))
    }
}

impl Capture for FrameCapture {
    fn capture(&mut self, rect: CaptureRect) -> Result<OwnedImage, CaptureError> {
        Self::crop(&self.frame, rect)
    }
}

#[cfg(test)]
mod tests {
    use super::{Capture, CaptureError, CaptureRect, FrameCapture};
    use crate::image::OwnedImage;

    #[test]
    fn frame_capture_crops_inside_and_rejects_outside() {
        let data: Vec<u8> = (0u8..16).collect();
        let mut capture = FrameCapture::new(OwnedImage::new(data, 4, 4).unwrap());
        let rect = CaptureRect {
            left: 1,
            top: 2,
            width: 2,
            height: 2,
        };
        let crop = capture.capture(rect).unwrap();
        assert_eq!(crop.data(), &[9u8, 10, 13, 14]);

        let outside = CaptureRect { left: -1, ..rect };
        assert!(matches!(capture.capture(outside), Err(CaptureError::OutOfBounds(_))));
        let too_wide = CaptureRect { width: 4, ..rect };
        assert!(capture.capture(too_wide).is_err());
    }
}
