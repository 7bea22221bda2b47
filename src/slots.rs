//! Slot rectangles in absolute screen coordinates.

use crate::calibration::CalibrationOffset;
use crate::collab::CaptureRect;
use crate::util::{SlotWatchError, SlotWatchResult};
use serde::{Deserialize, Serialize};

/// Number of hotbar slots watched by default.
pub const SLOT_COUNT: usize = 5;

/// A rectangle `(left, top, right, bottom)`; right and bottom are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotRegion {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl SlotRegion {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Translates the rectangle by a calibration offset.
    pub fn offset(&self, offset: CalibrationOffset) -> Self {
        Self {
            left: self.left + offset.dx,
            top: self.top + offset.dy,
            right: self.right + offset.dx,
            bottom: self.bottom + offset.dy,
        }
    }

    /// Integer capture rectangle; every edge is truncated toward zero.
    pub fn to_capture_rect(&self) -> CaptureRect {
        let left = self.left.trunc() as i32;
        let top = self.top.trunc() as i32;
        let right = self.right.trunc() as i32;
        let bottom = self.bottom.trunc() as i32;
        CaptureRect {
            left,
            top,
            width: right.saturating_sub(left).max(0) as u32,
            height: bottom.saturating_sub(top).max(0) as u32,
        }
    }

    /// Pixel size of the rectangle before any offset.
    pub fn size(&self) -> (usize, usize) {
        let rect = self.to_capture_rect();
        (rect.width as usize, rect.height as usize)
    }

    /// Rejects empty, inverted or non-finite rectangles.
    pub fn validate(&self) -> SlotWatchResult<()> {
        let finite = [self.left, self.top, self.right, self.bottom]
            .iter()
            .all(|v| v.is_finite());
        let (width, height) = self.size();
        if !finite || width == 0 || height == 0 {
            return Err(SlotWatchError::Config(format!("degenerate slot region {self:?}")));
        }
        Ok(())
    }
}

/// Hotbar slot rectangles for a 1920x1080 layout.
pub const DEFAULT_SLOTS: [SlotRegion; SLOT_COUNT] = [
    SlotRegion::new(1514.0, 931.0, 1577.0, 975.0),
    SlotRegion::new(1595.0, 931.0, 1658.0, 975.0),
    SlotRegion::new(1677.0, 931.0, 1740.0, 975.0),
    SlotRegion::new(1759.0, 931.0, 1822.0, 975.0),
    SlotRegion::new(1840.0, 931.0, 1903.0, 975.0),
];

/// Region grabbed by the capture-reference command.
pub const DEFAULT_CAPTURE_REGION: SlotRegion = SlotRegion::new(1502.0, 931.0, 1565.0, 975.0);

/// Applies `offset` to every base rectangle.
pub fn live_regions(base: &[SlotRegion], offset: CalibrationOffset) -> Vec<SlotRegion> {
    base.iter().map(|region| region.offset(offset)).collect()
}
