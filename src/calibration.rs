//! Live translation applied to every slot rectangle.

use std::sync::{Arc, Mutex, PoisonError};

/// Size of one adjustment step in pixels.
pub const CALIBRATION_STEP: f32 = 0.5;

/// Offset added to every base rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CalibrationOffset {
    pub dx: f32,
    pub dy: f32,
}

/// A single discrete nudge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adjustment {
    Left,
    Right,
    Up,
    Down,
}

impl Adjustment {
    fn delta(self, step: f32) -> (f32, f32) {
        match self {
            Adjustment::Left => (-step, 0.0),
            Adjustment::Right => (step, 0.0),
            Adjustment::Up => (0.0, -step),
            Adjustment::Down => (0.0, step),
        }
    }
}

/// Shared calibration accumulator.
///
/// Clones share the same offset. The lock is held only for a copy or an add,
/// so readers on other threads never stall a tick.
#[derive(Clone, Debug)]
pub struct Calibration {
    offset: Arc<Mutex<CalibrationOffset>>,
    step: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(CALIBRATION_STEP)
    }
}

impl Calibration {
    /// Starts at (0, 0) with the given step size.
    pub fn new(step: f32) -> Self {
        Self {
            offset: Arc::new(Mutex::new(CalibrationOffset::default())),
            step,
        }
    }

    /// Current `(dx, dy)`.
    pub fn offset(&self) -> CalibrationOffset {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies one step and returns the new offset.
    pub fn apply(&self, adjustment: Adjustment) -> CalibrationOffset {
        let (ddx, ddy) = adjustment.delta(self.step);
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        offset.dx += ddx;
        offset.dy += ddy;
        *offset
    }

    pub fn left(&self) -> CalibrationOffset {
        self.apply(Adjustment::Left)
    }

    pub fn right(&self) -> CalibrationOffset {
        self.apply(Adjustment::Right)
    }

    pub fn up(&self) -> CalibrationOffset {
        self.apply(Adjustment::Up)
    }

    pub fn down(&self) -> CalibrationOffset {
        self.apply(Adjustment::Down)
    }
}
