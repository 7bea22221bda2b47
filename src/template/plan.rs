//! Template plan precomputation for ZNCC scoring.

use crate::image::ImageView;
use crate::util::{SlotWatchError, SlotWatchResult};

/// Precomputed statistics and zero-mean buffer for template matching.
#[derive(Clone, Debug)]
pub struct TemplatePlan {
    width: usize,
    height: usize,
    var_t: f32,
    zero_mean: Vec<f32>,
}

impl TemplatePlan {
    /// Builds a plan from a template view.
    ///
    /// Flat templates (zero variance) are rejected because their correlation
    /// with anything is undefined.
    pub fn from_view(tpl: ImageView<'_, u8>) -> SlotWatchResult<Self> {
        let width = tpl.width();
        let height = tpl.height();
        let count = width
            .checked_mul(height)
            .ok_or(SlotWatchError::InvalidDimensions { width, height })?;

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for y in 0..height {
            let row = template_row(tpl, y)?;
            for &value in row {
                let v = value as f64;
                sum += v;
                sum_sq += v * v;
            }
        }

        let count_f = count as f64;
        let mean_f64 = sum / count_f;
        let variance = sum_sq / count_f - mean_f64 * mean_f64;
        if variance <= 1e-8 {
            return Err(SlotWatchError::DegenerateTemplate {
                reason: "zero variance",
            });
        }

        let mut zero_mean = Vec::with_capacity(count);
        let mut var_t = 0.0f64;
        for y in 0..height {
            let row = template_row(tpl, y)?;
            for &value in row {
                let centered = value as f64 - mean_f64;
                var_t += centered * centered;
                zero_mean.push(centered as f32);
            }
        }

        Ok(Self {
            width,
            height,
            var_t: var_t as f32,
            zero_mean,
        })
    }

    /// Returns the template width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the template height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Sum of squared deviations from the mean.
    pub fn var_t(&self) -> f32 {
        self.var_t
    }

    /// Returns the zero-mean template buffer in row-major order.
    pub fn zero_mean(&self) -> &[f32] {
        &self.zero_mean
    }
}

fn template_row<'a>(tpl: ImageView<'a, u8>, y: usize) -> SlotWatchResult<&'a [u8]> {
    tpl.row(y).ok_or_else(|| {
        let needed = y
            .checked_mul(tpl.stride())
            .and_then(|v| v.checked_add(tpl.width()))
            .unwrap_or(usize::MAX);
        SlotWatchError::BufferTooSmall {
            needed,
            got: tpl.as_slice().len(),
        }
    })
}
