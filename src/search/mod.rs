//! Scoring live captures against prepared references.
//!
//! Scores are zero-mean normalized cross-correlation in `[-1, 1]`. A live
//! image larger than the reference is scanned over every placement and the
//! best placement counts; equal sizes give a single placement.

use crate::bank::ReferenceBank;
use crate::kernel::{Kernel, ZnccScalar};
use crate::template::TemplatePlan;
use crate::util::{SlotWatchError, SlotWatchResult};
use crate::ImageView;

/// Default confidence floor below which a slot is considered empty.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Windows whose summed squared deviation is at or below this are flat.
pub const MIN_WINDOW_VARIANCE: f32 = 1.0;

/// Scores `live` against one prepared reference.
///
/// Returns -1.0 when the reference does not fit inside the live image and
/// 0.0 when every candidate window of the live image is flat.
pub fn score(live: ImageView<'_, u8>, reference: &TemplatePlan) -> f32 {
    if live.width() < reference.width() || live.height() < reference.height() {
        return -1.0;
    }
    match ZnccScalar::scan_best(live, reference, MIN_WINDOW_VARIANCE) {
        Some(best) => best.score.clamp(-1.0, 1.0),
        None => 0.0,
    }
}

/// Outcome of matching one slot.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotMatch {
    /// Label of the accepted reference, `None` when the slot is empty.
    pub label: Option<String>,
    /// Best candidate and its score, even when below the threshold.
    pub best: Option<(String, f32)>,
}

impl SlotMatch {
    /// An empty result with no candidate at all.
    pub fn empty() -> Self {
        Self {
            label: None,
            best: None,
        }
    }

    /// Best raw score, if any reference was scored.
    pub fn score(&self) -> Option<f32> {
        self.best.as_ref().map(|(_, score)| *score)
    }
}

/// Threshold-gated best-candidate selection.
#[derive(Clone, Copy, Debug)]
pub struct Matcher {
    threshold: f32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Matcher {
    /// Creates a matcher; `threshold` must lie in `[-1, 1]`.
    pub fn new(threshold: f32) -> SlotWatchResult<Self> {
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(SlotWatchError::Config(format!(
                "confidence threshold {threshold} is outside [-1, 1]"
            )));
        }
        Ok(Self { threshold })
    }

    /// Confidence floor in use.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Scores `live` against every reference in insertion order.
    pub fn scores(&self, live: ImageView<'_, u8>, bank: &ReferenceBank) -> Vec<(String, f32)> {
        bank.iter()
            .map(|reference| (reference.name().to_string(), score(live, reference.plan())))
            .collect()
    }

    /// Picks the highest scoring reference; ties keep the earlier one.
    ///
    /// A best score below the threshold yields no label.
    pub fn best_match(&self, live: ImageView<'_, u8>, bank: &ReferenceBank) -> SlotMatch {
        let mut best: Option<(&str, f32)> = None;
        for reference in bank.iter() {
            let value = score(live, reference.plan());
            if best.map_or(true, |(_, current)| value > current) {
                best = Some((reference.name(), value));
            }
        }

        let Some((name, value)) = best else {
            return SlotMatch::empty();
        };
        let label = (value >= self.threshold).then(|| name.to_string());
        SlotMatch {
            label,
            best: Some((name.to_string(), value)),
        }
    }
}
