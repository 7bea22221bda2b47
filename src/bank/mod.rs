//! Precomputed reference assets for per-tick matching.
//!
//! Preparing a bank decompresses, decodes and resizes every reference of one
//! [`ReferenceSet`] generation and builds its [`TemplatePlan`]. This is done
//! once per generation, not once per tick; the bank remembers which snapshot
//! it was built from so callers can tell when a swap happened.

use crate::image::io::{decode_gray, resize_gray};
use crate::image::OwnedImage;
use crate::store::{ReferenceImage, ReferenceSet};
use crate::template::{Template, TemplatePlan};
use crate::trace::{trace_event, trace_warn};
use crate::util::{SlotWatchError, SlotWatchResult};
use rayon::prelude::*;
use std::sync::Arc;

/// One reference ready for scoring.
#[derive(Clone, Debug)]
pub struct PreparedReference {
    name: String,
    plan: TemplatePlan,
}

impl PreparedReference {
    /// Builds a prepared reference from a decoded grayscale image.
    pub fn from_image(name: impl Into<String>, img: OwnedImage) -> SlotWatchResult<Self> {
        let plan = Template::from_image(img).plan()?;
        Ok(Self {
            name: name.into(),
            plan,
        })
    }

    /// Label of the reference.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Correlation plan of the reference.
    pub fn plan(&self) -> &TemplatePlan {
        &self.plan
    }
}

/// Insertion-ordered prepared references of one store generation.
#[derive(Debug, Default)]
pub struct ReferenceBank {
    refs: Vec<PreparedReference>,
    skipped: usize,
    source: Option<Arc<ReferenceSet>>,
}

impl ReferenceBank {
    /// Prepares every reference of `set` at `width` x `height`.
    ///
    /// References that fail to inflate, decode, or are flat are logged and
    /// left out; the order of the survivors is the set's insertion order.
    pub fn prepare(set: &Arc<ReferenceSet>, width: usize, height: usize) -> Self {
        let images: Vec<&ReferenceImage> = set.iter().collect();
        let prepared: Vec<SlotWatchResult<PreparedReference>> = images
            .par_iter()
            .map(|image| prepare_one(image, width, height))
            .collect();

        let mut refs = Vec::with_capacity(prepared.len());
        let mut skipped = 0usize;
        for (image, result) in images.iter().zip(prepared) {
            match result {
                Ok(prepared) => refs.push(prepared),
                Err(err) => {
                    trace_warn!(name = %image.name(), error = %err, "reference excluded from matching");
                    skipped += 1;
                }
            }
        }
        trace_event!("bank_prepared", references = refs.len(), skipped = skipped);

        Self {
            refs,
            skipped,
            source: Some(Arc::clone(set)),
        }
    }

    /// Builds a bank directly from prepared references (keeps their order).
    pub fn from_prepared(refs: Vec<PreparedReference>) -> Self {
        Self {
            refs,
            skipped: 0,
            source: None,
        }
    }

    /// True when this bank was prepared from exactly `set`.
    pub fn is_built_from(&self, set: &Arc<ReferenceSet>) -> bool {
        self.source
            .as_ref()
            .is_some_and(|source| Arc::ptr_eq(source, set))
    }

    /// Prepared references in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, PreparedReference> {
        self.refs.iter()
    }

    /// Number of usable references.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// True when no reference is usable.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Number of references left out during preparation.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

fn prepare_one(
    image: &ReferenceImage,
    width: usize,
    height: usize,
) -> SlotWatchResult<PreparedReference> {
    let bytes = image.decompress()?;
    let decoded = decode_gray(image.name(), &bytes)?;
    let resized = resize_gray(&decoded, width, height)?;
    PreparedReference::from_image(image.name(), resized).map_err(|err| match err {
        SlotWatchError::DegenerateTemplate { reason } => SlotWatchError::Decode {
            name: image.name().to_string(),
            reason: format!("unusable as template: {reason}"),
        },
        other => other,
    })
}
