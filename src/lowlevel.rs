//! Low-level building blocks for custom matching pipelines.
//!
//! These expose template plans, the correlation kernel, and the store codec
//! for callers that want to score images without running the detection loop.
//! Most users should prefer [`crate::Matcher`] and [`crate::ReferenceStore`].

pub use crate::kernel::{Kernel, Placement, ZnccScalar};
pub use crate::search::{score, MIN_WINDOW_VARIANCE};
pub use crate::store::codec::{compress, decompress, validate_level};
pub use crate::template::{Template, TemplatePlan};
