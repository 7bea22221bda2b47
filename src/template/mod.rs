//! Template storage and planning utilities.

use crate::image::{ImageView, OwnedImage};
use crate::util::SlotWatchResult;

mod plan;

pub use plan::TemplatePlan;

/// Owned template image in contiguous grayscale format.
#[derive(Clone, Debug)]
pub struct Template {
    img: OwnedImage,
}

impl Template {
    /// Creates a template from a contiguous grayscale buffer.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> SlotWatchResult<Self> {
        let img = OwnedImage::new(data, width, height)?;
        Ok(Self { img })
    }

    /// Wraps an already decoded image.
    pub fn from_image(img: OwnedImage) -> Self {
        Self { img }
    }

    /// Returns a borrowed view of the template data.
    pub fn view(&self) -> ImageView<'_, u8> {
        self.img.view()
    }

    /// Precomputes the correlation plan for this template.
    pub fn plan(&self) -> SlotWatchResult<TemplatePlan> {
        TemplatePlan::from_view(self.view())
    }
}
