#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotwatch::collab::{AnnounceError, CaptureError, CaptureRect};
use slotwatch::image::io::encode_png;
use slotwatch::{FrameCapture, OwnedImage, SlotRegion, WatchConfig};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const SLOT_W: usize = 16;
pub const SLOT_H: usize = 12;
pub const SCREEN_W: usize = 110;
pub const SCREEN_H: usize = 24;
pub const BACKGROUND: u8 = 40;

/// Left edge of slot `index` on the test screen.
pub fn slot_x(index: usize) -> usize {
    2 + 20 * index
}

pub const SLOT_Y: usize = 2;

/// Five small slots laid out on a 110x24 screen.
pub fn test_config(dir: &Path) -> WatchConfig {
    let slots = (0..5)
        .map(|i| {
            let left = slot_x(i) as f32;
            SlotRegion::new(left, SLOT_Y as f32, left + SLOT_W as f32, (SLOT_Y + SLOT_H) as f32)
        })
        .collect();
    WatchConfig {
        slots,
        capture_region: SlotRegion::new(
            slot_x(2) as f32,
            SLOT_Y as f32,
            (slot_x(2) + SLOT_W) as f32,
            (SLOT_Y + SLOT_H) as f32,
        ),
        reference_dir: dir.join("refs"),
        cache_file: dir.join("image_cache.json"),
        workers: Some(2),
        ..WatchConfig::default()
    }
}

/// Deterministic random texture of slot size.
pub fn texture(seed: u64) -> OwnedImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<u8> = (0..SLOT_W * SLOT_H).map(|_| rng.random::<u8>()).collect();
    OwnedImage::new(data, SLOT_W, SLOT_H).unwrap()
}

pub fn write_png(dir: &Path, name: &str, image: &OwnedImage) -> Vec<u8> {
    std::fs::create_dir_all(dir).unwrap();
    let bytes = encode_png(name, image).unwrap();
    std::fs::write(dir.join(format!("{name}.png")), &bytes).unwrap();
    bytes
}

/// A flat screen with nothing in any slot.
pub fn blank_screen() -> OwnedImage {
    OwnedImage::new(vec![BACKGROUND; SCREEN_W * SCREEN_H], SCREEN_W, SCREEN_H).unwrap()
}

/// Copies `patch` onto `screen` with its top-left corner at `(x0, y0)`.
pub fn paint(screen: &mut OwnedImage, patch: &OwnedImage, x0: usize, y0: usize) {
    let width = screen.width();
    let mut data = screen.data().to_vec();
    for y in 0..patch.height() {
        for x in 0..patch.width() {
            data[(y0 + y) * width + x0 + x] = patch.data()[y * patch.width() + x];
        }
    }
    *screen = OwnedImage::new(data, width, screen.height()).unwrap();
}

/// Shared screen the loop captures from.
#[derive(Clone)]
pub struct Screen(pub Arc<Mutex<OwnedImage>>);

impl Screen {
    pub fn new(frame: OwnedImage) -> Self {
        Self(Arc::new(Mutex::new(frame)))
    }

    pub fn set(&self, frame: OwnedImage) {
        *self.0.lock().unwrap() = frame;
    }

    pub fn capture(&self) -> impl FnMut(CaptureRect) -> Result<OwnedImage, CaptureError> + Send {
        let frame = Arc::clone(&self.0);
        move |rect| FrameCapture::crop(&frame.lock().unwrap(), rect)
    }
}

/// Announcer recording every text it receives.
pub fn recorder() -> (
    Arc<Mutex<Vec<String>>>,
    impl FnMut(&str) -> Result<(), AnnounceError> + Send,
) {
    let said = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&said);
    (said, move |text: &str| {
        sink.lock().unwrap().push(text.to_string());
        Ok(())
    })
}

pub fn take(said: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    std::mem::take(&mut *said.lock().unwrap())
}
