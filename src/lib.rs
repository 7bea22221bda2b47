//! Slotwatch watches a fixed row of screen slots and announces which
//! reference image each slot currently shows.
//!
//! The crate has two halves. The [`store`] ingests a directory of reference
//! images into a compressed, persisted library. The [`detect`] loop captures
//! every slot on a fixed cadence, scores each capture against every reference
//! with zero-mean normalized cross-correlation, and announces label changes.
//! Screen capture, speech and debug rendering stay outside the crate behind
//! the traits in [`collab`].

mod trace;

pub mod bank;
pub mod calibration;
pub mod collab;
pub mod command;
pub mod config;
pub mod detect;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod search;
pub mod slots;
pub mod store;
pub mod template;
pub mod util;

pub use bank::ReferenceBank;
pub use calibration::{Adjustment, Calibration, CalibrationOffset};
pub use collab::{
    AnnounceError, Announcer, Capture, CaptureError, CaptureRect, DebugFrame, DebugSink,
    FrameCapture, SlotAnnotation,
};
pub use command::{Command, CommandSender};
pub use config::WatchConfig;
pub use detect::{DetectionLoop, DetectionState, LoopHandle, RunSummary, SlotEvent, TickReport};
pub use image::{ImageView, OwnedImage};
pub use search::{Matcher, SlotMatch, DEFAULT_THRESHOLD};
pub use slots::{SlotRegion, DEFAULT_SLOTS, SLOT_COUNT};
pub use store::{
    ingest_directory, IngestSummary, ReferenceImage, ReferenceSet, ReferenceStore,
    DEFAULT_CACHE_FILE,
};
pub use util::{SlotWatchError, SlotWatchResult};
