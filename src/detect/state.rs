//! Per-slot debounce state.

use std::fmt;

/// A label transition on one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotEvent {
    /// Zero-based slot index.
    pub slot: usize,
    /// Previous label, empty string for an empty slot.
    pub old: String,
    /// New label, empty string for an empty slot.
    pub new: String,
}

impl fmt::Display for SlotEvent {
    /// Announcement text, slots numbered from 1.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.new.is_empty() { "Empty" } else { &self.new };
        write!(f, "Slot {}: {}", self.slot + 1, label)
    }
}

/// Last announced label for every slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionState {
    last: Vec<String>,
}

impl DetectionState {
    /// All slots start empty.
    pub fn new(slots: usize) -> Self {
        Self {
            last: vec![String::new(); slots],
        }
    }

    /// Last announced label of `slot` (empty when nothing is there).
    pub fn last(&self, slot: usize) -> &str {
        self.last.get(slot).map_or("", String::as_str)
    }

    /// Records the detection for `slot`, returning an event only on change.
    pub fn observe(&mut self, slot: usize, label: Option<&str>) -> Option<SlotEvent> {
        let current = self.last.get_mut(slot)?;
        let label = label.unwrap_or("");
        if current == label {
            return None;
        }
        let old = std::mem::replace(current, label.to_string());
        Some(SlotEvent {
            slot,
            old,
            new: label.to_string(),
        })
    }

    /// Number of tracked slots.
    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
