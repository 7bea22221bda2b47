mod common;

use common::{
    blank_screen, paint, recorder, take, test_config, texture, write_png, Screen, SLOT_Y,
};
use slotwatch::{Command, DetectionLoop, ReferenceStore, WatchConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PICKAXE: u64 = 11;
const RIFLE: u64 = 22;

fn ingested_store(config: &WatchConfig) -> Arc<ReferenceStore> {
    write_png(&config.reference_dir, "pickaxe", &texture(PICKAXE));
    write_png(&config.reference_dir, "rifle", &texture(RIFLE));
    let store = ReferenceStore::open(&config.cache_file, 6).unwrap();
    store.ingest(&config.reference_dir, None).unwrap();
    Arc::new(store)
}

fn hotbar(items: &[(usize, u64)]) -> slotwatch::OwnedImage {
    let mut screen = blank_screen();
    for &(slot, seed) in items {
        paint(&mut screen, &texture(seed), common::slot_x(slot), SLOT_Y);
    }
    screen
}

fn setup(dir: &Path) -> (WatchConfig, Arc<ReferenceStore>) {
    let config = test_config(dir);
    let store = ingested_store(&config);
    (config, store)
}

#[test]
fn exact_match_is_announced_once() {
    let tmp = tempfile::tempdir().unwrap();
    let (config, store) = setup(tmp.path());
    // Slot 2 shows noise that matches nothing.
    let screen = Screen::new(hotbar(&[(0, PICKAXE), (1, 99), (2, RIFLE)]));
    let (said, announcer) = recorder();
    let mut detection = DetectionLoop::new(config, store, screen.capture(), announcer).unwrap();

    let report = detection.tick();
    assert_eq!(report.events.len(), 2);
    assert_eq!(take(&said), vec!["Slot 1: pickaxe", "Slot 3: rifle"]);
    assert_eq!(detection.state().last(0), "pickaxe");
    assert_eq!(detection.state().last(1), "");

    for _ in 0..10 {
        assert!(detection.tick().events.is_empty());
    }
    assert!(take(&said).is_empty());

    screen.set(hotbar(&[(1, 99), (2, RIFLE)]));
    detection.tick();
    assert_eq!(take(&said), vec!["Slot 1: Empty"]);
}

#[test]
fn items_moving_between_slots_are_tracked() {
    let tmp = tempfile::tempdir().unwrap();
    let (config, store) = setup(tmp.path());
    let screen = Screen::new(hotbar(&[(0, PICKAXE)]));
    let (said, announcer) = recorder();
    let mut detection = DetectionLoop::new(config, store, screen.capture(), announcer).unwrap();

    detection.tick();
    screen.set(hotbar(&[(4, PICKAXE), (0, RIFLE)]));
    detection.tick();
    assert_eq!(
        take(&said),
        vec!["Slot 1: pickaxe", "Slot 1: rifle", "Slot 5: pickaxe"]
    );
}

#[test]
fn scores_below_threshold_leave_the_slot_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let (config, store) = setup(tmp.path());
    // An inverted pickaxe correlates at -1 with the pickaxe reference.
    let inverted = texture(PICKAXE);
    let inverted = slotwatch::OwnedImage::new(
        inverted.data().iter().map(|v| 255 - v).collect(),
        inverted.width(),
        inverted.height(),
    )
    .unwrap();
    let mut frame = blank_screen();
    paint(&mut frame, &inverted, common::slot_x(1), SLOT_Y);
    let screen = Screen::new(frame);
    let (said, announcer) = recorder();
    let mut detection = DetectionLoop::new(config, store, screen.capture(), announcer).unwrap();

    assert!(detection.tick().events.is_empty());
    assert!(take(&said).is_empty());
    assert_eq!(detection.state().last(1), "");
}

#[test]
fn calibration_shifts_every_capture() {
    let tmp = tempfile::tempdir().unwrap();
    let (config, store) = setup(tmp.path());
    // The game draws one pixel to the right of the configured slot.
    let mut frame = blank_screen();
    paint(&mut frame, &texture(PICKAXE), common::slot_x(0) + 1, SLOT_Y);
    let screen = Screen::new(frame);
    let (said, announcer) = recorder();
    let mut detection = DetectionLoop::new(config, store, screen.capture(), announcer).unwrap();
    let commands = detection.commands();

    assert!(detection.tick().events.is_empty());

    for command in [
        Command::AdjustRight,
        Command::AdjustRight,
        Command::AdjustRight,
        Command::AdjustDown,
    ] {
        commands.send(command);
    }
    // Commands are drained after matching, so this tick still uses the old offset.
    assert!(detection.tick().events.is_empty());
    let offset = detection.calibration().offset();
    assert_eq!((offset.dx, offset.dy), (1.5, 0.5));

    detection.tick();
    assert_eq!(take(&said), vec!["Slot 1: pickaxe"]);
}

#[test]
fn reload_picks_up_new_reference_files() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    write_png(&config.reference_dir, "pickaxe", &texture(PICKAXE));
    let store = Arc::new(ReferenceStore::open(&config.cache_file, 6).unwrap());
    let screen = Screen::new(hotbar(&[(3, PICKAXE)]));
    let (said, announcer) = recorder();
    let mut detection =
        DetectionLoop::new(config, Arc::clone(&store), screen.capture(), announcer).unwrap();

    assert!(detection.tick().events.is_empty());
    detection.commands().send(Command::ReloadReferences);
    detection.tick();
    detection.wait_for_reingest();
    assert_eq!(detection.completed_reingests(), 1);
    assert_eq!(store.len(), 1);

    detection.tick();
    assert_eq!(take(&said), vec!["Slot 4: pickaxe"]);
}

#[test]
fn captured_reference_is_saved_and_matched() {
    let tmp = tempfile::tempdir().unwrap();
    let (config, store) = setup(tmp.path());
    let reference_dir = config.reference_dir.clone();
    let cache_file = config.cache_file.clone();
    // The capture region covers slot 3.
    let screen = Screen::new(hotbar(&[(2, 33)]));
    let (said, announcer) = recorder();
    let mut detection = DetectionLoop::new(config, store, screen.capture(), announcer).unwrap();

    assert!(detection.tick().events.is_empty());
    detection
        .commands()
        .send(Command::CaptureReference("shotgun".into()));
    detection.tick();
    assert_eq!(take(&said), vec!["Image saved as shotgun"]);
    assert!(reference_dir.join("shotgun.png").is_file());

    detection.wait_for_reingest();
    detection.tick();
    assert_eq!(take(&said), vec!["Slot 3: shotgun"]);

    let reopened = ReferenceStore::open(cache_file, 6).unwrap();
    reopened.load().unwrap();
    assert_eq!(reopened.snapshot().names(), vec!["pickaxe", "rifle", "shotgun"]);
}

#[test]
fn stop_interrupts_a_long_tick_period() {
    let tmp = tempfile::tempdir().unwrap();
    let (config, store) = setup(tmp.path());
    let config = WatchConfig {
        tick_hz: 0.2,
        monitor_on_start: true,
        ..config
    };
    let screen = Screen::new(hotbar(&[(0, PICKAXE)]));
    let (said, announcer) = recorder();
    let handle = DetectionLoop::new(config, store, screen.capture(), announcer)
        .unwrap()
        .spawn()
        .unwrap();

    std::thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    let summary = handle.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(summary.ticks, 1);
    assert_eq!(take(&said), vec!["Slot 1: pickaxe", "Exiting"]);
}

#[test]
fn idle_loop_wakes_on_toggle() {
    let tmp = tempfile::tempdir().unwrap();
    let (config, store) = setup(tmp.path());
    let config = WatchConfig {
        idle_ms: 10_000,
        ..config
    };
    let screen = Screen::new(hotbar(&[(1, RIFLE)]));
    let (said, announcer) = recorder();
    let handle = DetectionLoop::new(config, store, screen.capture(), announcer)
        .unwrap()
        .spawn()
        .unwrap();

    handle.send(Command::ToggleMonitoring);
    let deadline = Instant::now() + Duration::from_secs(5);
    while said.lock().unwrap().len() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    handle.stop().unwrap();
    let said = take(&said);
    assert_eq!(&said[..2], ["Monitoring started", "Slot 2: rifle"]);
    assert_eq!(said.last().map(String::as_str), Some("Exiting"));
}
