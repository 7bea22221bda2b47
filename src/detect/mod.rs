//! Fixed-cadence detection loop.
//!
//! One tick: read the calibration offset, capture every slot, take a single
//! store snapshot, match, debounce, announce changes, drain commands, and
//! hand an annotation to the debug sink. The loop then sleeps until the next
//! tick deadline while listening for commands, so a `Stop` is observed
//! immediately instead of after the sleep. Overrunning ticks start the next
//! one at once; missed ticks are never caught up.

mod handle;
mod jobs;
mod state;

pub use handle::LoopHandle;
pub use state::{DetectionState, SlotEvent};

use crate::bank::ReferenceBank;
use crate::calibration::Calibration;
use crate::collab::{Announcer, Capture, DebugFrame, DebugSink, SlotAnnotation};
use crate::command::{self, Command, CommandSender};
use crate::config::WatchConfig;
use crate::image::io::encode_png;
use crate::image::OwnedImage;
use crate::search::{Matcher, SlotMatch};
use crate::slots::live_regions;
use crate::store::ReferenceStore;
use crate::trace::{trace_debug, trace_event, trace_span, trace_warn};
use crate::util::{SlotWatchError, SlotWatchResult};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use jobs::IngestJobs;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Result of one detection tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Label transitions emitted this tick.
    pub events: Vec<SlotEvent>,
    /// Slots whose capture failed this tick.
    pub capture_failures: usize,
    /// True when a `Stop` command was drained.
    pub stop: bool,
}

/// Totals reported when the loop exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub events: u64,
}

/// The detection state machine and everything it owns.
pub struct DetectionLoop {
    config: WatchConfig,
    store: Arc<ReferenceStore>,
    matcher: Matcher,
    calibration: Calibration,
    capture: Box<dyn Capture>,
    announcer: Box<dyn Announcer>,
    debug: Option<Box<dyn DebugSink>>,
    sender: CommandSender,
    commands: Receiver<Command>,
    pending: VecDeque<Command>,
    state: DetectionState,
    bank: ReferenceBank,
    monitoring: bool,
    jobs: IngestJobs,
}

impl DetectionLoop {
    /// Validates `config` and wires the loop to its collaborators.
    pub fn new(
        config: WatchConfig,
        store: Arc<ReferenceStore>,
        capture: impl Capture + 'static,
        announcer: impl Announcer + 'static,
    ) -> SlotWatchResult<Self> {
        config.validate()?;
        let matcher = Matcher::new(config.threshold)?;
        let (sender, commands) = command::channel();
        let jobs = IngestJobs::new(
            Arc::clone(&store),
            config.reference_dir.clone(),
            config.workers,
        );
        Ok(Self {
            matcher,
            calibration: Calibration::new(config.calibration_step),
            capture: Box::new(capture),
            announcer: Box::new(announcer),
            debug: None,
            sender,
            commands,
            pending: VecDeque::new(),
            state: DetectionState::new(config.slots.len()),
            bank: ReferenceBank::default(),
            monitoring: config.monitor_on_start,
            jobs,
            store,
            config,
        })
    }

    /// Attaches a debug annotation sink.
    pub fn with_debug_sink(mut self, sink: impl DebugSink + 'static) -> Self {
        self.debug = Some(Box::new(sink));
        self
    }

    /// A sender for external command sources.
    pub fn commands(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Shared handle to the calibration offset (read-only use expected).
    pub fn calibration(&self) -> Calibration {
        self.calibration.clone()
    }

    /// Current debounce state.
    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    /// Whether ticks are currently running.
    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    /// Runs one full tick regardless of the monitoring flag.
    pub fn tick(&mut self) -> TickReport {
        let _span = trace_span!("tick").entered();
        let offset = self.calibration.offset();
        let regions = live_regions(&self.config.slots, offset);

        let mut captures: Vec<Option<OwnedImage>> = Vec::with_capacity(regions.len());
        let mut capture_failures = 0usize;
        for (slot, region) in regions.iter().enumerate() {
            match self.capture.capture(region.to_capture_rect()) {
                Ok(image) => captures.push(Some(image)),
                Err(err) => {
                    trace_debug!(slot = slot, error = %err, "capture failed; slot treated as empty");
                    capture_failures += 1;
                    captures.push(None);
                }
            }
        }

        // One snapshot for every slot of this tick.
        let snapshot = self.store.snapshot();
        if !self.bank.is_built_from(&snapshot) {
            let (width, height) = self.config.slot_size();
            self.bank = ReferenceBank::prepare(&snapshot, width, height);
        }

        let matches: Vec<SlotMatch> = captures
            .iter()
            .map(|capture| match capture {
                Some(image) => self.matcher.best_match(image.view(), &self.bank),
                None => SlotMatch::empty(),
            })
            .collect();

        let mut events = Vec::new();
        for (slot, result) in matches.iter().enumerate() {
            if let Some(event) = self.state.observe(slot, result.label.as_deref()) {
                self.announce(&event.to_string());
                events.push(event);
            }
        }

        let stop = self.drain_commands() == Flow::Stop;

        if let Some(debug) = self.debug.as_mut() {
            let frame = DebugFrame {
                slots: matches
                    .iter()
                    .zip(&captures)
                    .map(|(result, capture)| SlotAnnotation {
                        label: result.label.clone(),
                        score: result.score(),
                        captured: capture.is_some(),
                    })
                    .collect(),
                threshold: self.matcher.threshold(),
                offset: self.calibration.offset(),
            };
            debug.annotate(&frame);
        }

        TickReport {
            events,
            capture_failures,
            stop,
        }
    }

    /// Runs until a `Stop` command arrives, then joins background jobs.
    pub fn run(mut self) -> RunSummary {
        if self.store.is_empty() {
            if let Err(err) = self.store.load() {
                trace_warn!(error = %err, "starting with an empty reference store");
            }
        }
        trace_event!(
            "loop_started",
            references = self.store.len(),
            monitoring = self.monitoring
        );

        let tick_period = self.config.tick_period();
        let idle_period = self.config.idle_period();
        let mut summary = RunSummary::default();
        loop {
            let started = Instant::now();
            let flow = if self.monitoring {
                let report = self.tick();
                summary.ticks += 1;
                summary.events += report.events.len() as u64;
                let busy = started.elapsed();
                if busy > tick_period {
                    trace_debug!(busy_ms = busy.as_millis() as u64, "tick overran its period");
                }
                if report.stop {
                    Flow::Stop
                } else {
                    self.sleep_until(started + tick_period, false)
                }
            } else {
                match self.drain_commands() {
                    Flow::Stop => Flow::Stop,
                    // Toggled on: tick right away.
                    Flow::Continue if self.monitoring => Flow::Continue,
                    Flow::Continue => self.sleep_until(started + idle_period, true),
                }
            };
            self.jobs.poll();
            if flow == Flow::Stop {
                break;
            }
        }

        self.jobs.shutdown();
        trace_event!("loop_stopped", ticks = summary.ticks, events = summary.events);
        summary
    }

    /// Starts the loop on its own thread.
    pub fn spawn(self) -> SlotWatchResult<LoopHandle> {
        LoopHandle::spawn(self)
    }

    /// Number of background re-ingest jobs that finished so far.
    pub fn completed_reingests(&self) -> u64 {
        self.jobs.completed()
    }

    /// Waits for the running re-ingest job, if any.
    pub fn wait_for_reingest(&mut self) {
        self.jobs.shutdown();
    }

    /// Waits for commands until `deadline`. `Stop` ends the wait at once;
    /// other commands are queued for the next drain, and when `wake_on_command`
    /// is set they also end the wait.
    fn sleep_until(&mut self, deadline: Instant, wake_on_command: bool) -> Flow {
        loop {
            match self.commands.recv_deadline(deadline) {
                Ok(Command::Stop) => {
                    self.pending.push_back(Command::Stop);
                    return self.drain_commands();
                }
                Ok(command) => {
                    self.pending.push_back(command);
                    if wake_on_command {
                        return Flow::Continue;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Flow::Continue,
                // The loop holds a sender itself, so this only happens while
                // tearing down.
                Err(RecvTimeoutError::Disconnected) => return Flow::Stop,
            }
        }
    }

    /// Applies every queued and pending command in arrival order.
    fn drain_commands(&mut self) -> Flow {
        loop {
            let next = match self.pending.pop_front() {
                Some(command) => command,
                None => match self.commands.try_recv() {
                    Ok(command) => command,
                    Err(_) => return Flow::Continue,
                },
            };
            if self.handle(next) == Flow::Stop {
                self.pending.clear();
                return Flow::Stop;
            }
        }
    }

    fn handle(&mut self, command: Command) -> Flow {
        if let Some(adjustment) = command.adjustment() {
            let offset = self.calibration.apply(adjustment);
            for (slot, region) in live_regions(&self.config.slots, offset).iter().enumerate() {
                trace_debug!(
                    slot = slot + 1,
                    left = region.left,
                    top = region.top,
                    right = region.right,
                    bottom = region.bottom,
                    "slot coordinates"
                );
            }
            return Flow::Continue;
        }
        match command {
            Command::ToggleMonitoring => {
                self.monitoring = !self.monitoring;
                let text = if self.monitoring {
                    "Monitoring started"
                } else {
                    "Monitoring paused"
                };
                self.announce(text);
            }
            Command::CaptureReference(name) => self.capture_reference(&name),
            Command::ReloadReferences => self.jobs.request(),
            Command::Stop => {
                self.announce("Exiting");
                return Flow::Stop;
            }
            Command::AdjustLeft | Command::AdjustRight | Command::AdjustUp | Command::AdjustDown => {}
        }
        Flow::Continue
    }

    fn capture_reference(&mut self, name: &str) {
        let name = sanitize_name(name);
        if name.is_empty() {
            self.announce("Image capture cancelled");
            return;
        }
        match self.save_reference(&name) {
            Ok(()) => {
                self.announce(&format!("Image saved as {name}"));
                self.jobs.request();
            }
            Err(err) => {
                trace_warn!(name = %name, error = %err, "reference capture failed");
                self.announce("Image capture failed");
            }
        }
    }

    fn save_reference(&mut self, name: &str) -> SlotWatchResult<()> {
        let rect = self
            .config
            .capture_region
            .offset(self.calibration.offset())
            .to_capture_rect();
        let image = self.capture.capture(rect)?;
        let bytes = encode_png(name, &image)?;
        let dir = &self.config.reference_dir;
        std::fs::create_dir_all(dir).map_err(|err| SlotWatchError::io(dir, err))?;
        let path = dir.join(format!("{name}.png"));
        std::fs::write(&path, bytes).map_err(|err| SlotWatchError::io(&path, err))
    }

    fn announce(&mut self, text: &str) {
        if let Err(err) = self.announcer.announce(text) {
            trace_warn!(error = %err, text = text, "announcement dropped");
        }
    }
}

/// Keeps a reference name usable as a file stem.
fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
