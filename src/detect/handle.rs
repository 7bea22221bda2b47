use super::{DetectionLoop, RunSummary};
use crate::calibration::Calibration;
use crate::command::{Command, CommandSender};
use crate::util::{SlotWatchError, SlotWatchResult};
use std::thread::JoinHandle;

/// A detection loop running on its own thread.
///
/// Dropping the handle stops the loop and waits for it.
pub struct LoopHandle {
    sender: CommandSender,
    calibration: Calibration,
    thread: Option<JoinHandle<RunSummary>>,
}

impl LoopHandle {
    pub(crate) fn spawn(detection: DetectionLoop) -> SlotWatchResult<Self> {
        let sender = detection.commands();
        let calibration = detection.calibration();
        let thread = std::thread::Builder::new()
            .name("slotwatch-detect".into())
            .spawn(move || detection.run())
            .map_err(SlotWatchError::Spawn)?;
        Ok(Self {
            sender,
            calibration,
            thread: Some(thread),
        })
    }

    /// Queues a command for the loop.
    pub fn send(&self, command: Command) -> bool {
        self.sender.send(command)
    }

    /// A sender that outlives borrows of this handle.
    pub fn commands(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Shared calibration offset of the running loop.
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// True once the loop thread has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Sends `Stop` and waits for the loop. `None` if the loop panicked.
    pub fn stop(mut self) -> Option<RunSummary> {
        self.finish()
    }

    /// Waits for the loop to exit on its own (after a `Stop` from elsewhere).
    pub fn join(mut self) -> Option<RunSummary> {
        self.thread.take().and_then(|thread| thread.join().ok())
    }

    fn finish(&mut self) -> Option<RunSummary> {
        let thread = self.thread.take()?;
        self.sender.stop();
        thread.join().ok()
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
