//! Background re-ingest jobs owned by the detection loop.
//!
//! At most one job runs at a time. Requests that arrive while a job is
//! running collapse into a single follow-up job.

use crate::store::{IngestSummary, ReferenceStore};
use crate::trace::{trace_event, trace_warn};
use crate::util::{SlotWatchError, SlotWatchResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

pub(crate) struct IngestJobs {
    store: Arc<ReferenceStore>,
    dir: PathBuf,
    workers: Option<usize>,
    running: Option<JoinHandle<SlotWatchResult<IngestSummary>>>,
    queued: bool,
    completed: u64,
}

impl IngestJobs {
    pub(crate) fn new(store: Arc<ReferenceStore>, dir: PathBuf, workers: Option<usize>) -> Self {
        Self {
            store,
            dir,
            workers,
            running: None,
            queued: false,
            completed: 0,
        }
    }

    /// Starts a job now, or queues one if a job is still running.
    pub(crate) fn request(&mut self) {
        self.poll();
        if self.running.is_some() {
            self.queued = true;
        } else {
            self.start();
        }
    }

    /// Reaps a finished job and starts the queued one, if any.
    pub(crate) fn poll(&mut self) {
        let finished = self
            .running
            .as_ref()
            .is_some_and(|handle| handle.is_finished());
        if !finished {
            return;
        }
        if let Some(handle) = self.running.take() {
            self.reap(handle);
        }
        if std::mem::take(&mut self.queued) {
            self.start();
        }
    }

    /// Waits for the running job. A queued job is dropped.
    pub(crate) fn shutdown(&mut self) {
        self.queued = false;
        if let Some(handle) = self.running.take() {
            self.reap(handle);
        }
    }

    /// Jobs that ran to completion (successfully or not).
    pub(crate) fn completed(&self) -> u64 {
        self.completed
    }

    fn start(&mut self) {
        let store = Arc::clone(&self.store);
        let dir = self.dir.clone();
        let workers = self.workers;
        let spawned = std::thread::Builder::new()
            .name("slotwatch-reingest".into())
            .spawn(move || store.ingest(&dir, workers));
        match spawned {
            Ok(handle) => self.running = Some(handle),
            Err(err) => {
                let err = SlotWatchError::Spawn(err);
                trace_warn!(error = %err, "re-ingest not started");
            }
        }
    }

    fn reap(&mut self, handle: JoinHandle<SlotWatchResult<IngestSummary>>) {
        self.completed += 1;
        match handle.join() {
            Ok(Ok(summary)) => {
                trace_event!(
                    "reingest_done",
                    images = summary.images,
                    failed = summary.failed
                );
            }
            Ok(Err(err)) => {
                trace_warn!(error = %err, "re-ingest failed; previous references kept");
            }
            Err(_) => {
                trace_warn!("re-ingest thread panicked; previous references kept");
            }
        }
    }
}
