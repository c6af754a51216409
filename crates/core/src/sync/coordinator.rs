//! Sync coordination
//!
//! Diffs the last persisted snapshot against the live store, ships the
//! changes through the dispatcher and persists the synced state once the
//! remote side has accepted every call.

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::diff::{Diff, SnapshotDiff};
use super::dispatcher::{Dispatcher, JobId, JobPoll};
use super::remote::{RemoteOperation, RemoteOutput};
use crate::error::Error;
use crate::resource::{ResourceBatch, ResourceKind};
use crate::store::{LocalStore, Snapshot, SnapshotFile};
use crate::Result;

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often an in-flight job is polled
    pub poll_interval: Duration,
    /// Give up on a job after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

/// Phase of the current (or last) sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Diffing,
    Dispatching,
    Awaiting,
    Done,
    Failed,
}

impl SyncState {
    /// Whether a sync is underway
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Diffing | Self::Dispatching | Self::Awaiting)
    }
}

/// Outcome of a completed sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Job that carried the calls, `None` when there was nothing to send
    pub job: Option<JobId>,
    /// Number of remote calls issued
    pub calls: usize,
    pub cards_changed: usize,
    pub tasks_changed: usize,
    pub preferences_changed: usize,
    /// Whether the store was clean after the sync; false if it was edited meanwhile
    pub store_clean: bool,
}

impl SyncReport {
    pub fn changes(&self) -> usize {
        self.cards_changed + self.tasks_changed + self.preferences_changed
    }
}

struct InFlight {
    job: Option<JobId>,
    snapshot: Snapshot,
    revision: u64,
    calls: usize,
    counts: (usize, usize, usize),
    started: Instant,
}

/// Build the remote calls for a diff.
///
/// At most three calls per kind, ordered cards, tasks, preferences and
/// update, remove, add within each kind.
pub fn plan_operations(diff: SnapshotDiff) -> Vec<RemoteOperation> {
    let mut operations = Vec::new();
    push_kind(&mut operations, ResourceKind::Card, diff.cards, ResourceBatch::Cards);
    push_kind(&mut operations, ResourceKind::Task, diff.tasks, ResourceBatch::Tasks);
    push_kind(
        &mut operations,
        ResourceKind::Preference,
        diff.preferences,
        ResourceBatch::Preferences,
    );
    operations
}

fn push_kind<R>(
    operations: &mut Vec<RemoteOperation>,
    kind: ResourceKind,
    diff: Diff<R>,
    batch: fn(Vec<R>) -> ResourceBatch,
) {
    if !diff.updated.is_empty() {
        operations.push(RemoteOperation::Update(batch(diff.updated)));
    }
    if !diff.removed.is_empty() {
        operations.push(RemoteOperation::Remove {
            kind,
            ids: diff.removed,
        });
    }
    if !diff.added.is_empty() {
        operations.push(RemoteOperation::Add(batch(diff.added)));
    }
}

/// Drives syncs between a [`LocalStore`] and the remote server
pub struct SyncCoordinator {
    file: SnapshotFile,
    config: SyncConfig,
    state: SyncState,
    in_flight: Option<InFlight>,
    last_report: Option<SyncReport>,
}

impl SyncCoordinator {
    pub fn new(file: SnapshotFile) -> Self {
        Self::with_config(file, SyncConfig::default())
    }

    pub fn with_config(file: SnapshotFile, config: SyncConfig) -> Self {
        Self {
            file,
            config,
            state: SyncState::Idle,
            in_flight: None,
            last_report: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn file(&self) -> &SnapshotFile {
        &self.file
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Report of the last successful sync
    pub fn last_report(&self) -> Option<&SyncReport> {
        self.last_report.as_ref()
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.state.is_active() {
            warn!("Rejected sync request while {:?}", self.state);
            return Err(Error::SyncInProgress);
        }
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Error {
        error!("Sync failed: {}", err);
        self.state = SyncState::Failed;
        self.in_flight = None;
        err
    }

    /// Start a sync: diff, then submit the calls as one batch job.
    ///
    /// Returns the job id, or `None` when there was nothing to send. The
    /// store is only read; edits made after this call go out with the next sync.
    pub async fn begin(&mut self, store: &LocalStore, dispatcher: &mut Dispatcher) -> Result<Option<JobId>> {
        self.ensure_idle()?;
        self.state = SyncState::Diffing;

        let synced = match self.file.read().await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.fail(e)),
        };
        let current = store.snapshot();
        let revision = store.revision();

        let diff = SnapshotDiff::between(&synced, &current);
        let counts = (diff.cards.len(), diff.tasks.len(), diff.preferences.len());
        debug!(
            "Diff: {} cards, {} tasks, {} preferences changed",
            counts.0, counts.1, counts.2
        );

        self.state = SyncState::Dispatching;
        let operations = plan_operations(diff);
        let calls = operations.len();

        let job = if operations.is_empty() {
            debug!("Nothing to send");
            None
        } else {
            Some(dispatcher.submit_batch(operations))
        };

        info!("Sync started with {} remote calls", calls);
        self.in_flight = Some(InFlight {
            job,
            snapshot: current,
            revision,
            calls,
            counts,
            started: Instant::now(),
        });
        self.state = SyncState::Awaiting;
        Ok(job)
    }

    /// Check on the in-flight sync.
    ///
    /// Returns `Ok(None)` while the job is still running and the report once
    /// the synced snapshot has been written.
    pub async fn poll(&mut self, store: &mut LocalStore, dispatcher: &mut Dispatcher) -> Result<Option<SyncReport>> {
        if self.state != SyncState::Awaiting {
            return Err(Error::InvalidInput(format!(
                "No sync is awaiting completion (state {:?})",
                self.state
            )));
        }
        let Some((job, started)) = self.in_flight.as_ref().map(|f| (f.job, f.started)) else {
            return Err(self.fail(Error::Storage("Sync state lost".to_string())));
        };

        if let (Some(limit), Some(job)) = (self.config.timeout, job) {
            if started.elapsed() >= limit {
                dispatcher.forget(job);
                return Err(self.fail(Error::SyncTimedOut {
                    seconds: limit.as_secs(),
                }));
            }
        }

        let outcome = match job {
            None => JobPoll::Ready(Ok(RemoteOutput::Batch(Vec::new()))),
            Some(job) => match dispatcher.poll(job) {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.fail(e)),
            },
        };

        match outcome {
            JobPoll::Pending => Ok(None),
            JobPoll::Ready(Err(e)) => Err(self.fail(e)),
            JobPoll::Ready(Ok(_)) => self.finish(store).await.map(Some),
        }
    }

    async fn finish(&mut self, store: &mut LocalStore) -> Result<SyncReport> {
        let Some(in_flight) = self.in_flight.take() else {
            return Err(self.fail(Error::Storage("Sync state lost".to_string())));
        };

        if let Err(e) = self.file.write(&in_flight.snapshot).await {
            return Err(self.fail(e));
        }

        let store_clean = store.revision() == in_flight.revision;
        if store_clean {
            store.mark_saved();
        } else {
            info!("Store changed during sync; new edits stay pending");
        }

        let report = SyncReport {
            job: in_flight.job,
            calls: in_flight.calls,
            cards_changed: in_flight.counts.0,
            tasks_changed: in_flight.counts.1,
            preferences_changed: in_flight.counts.2,
            store_clean,
        };
        info!(
            "Sync done: {} calls, {} changes",
            report.calls,
            report.changes()
        );
        self.state = SyncState::Done;
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Run a full sync, polling on the configured interval until it settles
    pub async fn run(&mut self, store: &mut LocalStore, dispatcher: &mut Dispatcher) -> Result<SyncReport> {
        self.begin(store, dispatcher).await?;

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Some(report) = self.poll(store, dispatcher).await? {
                return Ok(report);
            }
        }
    }

    /// Replace the store with the server's state and persist it
    pub async fn pull(&mut self, store: &mut LocalStore, dispatcher: &mut Dispatcher) -> Result<()> {
        self.ensure_idle()?;

        let (cards, tasks, preferences) = dispatcher.fetch_all().await?;
        let (cards, tasks, preferences) = match (cards, tasks, preferences) {
            (ResourceBatch::Cards(c), ResourceBatch::Tasks(t), ResourceBatch::Preferences(p)) => (c, t, p),
            _ => return Err(Error::Transport("Fetched batches of the wrong kind".to_string())),
        };
        info!(
            "Pulled {} cards, {} tasks, {} preferences",
            cards.len(),
            tasks.len(),
            preferences.len()
        );

        store.replace_with_remote(cards, tasks, preferences)?;
        self.file.write(&store.snapshot()).await?;
        store.mark_saved();
        self.state = SyncState::Idle;
        Ok(())
    }
}
