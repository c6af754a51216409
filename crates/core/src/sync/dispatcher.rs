//! Remote call dispatcher
//!
//! Runs remote operations on background tokio tasks. Every job owns its own
//! oneshot channel, so a result can only ever be picked up through the id of
//! the job that produced it, whatever order jobs finish in.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use super::remote::{RemoteApi, RemoteOperation, RemoteOutput};
use crate::error::Error;
use crate::resource::{ResourceBatch, ResourceKind};
use crate::Result;

/// Correlation id of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a job as seen by a poll
#[derive(Debug)]
pub enum JobPoll {
    Pending,
    Ready(Result<RemoteOutput>),
}

/// Submits remote operations without blocking and hands results back by job id.
///
/// Must be used from within a tokio runtime.
pub struct Dispatcher {
    api: Arc<dyn RemoteApi>,
    token: Option<String>,
    jobs: HashMap<JobId, oneshot::Receiver<Result<RemoteOutput>>>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self {
            api,
            token: None,
            jobs: HashMap::new(),
        }
    }

    /// Set the token sent with resource calls
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn spawn_job<F>(&mut self, work: F) -> JobId
    where
        F: Future<Output = Result<RemoteOutput>> + Send + 'static,
    {
        let job_id = JobId::new();
        let (result_tx, result_rx) = oneshot::channel();

        tokio::spawn(async move {
            // The receiver may have been forgotten; nothing to do then.
            let _ = result_tx.send(work.await);
        });

        self.jobs.insert(job_id, result_rx);
        job_id
    }

    /// Submit a single operation
    pub fn submit(&mut self, operation: RemoteOperation) -> JobId {
        let api = Arc::clone(&self.api);
        let token = self.token.clone();

        let job_id = self.spawn_job(async move { operation.execute(api.as_ref(), token.as_deref()).await });
        debug!("Submitted job {}", job_id);
        job_id
    }

    /// Submit operations that run in order under one job id.
    ///
    /// The job stops at the first failing operation and resolves to its error.
    pub fn submit_batch(&mut self, operations: Vec<RemoteOperation>) -> JobId {
        let api = Arc::clone(&self.api);
        let token = self.token.clone();
        let count = operations.len();

        let job_id = self.spawn_job(async move {
            let mut outputs = Vec::with_capacity(operations.len());
            for operation in &operations {
                debug!("Running {}", operation);
                match operation.execute(api.as_ref(), token.as_deref()).await {
                    Ok(output) => outputs.push(output),
                    Err(e) => {
                        warn!("Remote operation {} failed: {}", operation, e);
                        return Err(e);
                    }
                }
            }
            Ok(RemoteOutput::Batch(outputs))
        });
        debug!("Submitted batch job {} with {} operations", job_id, count);
        job_id
    }

    /// Check a job without waiting. A finished job is removed once its result is returned.
    pub fn poll(&mut self, job_id: JobId) -> Result<JobPoll> {
        let receiver = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::UnknownJob(job_id.to_string()))?;

        match receiver.try_recv() {
            Ok(result) => {
                self.jobs.remove(&job_id);
                Ok(JobPoll::Ready(result))
            }
            Err(TryRecvError::Empty) => Ok(JobPoll::Pending),
            Err(TryRecvError::Closed) => {
                self.jobs.remove(&job_id);
                Ok(JobPoll::Ready(Err(Self::lost(job_id))))
            }
        }
    }

    /// Wait for a job to finish
    pub async fn wait(&mut self, job_id: JobId) -> Result<RemoteOutput> {
        let receiver = self
            .jobs
            .remove(&job_id)
            .ok_or_else(|| Error::UnknownJob(job_id.to_string()))?;

        receiver.await.map_err(|_| Self::lost(job_id))?
    }

    /// Stop tracking a job; its result will be dropped
    pub fn forget(&mut self, job_id: JobId) -> bool {
        self.jobs.remove(&job_id).is_some()
    }

    /// Number of submitted jobs whose result has not been collected
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    fn lost(job_id: JobId) -> Error {
        Error::Transport(format!("Remote job {} ended without a result", job_id))
    }

    /// Authenticate and return the token
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<String> {
        let job_id = self.submit(RemoteOperation::Authenticate {
            username: username.to_string(),
            password: password.to_string(),
        });
        match self.wait(job_id).await? {
            RemoteOutput::Token(token) => Ok(token),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Register a new account
    pub async fn register(&mut self, email: &str, username: &str, password: &str) -> Result<()> {
        let job_id = self.submit(RemoteOperation::Register {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        });
        match self.wait(job_id).await? {
            RemoteOutput::Registered => Ok(()),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Fetch all three kinds concurrently
    pub async fn fetch_all(&mut self) -> Result<(ResourceBatch, ResourceBatch, ResourceBatch)> {
        let jobs: Vec<JobId> = ResourceKind::ALL
            .iter()
            .map(|kind| self.submit(RemoteOperation::List(*kind)))
            .collect();

        let mut batches = Vec::with_capacity(jobs.len());
        for job_id in jobs {
            match self.wait(job_id).await? {
                RemoteOutput::Listed(batch) => batches.push(batch),
                other => return Err(Self::unexpected(other)),
            }
        }

        let mut batches = batches.into_iter();
        match (batches.next(), batches.next(), batches.next()) {
            (Some(cards), Some(tasks), Some(preferences)) => Ok((cards, tasks, preferences)),
            _ => Err(Error::Transport("Incomplete fetch".to_string())),
        }
    }

    fn unexpected(output: RemoteOutput) -> Error {
        Error::Transport(format!("Unexpected remote output: {:?}", output))
    }
}
