//! In-memory remote used by the sync tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::remote::RemoteApi;
use crate::error::Error;
use crate::resource::{ResourceBatch, ResourceId, ResourceKind};
use crate::store::Snapshot;
use crate::Result;

/// Records every call as a label like `"remove tasks 2"`.
#[derive(Default)]
pub(crate) struct FakeApi {
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<Option<&'static str>>,
    delays: HashMap<&'static str, Duration>,
    remote: Snapshot,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `snapshot` from list calls
    pub fn with_remote(mut self, snapshot: Snapshot) -> Self {
        self.remote = snapshot;
        self
    }

    /// Fail calls whose label starts with `prefix` with a transport error
    pub fn fail_on(self, prefix: &'static str) -> Self {
        *self.fail_on.lock().unwrap() = Some(prefix);
        self
    }

    /// Delay calls whose label starts with `prefix`
    pub fn delay(mut self, prefix: &'static str, duration: Duration) -> Self {
        self.delays.insert(prefix, duration);
        self
    }

    pub fn heal(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn record(&self, label: String) -> Result<()> {
        let delay = self
            .delays
            .iter()
            .find(|(prefix, _)| label.starts_with(*prefix))
            .map(|(_, duration)| *duration);
        let fails = self
            .fail_on
            .lock()
            .unwrap()
            .is_some_and(|prefix| label.starts_with(prefix));
        self.calls.lock().unwrap().push(label.clone());

        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }
        if fails {
            return Err(Error::Transport(format!("connection refused during {}", label)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        self.record(format!("authenticate {}", username)).await?;
        if password == "secret" {
            Ok(format!("token-{}", username))
        } else {
            Err(Error::Authentication("invalid credentials".to_string()))
        }
    }

    async fn register(&self, _email: &str, username: &str, _password: &str) -> Result<()> {
        self.record(format!("register {}", username)).await
    }

    async fn list(&self, _token: Option<&str>, kind: ResourceKind) -> Result<ResourceBatch> {
        self.record(format!("list {}", kind.collection())).await?;
        Ok(match kind {
            ResourceKind::Card => ResourceBatch::Cards(self.remote.cards.clone()),
            ResourceKind::Task => ResourceBatch::Tasks(self.remote.tasks.clone()),
            ResourceKind::Preference => ResourceBatch::Preferences(self.remote.preferences.clone()),
        })
    }

    async fn create(&self, _token: Option<&str>, batch: &ResourceBatch) -> Result<()> {
        self.record(format!("add {} {}", batch.kind().collection(), batch.len()))
            .await
    }

    async fn update(&self, _token: Option<&str>, batch: &ResourceBatch) -> Result<()> {
        self.record(format!("update {} {}", batch.kind().collection(), batch.len()))
            .await
    }

    async fn delete(&self, _token: Option<&str>, kind: ResourceKind, ids: &[ResourceId]) -> Result<()> {
        self.record(format!("remove {} {}", kind.collection(), ids.len()))
            .await
    }
}
