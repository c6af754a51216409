//! One CLI invocation's view of the board
//!
//! `storage.json` holds the last state the server accepted. Edits made
//! between syncs live in `pending.json`, so they survive across invocations
//! without disturbing the snapshot the next sync diffs against.

use std::sync::Arc;

use deck_core::store::{LocalStore, SnapshotFile};
use deck_core::sync::{Dispatcher, RemoteApi, SyncCoordinator, SyncReport};
use deck_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::config::Config;

pub struct Session {
    store: LocalStore,
    pending: SnapshotFile,
    coordinator: SyncCoordinator,
    dispatcher: Dispatcher,
}

impl Session {
    pub async fn open(config: &Config, api: Arc<dyn RemoteApi>) -> Result<Self> {
        let synced_file = SnapshotFile::new(config.snapshot_path());
        let pending = SnapshotFile::new(config.pending_path());
        let synced = synced_file.read().await?;

        let store = if pending.exists() {
            debug!("Loading working copy {:?}", pending.path());
            let mut store = LocalStore::from_snapshot(pending.read().await?)?;
            // Ids deleted locally are still live on the server until the next sync.
            store.reserve_synced_ids(&synced);
            store
        } else {
            LocalStore::from_snapshot(synced)?
        };

        let dispatcher = Dispatcher::new(api).with_token(store.token().map(str::to_string));
        let coordinator = SyncCoordinator::with_config(synced_file, config.sync_config());

        Ok(Self {
            store,
            pending,
            coordinator,
            dispatcher,
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LocalStore {
        &mut self.store
    }

    /// Whether there are edits the server has not seen
    pub fn has_pending(&self) -> bool {
        self.store.is_dirty() || self.pending.exists()
    }

    /// Whether the board differs from what the server last accepted.
    ///
    /// Token changes alone don't count.
    pub async fn has_board_edits(&self) -> Result<bool> {
        if !self.has_pending() {
            return Ok(false);
        }
        let synced = self.coordinator.file().read().await?;
        let current = self.store.snapshot();
        Ok(current.cards != synced.cards
            || current.tasks != synced.tasks
            || current.preferences != synced.preferences)
    }

    /// Write edits to the working copy
    pub async fn save(&mut self) -> Result<()> {
        if self.store.is_dirty() {
            self.pending.write(&self.store.snapshot()).await?;
        }
        Ok(())
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token = self.dispatcher.authenticate(username, password).await?;
        info!("Logged in as {}", username);
        self.dispatcher.set_token(Some(token.clone()));
        self.store.set_token(Some(token));
        self.save().await
    }

    pub async fn register(&mut self, email: &str, username: &str, password: &str) -> Result<()> {
        self.dispatcher.register(email, username, password).await
    }

    pub async fn logout(&mut self) -> Result<()> {
        self.dispatcher.set_token(None);
        self.store.set_token(None);
        self.save().await
    }

    pub async fn sync(&mut self) -> Result<SyncReport> {
        self.dispatcher.set_token(self.store.token().map(str::to_string));
        let report = self.coordinator.run(&mut self.store, &mut self.dispatcher).await?;

        if report.store_clean {
            self.pending.remove().await?;
        } else {
            self.pending.write(&self.store.snapshot()).await?;
        }
        Ok(report)
    }

    /// Replace the local board with the server's.
    ///
    /// Refuses while there are unsynced board edits unless `force` is set.
    pub async fn pull(&mut self, force: bool) -> Result<()> {
        if self.has_board_edits().await? {
            if !force {
                return Err(Error::PendingChanges);
            }
            warn!("Discarding unsynced local changes");
        }
        self.dispatcher.set_token(self.store.token().map(str::to_string));
        self.coordinator.pull(&mut self.store, &mut self.dispatcher).await?;
        self.pending.remove().await
    }

    /// Forget everything stored locally, including the token
    pub async fn wipe(&mut self) -> Result<()> {
        self.coordinator.file().wipe().await?;
        self.pending.remove().await?;
        self.store = LocalStore::new();
        self.dispatcher.set_token(None);
        info!("Local data wiped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deck_core::resource::{ResourceBatch, ResourceId, ResourceKind};
    use deck_core::store::Snapshot;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
        offline: bool,
    }

    impl RecordingApi {
        fn record(&self, call: String) -> Result<()> {
            if self.offline {
                return Err(Error::Transport("connection refused".to_string()));
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteApi for RecordingApi {
        async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
            self.record(format!("authenticate {}", username))?;
            if password == "secret" {
                Ok("tok".to_string())
            } else {
                Err(Error::Authentication("bad credentials".to_string()))
            }
        }

        async fn register(&self, _email: &str, username: &str, _password: &str) -> Result<()> {
            self.record(format!("register {}", username))
        }

        async fn list(&self, _token: Option<&str>, kind: ResourceKind) -> Result<ResourceBatch> {
            self.record(format!("list {}", kind.collection()))?;
            ResourceBatch::from_wire(kind, &serde_json::json!([]))
        }

        async fn create(&self, token: Option<&str>, batch: &ResourceBatch) -> Result<()> {
            self.record(format!("add {} {:?}", batch.kind().collection(), token))
        }

        async fn update(&self, token: Option<&str>, batch: &ResourceBatch) -> Result<()> {
            self.record(format!("update {} {:?}", batch.kind().collection(), token))
        }

        async fn delete(&self, token: Option<&str>, kind: ResourceKind, _ids: &[ResourceId]) -> Result<()> {
            self.record(format!("remove {} {:?}", kind.collection(), token))
        }
    }

    fn config(dir: &TempDir) -> Config {
        Config {
            data_dir: dir.path().to_path_buf(),
            api_url: "http://127.0.0.1:9".to_string(),
            poll_interval: Duration::from_millis(10),
            sync_timeout: None,
            auto_sync: false,
        }
    }

    fn online() -> Arc<RecordingApi> {
        Arc::new(RecordingApi::default())
    }

    fn offline() -> Arc<RecordingApi> {
        Arc::new(RecordingApi {
            offline: true,
            ..RecordingApi::default()
        })
    }

    #[tokio::test]
    async fn test_edits_survive_between_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let mut session = Session::open(&config, online()).await.unwrap();
        let card = session.store_mut().add_card("Work");
        session.store_mut().add_task(card, "Plan").unwrap();
        session.save().await.unwrap();

        assert!(config.pending_path().exists());
        assert!(!config.snapshot_path().exists());

        let reopened = Session::open(&config, online()).await.unwrap();
        assert_eq!(reopened.store().cards()[0].name, "Work");
        assert_eq!(reopened.store().tasks(card).unwrap()[0].description, "Plan");
        assert!(reopened.has_pending());
    }

    #[tokio::test]
    async fn test_sync_clears_working_copy() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let api = online();

        let mut session = Session::open(&config, api.clone()).await.unwrap();
        session.login("ana", "secret").await.unwrap();
        session.store_mut().add_card("Work");
        session.save().await.unwrap();

        let report = session.sync().await.unwrap();
        assert_eq!(report.calls, 2);
        assert!(!config.pending_path().exists());
        assert!(!session.has_pending());

        let calls = api.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec!["authenticate ana", "add cards Some(\"tok\")", "add preferences Some(\"tok\")"]
        );

        let persisted = SnapshotFile::new(config.snapshot_path()).read().await.unwrap();
        assert_eq!(persisted.token.as_deref(), Some("tok"));
        assert_eq!(persisted.cards.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_edits() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let mut session = Session::open(&config, offline()).await.unwrap();
        session.store_mut().add_card("Work");
        session.save().await.unwrap();

        assert!(matches!(session.sync().await, Err(Error::Transport(_))));
        assert!(session.store().is_dirty());
        assert!(config.pending_path().exists());
        assert!(!config.snapshot_path().exists());
    }

    #[tokio::test]
    async fn test_deleted_ids_not_reused_before_sync() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let mut session = Session::open(&config, online()).await.unwrap();
        let first = session.store_mut().add_card("Old");
        session.sync().await.unwrap();

        session.store_mut().remove_card(first).unwrap();
        session.save().await.unwrap();

        let mut reopened = Session::open(&config, online()).await.unwrap();
        let second = reopened.store_mut().add_card("New");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_wrong_password_is_authentication_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let mut session = Session::open(&config, online()).await.unwrap();
        assert!(matches!(
            session.login("ana", "nope").await,
            Err(Error::Authentication(_))
        ));
        assert_eq!(session.store().token(), None);

        let mut unreachable = Session::open(&config, offline()).await.unwrap();
        assert!(matches!(
            unreachable.login("ana", "secret").await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_pull_refuses_unsynced_edits() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let mut session = Session::open(&config, online()).await.unwrap();
        session.store_mut().add_card("Unsynced work");
        session.save().await.unwrap();

        assert!(matches!(session.pull(false).await, Err(Error::PendingChanges)));
        assert_eq!(session.store().cards()[0].name, "Unsynced work");
        assert!(config.pending_path().exists());

        let reopened = Session::open(&config, online()).await.unwrap();
        assert_eq!(reopened.store().cards().len(), 1);
    }

    #[tokio::test]
    async fn test_forced_pull_discards_edits() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let mut session = Session::open(&config, online()).await.unwrap();
        session.store_mut().add_card("Unsynced work");
        session.save().await.unwrap();

        session.pull(true).await.unwrap();
        assert!(session.store().cards().is_empty());
        assert!(!config.pending_path().exists());
        assert!(!session.has_pending());
    }

    #[tokio::test]
    async fn test_pull_after_login() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let api = online();

        let mut session = Session::open(&config, api.clone()).await.unwrap();
        session.login("ana", "secret").await.unwrap();
        assert!(session.has_pending());
        assert!(!session.has_board_edits().await.unwrap());

        session.pull(false).await.unwrap();
        assert_eq!(session.store().token(), Some("tok"));
        assert!(api.calls.lock().unwrap().contains(&"list cards".to_string()));
    }

    #[tokio::test]
    async fn test_wipe() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let mut session = Session::open(&config, online()).await.unwrap();
        session.login("ana", "secret").await.unwrap();
        session.store_mut().add_card("Work");
        session.sync().await.unwrap();
        session.store_mut().add_card("Unsynced");
        session.save().await.unwrap();

        session.wipe().await.unwrap();
        assert!(session.store().cards().is_empty());
        assert!(!config.pending_path().exists());

        let persisted = SnapshotFile::new(config.snapshot_path()).read().await.unwrap();
        assert_eq!(persisted, Snapshot::default());
    }
}
