//! Remote API seam
//!
//! Defines the interface to the board server and the operations the
//! dispatcher can run against it.

use std::fmt;

use async_trait::async_trait;

use crate::resource::{ResourceBatch, ResourceId, ResourceKind};
use crate::Result;

/// Interface to the remote board server
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Exchange credentials for a token
    async fn authenticate(&self, username: &str, password: &str) -> Result<String>;

    /// Create a new account
    async fn register(&self, email: &str, username: &str, password: &str) -> Result<()>;

    /// List every record of a kind
    async fn list(&self, token: Option<&str>, kind: ResourceKind) -> Result<ResourceBatch>;

    /// Create records
    async fn create(&self, token: Option<&str>, batch: &ResourceBatch) -> Result<()>;

    /// Update records
    async fn update(&self, token: Option<&str>, batch: &ResourceBatch) -> Result<()>;

    /// Delete records by id
    async fn delete(&self, token: Option<&str>, kind: ResourceKind, ids: &[ResourceId]) -> Result<()>;
}

/// A single call the dispatcher can run in the background
#[derive(Clone, PartialEq)]
pub enum RemoteOperation {
    Authenticate {
        username: String,
        password: String,
    },
    Register {
        email: String,
        username: String,
        password: String,
    },
    List(ResourceKind),
    Update(ResourceBatch),
    Remove {
        kind: ResourceKind,
        ids: Vec<ResourceId>,
    },
    Add(ResourceBatch),
}

impl RemoteOperation {
    pub async fn execute(&self, api: &dyn RemoteApi, token: Option<&str>) -> Result<RemoteOutput> {
        match self {
            Self::Authenticate { username, password } => {
                api.authenticate(username, password).await.map(RemoteOutput::Token)
            }
            Self::Register {
                email,
                username,
                password,
            } => {
                api.register(email, username, password).await?;
                Ok(RemoteOutput::Registered)
            }
            Self::List(kind) => api.list(token, *kind).await.map(RemoteOutput::Listed),
            Self::Update(batch) => {
                api.update(token, batch).await?;
                Ok(RemoteOutput::Applied {
                    kind: batch.kind(),
                    count: batch.len(),
                })
            }
            Self::Remove { kind, ids } => {
                api.delete(token, *kind, ids).await?;
                Ok(RemoteOutput::Applied {
                    kind: *kind,
                    count: ids.len(),
                })
            }
            Self::Add(batch) => {
                api.create(token, batch).await?;
                Ok(RemoteOutput::Applied {
                    kind: batch.kind(),
                    count: batch.len(),
                })
            }
        }
    }
}

// Credentials stay out of logs.
impl fmt::Debug for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticate { username, .. } => write!(f, "authenticate {}", username),
            Self::Register { username, .. } => write!(f, "register {}", username),
            Self::List(kind) => write!(f, "list {}", kind.collection()),
            Self::Update(batch) => write!(f, "update {} {}", batch.kind().collection(), batch.len()),
            Self::Remove { kind, ids } => write!(f, "remove {} {}", kind.collection(), ids.len()),
            Self::Add(batch) => write!(f, "add {} {}", batch.kind().collection(), batch.len()),
        }
    }
}

/// Successful result of a remote job
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutput {
    Token(String),
    Registered,
    Listed(ResourceBatch),
    Applied { kind: ResourceKind, count: usize },
    /// Outputs of a batch job, in submission order
    Batch(Vec<RemoteOutput>),
}
