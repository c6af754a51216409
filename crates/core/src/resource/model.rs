//! Resource model definitions
//!
//! Field names match the JSON used both on disk and on the wire.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::preference::Preference;
use crate::error::Error;
use crate::Result;

/// Identifier of a resource, unique within its kind. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ResourceId(u64);

impl ResourceId {
    /// Create an id, rejecting zero
    pub fn new(raw: u64) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub(crate) const FIRST: ResourceId = ResourceId(1);
}

impl TryFrom<u64> for ResourceId {
    type Error = String;

    fn try_from(raw: u64) -> std::result::Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| "resource id must be positive".to_string())
    }
}

impl From<ResourceId> for u64 {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Card,
    Task,
    Preference,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Card, Self::Task, Self::Preference];

    /// Collection name used in REST routes and snapshot keys
    pub fn collection(self) -> &'static str {
        match self {
            Self::Card => "cards",
            Self::Task => "tasks",
            Self::Preference => "preferences",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Card => "card",
            Self::Task => "task",
            Self::Preference => "preference",
        };
        f.write_str(name)
    }
}

/// Common behaviour of cards, tasks and preferences
pub trait Resource: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned {
    const KIND: ResourceKind;

    fn id(&self) -> ResourceId;

    /// Serialize to a plain JSON object
    fn to_wire(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a JSON object, failing on missing or mistyped fields
    fn from_wire(data: &Value) -> Result<Self> {
        if !data.is_object() {
            return Err(Error::malformed(Self::KIND, "expected a JSON object"));
        }
        Self::deserialize(data).map_err(|e| Error::malformed(Self::KIND, e.to_string()))
    }
}

/// A card (a column of the board)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: ResourceId,
    pub name: String,
    pub position: usize,
}

impl Card {
    pub fn new(id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: 0,
        }
    }

    /// Set position
    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }
}

impl Resource for Card {
    const KIND: ResourceKind = ResourceKind::Card;

    fn id(&self) -> ResourceId {
        self.id
    }
}

/// A task inside a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: ResourceId,
    pub description: String,
    pub card_id: ResourceId,
    pub position: usize,
    /// Millisecond precision; set through [`Task::with_created_at`]
    #[serde(rename = "created", with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task stamped with the current time
    pub fn new(id: ResourceId, card_id: ResourceId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            card_id,
            position: 0,
            created_at: Utc::now().trunc_subsecs(3),
        }
    }

    /// Set position
    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Set creation time, truncated to milliseconds
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at.trunc_subsecs(3);
        self
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Resource for Task {
    const KIND: ResourceKind = ResourceKind::Task;

    fn id(&self) -> ResourceId {
        self.id
    }
}

/// A homogeneous list of records, the payload of a batched remote call
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceBatch {
    Cards(Vec<Card>),
    Tasks(Vec<Task>),
    Preferences(Vec<Preference>),
}

impl ResourceBatch {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Cards(_) => ResourceKind::Card,
            Self::Tasks(_) => ResourceKind::Task,
            Self::Preferences(_) => ResourceKind::Preference,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Cards(cards) => cards.len(),
            Self::Tasks(tasks) => tasks.len(),
            Self::Preferences(prefs) => prefs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to a JSON array of wire objects
    pub fn to_wire(&self) -> Result<Value> {
        let items = match self {
            Self::Cards(cards) => records_to_wire(cards)?,
            Self::Tasks(tasks) => records_to_wire(tasks)?,
            Self::Preferences(prefs) => records_to_wire(prefs)?,
        };
        Ok(Value::Array(items))
    }

    /// Parse a JSON array of wire objects of the given kind
    pub fn from_wire(kind: ResourceKind, data: &Value) -> Result<Self> {
        Ok(match kind {
            ResourceKind::Card => Self::Cards(records_from_wire(data)?),
            ResourceKind::Task => Self::Tasks(records_from_wire(data)?),
            ResourceKind::Preference => Self::Preferences(records_from_wire(data)?),
        })
    }
}

fn records_to_wire<R: Resource>(records: &[R]) -> Result<Vec<Value>> {
    records.iter().map(R::to_wire).collect()
}

/// Parse a JSON array into typed records
pub fn records_from_wire<R: Resource>(data: &Value) -> Result<Vec<R>> {
    let items = data
        .as_array()
        .ok_or_else(|| Error::malformed(R::KIND, "expected a JSON array"))?;
    items.iter().map(R::from_wire).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn id(raw: u64) -> ResourceId {
        ResourceId::new(raw).unwrap()
    }

    #[test]
    fn test_resource_id_rejects_zero() {
        assert!(ResourceId::new(0).is_none());
        assert_eq!(ResourceId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn test_card_round_trip() {
        let card = Card::new(id(3), "Work").with_position(2);
        let wire = card.to_wire().unwrap();
        assert_eq!(wire, json!({"id": 3, "name": "Work", "position": 2}));
        assert_eq!(Card::from_wire(&wire).unwrap(), card);
    }

    #[test]
    fn test_task_round_trip() {
        let task = Task::new(id(1), id(4), "Write report").with_position(1);
        let wire = task.to_wire().unwrap();
        assert_eq!(wire["created"], json!(task.created_at.timestamp_millis()));
        assert_eq!(wire["card_id"], json!(4));
        assert_eq!(Task::from_wire(&wire).unwrap(), task);
    }

    #[test]
    fn test_task_created_at_keeps_milliseconds() {
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let task = Task::new(id(1), id(4), "Write report").with_created_at(precise);
        assert_eq!(task.created_at().timestamp_subsec_nanos(), 123_000_000);

        let wire = task.to_wire().unwrap();
        assert_eq!(wire["created"], json!(1_700_000_000_123i64));
        assert_eq!(Task::from_wire(&wire).unwrap(), task);
    }

    #[test]
    fn test_from_wire_missing_field() {
        let err = Card::from_wire(&json!({"id": 1, "position": 0})).unwrap_err();
        match err {
            Error::MalformedResource { kind, reason } => {
                assert_eq!(kind, ResourceKind::Card);
                assert!(reason.contains("name"));
            }
            e => panic!("Expected MalformedResource error, got: {:?}", e),
        }
    }

    #[test]
    fn test_from_wire_wrong_type() {
        let data = json!({"id": 1, "description": 12, "card_id": 1, "position": 0, "created": 0});
        assert!(matches!(
            Task::from_wire(&data),
            Err(Error::MalformedResource { kind: ResourceKind::Task, .. })
        ));
        assert!(Card::from_wire(&json!([1, 2])).is_err());
        assert!(Card::from_wire(&json!({"id": 0, "name": "x", "position": 0})).is_err());
    }

    #[test]
    fn test_batch_from_wire() {
        let data = json!([
            {"id": 1, "name": "Todo", "position": 0},
            {"id": 2, "name": "Done", "position": 1}
        ]);
        let batch = ResourceBatch::from_wire(ResourceKind::Card, &data).unwrap();
        assert_eq!(batch.kind(), ResourceKind::Card);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.to_wire().unwrap(), data);

        assert!(ResourceBatch::from_wire(ResourceKind::Task, &json!({})).is_err());
    }
}
