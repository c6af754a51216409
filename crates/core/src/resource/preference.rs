//! Per-card preferences

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Resource, ResourceId, ResourceKind, Task};
use crate::error::Error;
use crate::Result;

/// Display preferences of a card. Exactly one exists per card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub id: ResourceId,
    pub card_id: ResourceId,
    /// Task age after which it is flagged as a warning, whole seconds
    #[serde(with = "duration_secs")]
    warning_time: Option<Duration>,
    /// Task age after which it is flagged as danger, whole seconds
    #[serde(with = "duration_secs")]
    danger_time: Option<Duration>,
    pub show_date: bool,
}

impl Preference {
    /// Default preference for a freshly created card
    pub fn new(id: ResourceId, card_id: ResourceId) -> Self {
        Self {
            id,
            card_id,
            warning_time: None,
            danger_time: None,
            show_date: false,
        }
    }

    pub fn warning_time(&self) -> Option<Duration> {
        self.warning_time
    }

    pub fn danger_time(&self) -> Option<Duration> {
        self.danger_time
    }

    /// Apply an update. Durations are truncated to whole seconds.
    pub fn apply(&mut self, update: PreferenceUpdate) {
        match update {
            PreferenceUpdate::WarningTime(value) => self.warning_time = value.map(whole_secs),
            PreferenceUpdate::DangerTime(value) => self.danger_time = value.map(whole_secs),
            PreferenceUpdate::ShowDate(value) => self.show_date = value,
        }
    }

    /// Classify a task of this card by its age at `now`
    pub fn urgency(&self, task: &Task, now: DateTime<Utc>) -> Urgency {
        let age = (now - task.created_at()).to_std().unwrap_or(Duration::ZERO);
        if self.danger_time.is_some_and(|limit| age >= limit) {
            Urgency::Danger
        } else if self.warning_time.is_some_and(|limit| age >= limit) {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }
}

impl Resource for Preference {
    const KIND: ResourceKind = ResourceKind::Preference;

    fn id(&self) -> ResourceId {
        self.id
    }
}

/// How overdue a task is according to its card's preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Normal,
    Warning,
    Danger,
}

/// Name of an updatable preference field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceField {
    WarningTime,
    DangerTime,
    ShowDate,
}

impl PreferenceField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WarningTime => "warning_time",
            Self::DangerTime => "danger_time",
            Self::ShowDate => "show_date",
        }
    }
}

impl fmt::Display for PreferenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferenceField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "warning_time" => Ok(Self::WarningTime),
            "danger_time" => Ok(Self::DangerTime),
            "show_date" => Ok(Self::ShowDate),
            other => Err(Error::UnknownPreferenceField(other.to_string())),
        }
    }
}

/// A single preference field assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceUpdate {
    WarningTime(Option<Duration>),
    DangerTime(Option<Duration>),
    ShowDate(bool),
}

impl PreferenceUpdate {
    pub fn field(&self) -> PreferenceField {
        match self {
            Self::WarningTime(_) => PreferenceField::WarningTime,
            Self::DangerTime(_) => PreferenceField::DangerTime,
            Self::ShowDate(_) => PreferenceField::ShowDate,
        }
    }

    /// Parse a textual value for `field`.
    ///
    /// Durations are whole seconds, `none` clears them. Flags accept
    /// `true/false`, `yes/no`, `on/off` and `1/0`.
    pub fn parse(field: PreferenceField, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || Error::InvalidPreferenceValue {
            field: field.to_string(),
            value: raw.to_string(),
        };

        match field {
            PreferenceField::WarningTime | PreferenceField::DangerTime => {
                let value = match raw.to_ascii_lowercase().as_str() {
                    "" | "none" | "null" => None,
                    secs => Some(Duration::from_secs(secs.parse().map_err(|_| invalid())?)),
                };
                Ok(if field == PreferenceField::WarningTime {
                    Self::WarningTime(value)
                } else {
                    Self::DangerTime(value)
                })
            }
            PreferenceField::ShowDate => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Self::ShowDate(true)),
                "0" | "false" | "no" | "off" => Ok(Self::ShowDate(false)),
                _ => Err(invalid()),
            },
        }
    }
}

fn whole_secs(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}

/// Serde helper storing an optional duration as whole seconds
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
