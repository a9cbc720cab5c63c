//! Events recorded while the remote backend could not be reached

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::session::GameMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    Score,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Progress, EventKind::Score];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Score => "score",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "progress" => Some(Self::Progress),
            "score" => Some(Self::Score),
            _ => None,
        }
    }
}

/// Pending until the backend acknowledges it, then synced for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
}

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub user_id: String,
    pub question_id: String,
    pub answer: String,
    pub correct: bool,
    pub time_spent: f64,
}

/// Result of a finished game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEvent {
    pub user_id: String,
    pub game_mode: GameMode,
    pub score: u64,
    pub xp_earned: u64,
    pub questions_answered: u32,
    pub correct_answers: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Progress(ProgressEvent),
    Score(ScoreEvent),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Progress(_) => EventKind::Progress,
            Self::Score(_) => EventKind::Score,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::Progress(p) => &p.user_id,
            Self::Score(s) => &s.user_id,
        }
    }

    pub(crate) fn to_json(&self) -> Result<String> {
        Ok(match self {
            Self::Progress(p) => serde_json::to_string(p)?,
            Self::Score(s) => serde_json::to_string(s)?,
        })
    }

    pub(crate) fn from_json(kind: EventKind, json: &str) -> Result<Self> {
        Ok(match kind {
            EventKind::Progress => Self::Progress(serde_json::from_str(json)?),
            EventKind::Score => Self::Score(serde_json::from_str(json)?),
        })
    }
}

impl From<ProgressEvent> for EventPayload {
    fn from(event: ProgressEvent) -> Self {
        Self::Progress(event)
    }
}

impl From<ScoreEvent> for EventPayload {
    fn from(event: ScoreEvent) -> Self {
        Self::Score(event)
    }
}

/// An event as stored in the local queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    /// Assigned by the store, strictly increasing
    pub id: i64,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    pub status: SyncStatus,
}

impl QueuedEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn is_synced(&self) -> bool {
        self.status == SyncStatus::Synced
    }

    /// JSON body posted to the backend: the payload fields plus queue metadata
    pub fn wire_body(&self) -> Result<Value> {
        let mut body = serde_json::to_value(&self.payload)?;
        if let Value::Object(map) = &mut body {
            map.insert("id".into(), Value::from(self.id));
            map.insert("timestamp".into(), Value::from(self.timestamp.timestamp_millis()));
            map.insert("synced".into(), Value::from(self.is_synced()));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_body_is_camel_case_with_metadata() {
        let event = QueuedEvent {
            id: 7,
            payload: ProgressEvent {
                user_id: "u1".into(),
                question_id: "basic_001".into(),
                answer: "13".into(),
                correct: true,
                time_spent: 8.5,
            }
            .into(),
            timestamp: Utc::now(),
            status: SyncStatus::Pending,
        };

        let body = event.wire_body().unwrap();
        assert_eq!(body["userId"], "u1");
        assert_eq!(body["questionId"], "basic_001");
        assert_eq!(body["timeSpent"], 8.5);
        assert_eq!(body["id"], 7);
        assert_eq!(body["synced"], false);
        assert!(body["timestamp"].is_i64());
    }

    #[test]
    fn test_score_payload_roundtrip() {
        let payload: EventPayload = ScoreEvent {
            user_id: "u2".into(),
            game_mode: GameMode::QuickBattle,
            score: 120,
            xp_earned: 120,
            questions_answered: 5,
            correct_answers: 4,
        }
        .into();

        let json = payload.to_json().unwrap();
        assert!(json.contains("\"gameMode\":\"quick_battle\""));
        let back = EventPayload::from_json(EventKind::Score, &json).unwrap();
        assert_eq!(back, payload);
        assert_eq!(back.kind(), EventKind::Score);
    }
}
