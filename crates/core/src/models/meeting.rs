//! Meeting (bí cảnh raid) model

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::{ClassCode, JoinRequest, RoleTag};
use crate::error::Error;

/// Upper bound on participants + guests
pub const MAX_ROSTER_SIZE: usize = 25;

/// Meeting lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Draft,
    Confirmed,
    Completed,
    Canceled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Draft => "draft",
            MeetingStatus::Confirmed => "confirmed",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Canceled => "canceled",
        }
    }

    /// Whether an explicit transition from `self` to `next` is defined
    pub fn can_transition_to(&self, next: MeetingStatus) -> bool {
        matches!(
            (self, next),
            (MeetingStatus::Draft, MeetingStatus::Confirmed)
                | (MeetingStatus::Draft, MeetingStatus::Canceled)
                | (MeetingStatus::Confirmed, MeetingStatus::Completed)
                | (MeetingStatus::Confirmed, MeetingStatus::Canceled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MeetingStatus::Completed | MeetingStatus::Canceled)
    }

    /// Join requests are only accepted before confirmation
    pub fn accepts_join_requests(&self) -> bool {
        !matches!(self, MeetingStatus::Confirmed | MeetingStatus::Canceled)
    }
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(MeetingStatus::Draft),
            "confirmed" => Ok(MeetingStatus::Confirmed),
            "completed" => Ok(MeetingStatus::Completed),
            "canceled" => Ok(MeetingStatus::Canceled),
            other => Err(Error::Validation(format!("Unknown meeting status: {}", other))),
        }
    }
}

/// A registered member attached to a meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub member_id: Uuid,
    pub display_name: String,
    pub external_chat_id: Option<String>,
    pub assigned_role: RoleTag,
    pub assigned_class: ClassCode,
    pub position: u32,
}

/// A meeting-scoped attendee outside the member registry; never scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: String,
    pub display_name: String,
    pub external_chat_id: Option<String>,
    pub eligible_roles: Vec<RoleTag>,
    pub eligible_classes: Vec<ClassCode>,
    pub assigned_role: RoleTag,
    pub assigned_class: ClassCode,
    pub position: u32,
}

impl Guest {
    /// Meeting-unique guest id
    pub fn generate_id() -> String {
        format!("guest_{}", Uuid::new_v4().simple())
    }
}

/// The participant chosen to host a confirmed meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HosterRecord {
    pub member_id: Uuid,
    pub display_name: String,
    pub external_chat_id: Option<String>,
    pub assigned_role: RoleTag,
    pub assigned_class: ClassCode,
    /// Selection weight at the time of the draw
    pub score: i64,
    pub selected_at: DateTime<Utc>,
}

/// A scheduled raid with its own roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: MeetingStatus,
    pub participants: Vec<Participant>,
    pub guests: Vec<Guest>,
    pub join_requests: Vec<JoinRequest>,
    pub hoster: Option<HosterRecord>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Meeting {
    pub fn new(title: String, description: String, date: NaiveDate, time: NaiveTime) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            date,
            time,
            status: MeetingStatus::Draft,
            participants: Vec::new(),
            guests: Vec::new(),
            join_requests: Vec::new(),
            hoster: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn roster_len(&self) -> usize {
        self.participants.len() + self.guests.len()
    }

    /// Position for an entry appended to the end of the roster
    pub fn next_position(&self) -> u32 {
        self.roster_len() as u32
    }

    pub fn is_participant(&self, chat_id: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.external_chat_id.as_deref() == Some(chat_id))
    }

    pub fn is_guest(&self, chat_id: &str) -> bool {
        self.guests
            .iter()
            .any(|g| g.external_chat_id.as_deref() == Some(chat_id))
    }

    /// Chat ids of everyone attached to the meeting, participants first
    pub fn roster_chat_ids(&self) -> Vec<String> {
        self.participants
            .iter()
            .filter_map(|p| p.external_chat_id.clone())
            .chain(self.guests.iter().filter_map(|g| g.external_chat_id.clone()))
            .collect()
    }
}

/// Participant as supplied by an admin; position may be left unassigned
///
/// The chat id is always taken from the member record. A blank display
/// name falls back to the member's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDraft {
    pub member_id: Uuid,
    #[serde(default)]
    pub display_name: String,
    pub role: RoleTag,
    pub class: ClassCode,
    #[serde(default)]
    pub position: Option<u32>,
}

/// Guest as supplied by an admin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestDraft {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub external_chat_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleTag>,
    #[serde(default)]
    pub classes: Vec<ClassCode>,
    pub role: RoleTag,
    pub class: ClassCode,
    #[serde(default)]
    pub position: Option<u32>,
}

/// Full meeting contents for create and draft update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingDraft {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub participants: Vec<ParticipantDraft>,
    #[serde(default)]
    pub guests: Vec<GuestDraft>,
}

/// Which roster list an entry belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RosterRef {
    Participant(Uuid),
    Guest(String),
}

/// New position for one roster entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterPosition {
    pub entry: RosterRef,
    pub position: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use MeetingStatus::*;
        assert!(Draft.can_transition_to(Confirmed));
        assert!(Draft.can_transition_to(Canceled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Canceled));

        assert!(!Draft.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Confirmed));
        assert!(!Canceled.can_transition_to(Draft));
        assert!(!Completed.can_transition_to(Canceled));
    }

    #[test]
    fn test_join_window() {
        assert!(MeetingStatus::Draft.accepts_join_requests());
        assert!(MeetingStatus::Completed.accepts_join_requests());
        assert!(!MeetingStatus::Confirmed.accepts_join_requests());
        assert!(!MeetingStatus::Canceled.accepts_join_requests());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("canceled".parse::<MeetingStatus>().unwrap(), MeetingStatus::Canceled);
        assert!("archived".parse::<MeetingStatus>().is_err());
    }
}
