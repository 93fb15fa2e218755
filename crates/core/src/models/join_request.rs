//! Join request model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::{ClassCode, Guest, Participant, RoleTag};
use crate::error::Error;

/// Admission state of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Approved => "approved",
            JoinRequestStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for JoinRequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JoinRequestStatus::Pending),
            "approved" => Ok(JoinRequestStatus::Approved),
            "rejected" => Ok(JoinRequestStatus::Rejected),
            other => Err(Error::Validation(format!("Unknown join request status: {}", other))),
        }
    }
}

/// A request from a chat user to be attached to a meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub external_chat_id: String,
    pub display_name: String,
    pub requested_role: RoleTag,
    pub requested_class: ClassCode,
    pub status: JoinRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub reason: Option<String>,
}

impl JoinRequest {
    pub fn new(meeting_id: Uuid, submission: &JoinSubmission) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_id,
            external_chat_id: submission.external_chat_id.clone(),
            display_name: submission.display_name.clone(),
            requested_role: submission.requested_role,
            requested_class: submission.requested_class,
            status: JoinRequestStatus::Pending,
            requested_at: Utc::now(),
            processed_at: None,
            processed_by: None,
            reason: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == JoinRequestStatus::Pending
    }

    /// Move a pending request to its terminal state
    pub fn resolve(&mut self, decision: JoinDecision, processed_by: &str, reason: Option<String>) {
        self.status = match decision {
            JoinDecision::Approve => JoinRequestStatus::Approved,
            JoinDecision::Reject => JoinRequestStatus::Rejected,
        };
        self.processed_at = Some(Utc::now());
        self.processed_by = Some(processed_by.to_string());
        self.reason = reason;
    }
}

/// What the chat bot sends when a user asks to join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSubmission {
    pub external_chat_id: String,
    pub display_name: String,
    pub requested_role: RoleTag,
    pub requested_class: ClassCode,
}

/// Admin decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinDecision {
    Approve,
    Reject,
}

/// Roster entry produced by approving a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "as", rename_all = "snake_case")]
pub enum Admission {
    Participant(Participant),
    Guest(Guest),
}

impl Admission {
    pub fn position(&self) -> u32 {
        match self {
            Admission::Participant(p) => p.position,
            Admission::Guest(g) => g.position,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Admission::Guest(_))
    }
}

/// Approved or rejected request together with any roster change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub request: JoinRequest,
    pub admission: Option<Admission>,
}

/// Result of a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub request: JoinRequest,
    pub meeting_title: String,
    pub new_member_created: bool,
}
