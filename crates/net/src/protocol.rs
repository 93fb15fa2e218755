//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.
//! A connection opens with `Hello`; every later frame is one request
//! answered by exactly one response.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bicanh_core::{
    AdjustOutcome, Confirmation, ErrorKind, HosterRecord, HosterSelection, JoinRequest,
    JoinSubmission, Meeting, MeetingDraft, Member, MemberDraft, MemberKey, Resolution,
    RosterPosition, ScoreRecord, SubmitOutcome,
};

/// Client to server messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Must be the first frame of a connection
    Hello { api_key: String },

    /// Keep-alive, answered without touching storage
    Ping,

    // Member registry
    CreateMember { member: MemberDraft },
    UpdateMember { member_id: Uuid, member: MemberDraft },
    DeactivateMember { member_id: Uuid },
    ListMembers,

    // Meeting lifecycle
    CreateMeeting { meeting: MeetingDraft },
    UpdateMeeting { meeting_id: Uuid, meeting: MeetingDraft },
    ReorderRoster { meeting_id: Uuid, positions: Vec<RosterPosition> },
    GetMeeting { meeting_id: Uuid },
    ListMeetings,
    LatestActiveMeeting,
    LatestConfirmedMeeting,
    ConfirmMeeting { meeting_id: Uuid },
    CancelMeeting { meeting_id: Uuid },
    CompleteMeeting { meeting_id: Uuid },
    DeleteMeeting { meeting_id: Uuid },

    // Join requests
    SubmitJoinRequest { meeting_id: Uuid, submission: JoinSubmission },
    ApproveJoinRequest {
        meeting_id: Uuid,
        external_chat_id: String,
        processed_by: String,
        #[serde(default)]
        reason: Option<String>,
    },
    RejectJoinRequest {
        meeting_id: Uuid,
        external_chat_id: String,
        processed_by: String,
        #[serde(default)]
        reason: Option<String>,
    },
    ListJoinRequests { meeting_id: Uuid },

    // Hoster
    SelectHoster { meeting_id: Uuid },
    SelectHosterForLatestConfirmed,
    GetHoster { meeting_id: Uuid },

    // Score ledger
    AdjustScore {
        member: MemberKey,
        delta: i64,
        reason: String,
        actor: String,
    },
    GetScore { member: MemberKey },
    Leaderboard {
        #[serde(default)]
        limit: Option<u32>,
    },
}

impl Request {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "hello",
            Request::Ping => "ping",
            Request::CreateMember { .. } => "create_member",
            Request::UpdateMember { .. } => "update_member",
            Request::DeactivateMember { .. } => "deactivate_member",
            Request::ListMembers => "list_members",
            Request::CreateMeeting { .. } => "create_meeting",
            Request::UpdateMeeting { .. } => "update_meeting",
            Request::ReorderRoster { .. } => "reorder_roster",
            Request::GetMeeting { .. } => "get_meeting",
            Request::ListMeetings => "list_meetings",
            Request::LatestActiveMeeting => "latest_active_meeting",
            Request::LatestConfirmedMeeting => "latest_confirmed_meeting",
            Request::ConfirmMeeting { .. } => "confirm_meeting",
            Request::CancelMeeting { .. } => "cancel_meeting",
            Request::CompleteMeeting { .. } => "complete_meeting",
            Request::DeleteMeeting { .. } => "delete_meeting",
            Request::SubmitJoinRequest { .. } => "submit_join_request",
            Request::ApproveJoinRequest { .. } => "approve_join_request",
            Request::RejectJoinRequest { .. } => "reject_join_request",
            Request::ListJoinRequests { .. } => "list_join_requests",
            Request::SelectHoster { .. } => "select_hoster",
            Request::SelectHosterForLatestConfirmed => "select_hoster_for_latest_confirmed",
            Request::GetHoster { .. } => "get_hoster",
            Request::AdjustScore { .. } => "adjust_score",
            Request::GetScore { .. } => "get_score",
            Request::Leaderboard { .. } => "leaderboard",
        }
    }
}

/// Server to client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Handshake accepted
    Welcome { server_version: String },

    /// Handshake refused; the server closes the connection
    Rejected { reason: String },

    Pong,

    /// Operation succeeded with nothing to return
    Done,

    Member { member: Member },
    Members { members: Vec<Member> },

    Meeting { meeting: Meeting },
    /// Result of a "latest" query
    MaybeMeeting { meeting: Option<Meeting> },
    Meetings { meetings: Vec<Meeting> },
    Confirmed { confirmation: Confirmation },

    JoinSubmitted { outcome: SubmitOutcome },
    JoinResolved { resolution: Resolution },
    JoinRequests { requests: Vec<JoinRequest> },

    HosterSelected { selection: HosterSelection },
    Hoster { hoster: Option<HosterRecord> },

    ScoreAdjusted { outcome: AdjustOutcome },
    Score { record: ScoreRecord },
    Leaderboard { records: Vec<ScoreRecord> },

    /// Structured operation failure
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn error(err: &bicanh_core::Error) -> Self {
        Response::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Serialize a message to JSON bytes
pub fn to_bytes<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(msg)
}

/// Deserialize a message from JSON bytes
pub fn from_bytes<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bicanh_core::{ClassCode, RoleTag};

    #[test]
    fn test_request_wire_shape() {
        let req = Request::SubmitJoinRequest {
            meeting_id: Uuid::nil(),
            submission: JoinSubmission {
                external_chat_id: "123".into(),
                display_name: "Minh".into(),
                requested_role: RoleTag::Dps,
                requested_class: ClassCode::DaoTong,
            },
        };

        let value: serde_json::Value = serde_json::from_slice(&to_bytes(&req).unwrap()).unwrap();
        assert_eq!(value["type"], "SubmitJoinRequest");
        assert_eq!(value["submission"]["requested_role"], "DPS");
        assert_eq!(value["submission"]["requested_class"], "DT1");
    }

    #[test]
    fn test_member_key_in_request() {
        let json = r#"{"type":"GetScore","member":{"by":"external_chat_id","value":"42"}}"#;
        let req: Request = from_bytes(json.as_bytes()).unwrap();
        match req {
            Request::GetScore { member } => {
                assert_eq!(member, MemberKey::ExternalChatId("42".into()))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{"type":"Leaderboard"}"#;
        let req: Request = from_bytes(json.as_bytes()).unwrap();
        assert!(matches!(req, Request::Leaderboard { limit: None }));
    }

    #[test]
    fn test_error_response() {
        let err = bicanh_core::Error::Conflict("duplicate".into());
        let value: serde_json::Value =
            serde_json::from_slice(&to_bytes(&Response::error(&err)).unwrap()).unwrap();
        assert_eq!(value["type"], "Error");
        assert_eq!(value["kind"], "conflict");
    }
}
