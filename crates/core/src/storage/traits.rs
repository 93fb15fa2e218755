//! Storage repository traits
//!
//! These traits define the storage interface, allowing for different
//! implementations (SQLite, mock, future network backend).

use uuid::Uuid;

use super::MeetingFilter;
use crate::error::Result;
use crate::models::{
    AdjustOutcome, Adjustment, Admission, HosterRecord, JoinRequest, Meeting, MeetingStatus,
    Member, MemberKey, ScoreRecord,
};

/// Member registry operations
pub trait MemberRepository {
    /// Create a new member
    fn create_member(&self, member: &Member) -> Result<()>;

    /// Overwrite a member's fields; false if it does not exist
    fn update_member(&self, member: &Member) -> Result<bool>;

    /// Find a member by id or chat id, including inactive ones
    fn find_member(&self, key: &MemberKey) -> Result<Option<Member>>;

    /// List active members by name
    fn list_active_members(&self) -> Result<Vec<Member>>;

    /// Soft delete a member
    fn deactivate_member(&self, member_id: Uuid) -> Result<bool>;
}

/// Score ledger operations
pub trait ScoreRepository {
    /// Find a score record with history
    fn find_score(&self, member_id: Uuid) -> Result<Option<ScoreRecord>>;

    /// Find a score record by chat id
    fn find_score_by_chat_id(&self, chat_id: &str) -> Result<Option<ScoreRecord>>;

    /// Current balance, if a record exists
    fn score_balance(&self, member_id: Uuid) -> Result<Option<i64>>;

    /// Atomically seed (if needed) and adjust a member's balance
    fn apply_adjustment(&self, member: &Member, adjustment: &Adjustment) -> Result<AdjustOutcome>;

    /// Records in leaderboard order, without history
    fn leaderboard(&self, limit: Option<u32>) -> Result<Vec<ScoreRecord>>;
}

/// Meeting operations
pub trait MeetingRepository {
    /// Create a meeting with its roster
    fn create_meeting(&self, meeting: &Meeting) -> Result<()>;

    /// Find a meeting by ID
    fn find_meeting(&self, id: Uuid) -> Result<Option<Meeting>>;

    /// Replace editable fields and roster while the meeting is in `expected` status
    fn replace_meeting(&self, meeting: &Meeting, expected: MeetingStatus) -> Result<bool>;

    /// Compare-and-set the meeting status
    fn transition_meeting(&self, id: Uuid, from: MeetingStatus, to: MeetingStatus) -> Result<bool>;

    /// Set the hoster once
    fn set_hoster_if_absent(&self, id: Uuid, hoster: &HosterRecord) -> Result<bool>;

    /// Soft delete a meeting
    fn deactivate_meeting(&self, id: Uuid) -> Result<bool>;

    /// Active meetings, newest first
    fn list_active_meetings(&self) -> Result<Vec<Meeting>>;

    /// Newest active meeting matching a filter
    fn latest_meeting(&self, filter: MeetingFilter) -> Result<Option<Meeting>>;
}

/// Join request operations
pub trait JoinRequestRepository {
    /// Insert a pending request
    fn insert_join_request(&self, request: &JoinRequest) -> Result<()>;

    /// Find a requester's pending request
    fn find_pending_request(&self, meeting_id: Uuid, chat_id: &str) -> Result<Option<JoinRequest>>;

    /// List a meeting's requests
    fn list_join_requests(&self, meeting_id: Uuid) -> Result<Vec<JoinRequest>>;

    /// Persist a processed request together with its roster admission
    fn resolve_join_request(
        &self,
        request: &JoinRequest,
        admission: Option<&Admission>,
    ) -> Result<bool>;
}

/// Combined storage interface
///
/// Provides access to all repository operations.
/// Implementations may be backed by SQLite or mocks.
pub trait Storage: MemberRepository + ScoreRepository + MeetingRepository + JoinRequestRepository {}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where
    T: MemberRepository + ScoreRepository + MeetingRepository + JoinRequestRepository
{
}
