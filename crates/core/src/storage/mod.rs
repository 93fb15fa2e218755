//! SQLite storage layer for Bí Cảnh

mod join_requests;
mod meetings;
mod members;
mod migrations;
mod parse;
mod scores;
mod traits;

use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AdjustOutcome, Adjustment, Admission, HosterRecord, JoinRequest, Meeting, MeetingStatus,
    Member, MemberKey, ScoreRecord,
};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

pub use join_requests::JoinRequestStore;
pub use meetings::{MeetingFilter, MeetingStore};
pub use members::MemberStore;
pub use scores::ScoreStore;
pub use traits::{
    JoinRequestRepository, MeetingRepository, MemberRepository, ScoreRepository, Storage,
};

/// How long a writer waits on another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        migrations::get_current_version(&self.conn).unwrap_or(0)
    }

    pub fn members(&self) -> MemberStore<'_> {
        MemberStore::new(&self.conn)
    }

    pub fn scores(&self) -> ScoreStore<'_> {
        ScoreStore::new(&self.conn)
    }

    pub fn meetings(&self) -> MeetingStore<'_> {
        MeetingStore::new(&self.conn)
    }

    pub fn join_requests(&self) -> JoinRequestStore<'_> {
        JoinRequestStore::new(&self.conn)
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl MemberRepository for Database {
    fn create_member(&self, member: &Member) -> Result<()> {
        self.members().create(member)
    }

    fn update_member(&self, member: &Member) -> Result<bool> {
        self.members().update(member)
    }

    fn find_member(&self, key: &MemberKey) -> Result<Option<Member>> {
        self.members().find(key)
    }

    fn list_active_members(&self) -> Result<Vec<Member>> {
        self.members().list_active()
    }

    fn deactivate_member(&self, member_id: Uuid) -> Result<bool> {
        self.members().deactivate(member_id)
    }
}

impl ScoreRepository for Database {
    fn find_score(&self, member_id: Uuid) -> Result<Option<ScoreRecord>> {
        self.scores().find(member_id)
    }

    fn find_score_by_chat_id(&self, chat_id: &str) -> Result<Option<ScoreRecord>> {
        self.scores().find_by_chat_id(chat_id)
    }

    fn score_balance(&self, member_id: Uuid) -> Result<Option<i64>> {
        self.scores().balance(member_id)
    }

    fn apply_adjustment(&self, member: &Member, adjustment: &Adjustment) -> Result<AdjustOutcome> {
        self.scores().apply(member, adjustment)
    }

    fn leaderboard(&self, limit: Option<u32>) -> Result<Vec<ScoreRecord>> {
        self.scores().leaderboard(limit)
    }
}

impl MeetingRepository for Database {
    fn create_meeting(&self, meeting: &Meeting) -> Result<()> {
        self.meetings().create(meeting)
    }

    fn find_meeting(&self, id: Uuid) -> Result<Option<Meeting>> {
        self.meetings().find(id)
    }

    fn replace_meeting(&self, meeting: &Meeting, expected: MeetingStatus) -> Result<bool> {
        self.meetings().replace(meeting, expected)
    }

    fn transition_meeting(&self, id: Uuid, from: MeetingStatus, to: MeetingStatus) -> Result<bool> {
        self.meetings().transition(id, from, to)
    }

    fn set_hoster_if_absent(&self, id: Uuid, hoster: &HosterRecord) -> Result<bool> {
        self.meetings().set_hoster_if_absent(id, hoster)
    }

    fn deactivate_meeting(&self, id: Uuid) -> Result<bool> {
        self.meetings().deactivate(id)
    }

    fn list_active_meetings(&self) -> Result<Vec<Meeting>> {
        self.meetings().list_active()
    }

    fn latest_meeting(&self, filter: MeetingFilter) -> Result<Option<Meeting>> {
        self.meetings().latest(filter)
    }
}

impl JoinRequestRepository for Database {
    fn insert_join_request(&self, request: &JoinRequest) -> Result<()> {
        self.join_requests().insert(request)
    }

    fn find_pending_request(&self, meeting_id: Uuid, chat_id: &str) -> Result<Option<JoinRequest>> {
        self.join_requests().find_pending(meeting_id, chat_id)
    }

    fn list_join_requests(&self, meeting_id: Uuid) -> Result<Vec<JoinRequest>> {
        self.join_requests().list(meeting_id)
    }

    fn resolve_join_request(
        &self,
        request: &JoinRequest,
        admission: Option<&Admission>,
    ) -> Result<bool> {
        self.join_requests().resolve(request, admission)
    }
}
