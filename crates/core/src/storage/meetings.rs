//! Meeting storage operations

use chrono::Utc;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use tracing::instrument;
use uuid::Uuid;

use super::join_requests::list_for_meeting;
use super::parse::{
    join_list, parse_date, parse_datetime, parse_enum, parse_list, parse_time, parse_uuid,
    OptionalExt, DATE_FORMAT, TIME_FORMAT,
};
use crate::error::Result;
use crate::models::{Guest, HosterRecord, Meeting, MeetingStatus, Participant};

const MEETING_COLUMNS: &str = "id, title, description, date, time, status, is_active,
     hoster_member_id, hoster_display_name, hoster_chat_id, hoster_role, hoster_class,
     hoster_score, hoster_selected_at, created_at, updated_at";

/// Recency query filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingFilter {
    /// Neither confirmed nor canceled
    Open,
    Confirmed,
}

pub struct MeetingStore<'a> {
    conn: &'a Connection,
}

fn meeting_from_row(row: &Row<'_>) -> rusqlite::Result<Meeting> {
    let hoster = match row.get::<_, Option<String>>(7)? {
        Some(member_id) => Some(HosterRecord {
            member_id: parse_uuid(&member_id)?,
            display_name: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            external_chat_id: row.get(9)?,
            assigned_role: parse_enum(&row.get::<_, String>(10)?)?,
            assigned_class: parse_enum(&row.get::<_, String>(11)?)?,
            score: row.get::<_, Option<i64>>(12)?.unwrap_or_default(),
            selected_at: parse_datetime(&row.get::<_, String>(13)?)?,
        }),
        None => None,
    };

    Ok(Meeting {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date: parse_date(&row.get::<_, String>(3)?)?,
        time: parse_time(&row.get::<_, String>(4)?)?,
        status: parse_enum(&row.get::<_, String>(5)?)?,
        participants: Vec::new(),
        guests: Vec::new(),
        join_requests: Vec::new(),
        hoster,
        active: row.get::<_, i32>(6)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(14)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(15)?)?,
    })
}

fn load_participants(conn: &Connection, meeting_id: Uuid) -> Result<Vec<Participant>> {
    let mut stmt = conn.prepare(
        "SELECT member_id, display_name, external_chat_id, role, class, position
         FROM meeting_participants WHERE meeting_id = ?1 ORDER BY position, rowid",
    )?;

    let participants = stmt
        .query_map(params![meeting_id.to_string()], |row| {
            Ok(Participant {
                member_id: parse_uuid(&row.get::<_, String>(0)?)?,
                display_name: row.get(1)?,
                external_chat_id: row.get(2)?,
                assigned_role: parse_enum(&row.get::<_, String>(3)?)?,
                assigned_class: parse_enum(&row.get::<_, String>(4)?)?,
                position: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(participants)
}

fn load_guests(conn: &Connection, meeting_id: Uuid) -> Result<Vec<Guest>> {
    let mut stmt = conn.prepare(
        "SELECT guest_id, display_name, external_chat_id, roles, classes, role, class, position
         FROM meeting_guests WHERE meeting_id = ?1 ORDER BY position, rowid",
    )?;

    let guests = stmt
        .query_map(params![meeting_id.to_string()], |row| {
            Ok(Guest {
                id: row.get(0)?,
                display_name: row.get(1)?,
                external_chat_id: row.get(2)?,
                eligible_roles: parse_list(&row.get::<_, String>(3)?)?,
                eligible_classes: parse_list(&row.get::<_, String>(4)?)?,
                assigned_role: parse_enum(&row.get::<_, String>(5)?)?,
                assigned_class: parse_enum(&row.get::<_, String>(6)?)?,
                position: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(guests)
}

/// Attach roster and join requests to a bare meeting row
fn hydrate(conn: &Connection, mut meeting: Meeting) -> Result<Meeting> {
    meeting.participants = load_participants(conn, meeting.id)?;
    meeting.guests = load_guests(conn, meeting.id)?;
    meeting.join_requests = list_for_meeting(conn, meeting.id)?;
    Ok(meeting)
}

pub(crate) fn insert_participant(
    conn: &Connection,
    meeting_id: Uuid,
    p: &Participant,
) -> Result<()> {
    conn.execute(
        "INSERT INTO meeting_participants (meeting_id, member_id, display_name, external_chat_id, role, class, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            meeting_id.to_string(),
            p.member_id.to_string(),
            p.display_name,
            p.external_chat_id,
            p.assigned_role.as_str(),
            p.assigned_class.code(),
            p.position,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_guest(conn: &Connection, meeting_id: Uuid, g: &Guest) -> Result<()> {
    conn.execute(
        "INSERT INTO meeting_guests (meeting_id, guest_id, display_name, external_chat_id, roles, classes, role, class, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            meeting_id.to_string(),
            g.id,
            g.display_name,
            g.external_chat_id,
            join_list(&g.eligible_roles),
            join_list(&g.eligible_classes),
            g.assigned_role.as_str(),
            g.assigned_class.code(),
            g.position,
        ],
    )?;
    Ok(())
}

/// Number of participants plus guests currently stored
pub(crate) fn roster_count(conn: &Connection, meeting_id: Uuid) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM meeting_participants WHERE meeting_id = ?1)
              + (SELECT COUNT(*) FROM meeting_guests WHERE meeting_id = ?1)",
        params![meeting_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn write_roster(conn: &Connection, meeting: &Meeting) -> Result<()> {
    let id = meeting.id.to_string();
    conn.execute("DELETE FROM meeting_participants WHERE meeting_id = ?1", params![id])?;
    conn.execute("DELETE FROM meeting_guests WHERE meeting_id = ?1", params![id])?;

    for participant in &meeting.participants {
        insert_participant(conn, meeting.id, participant)?;
    }
    for guest in &meeting.guests {
        insert_guest(conn, meeting.id, guest)?;
    }
    Ok(())
}

impl<'a> MeetingStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a meeting and its roster
    #[instrument(skip(self, meeting), fields(meeting_id = %meeting.id, title = %meeting.title))]
    pub fn create(&self, meeting: &Meeting) -> Result<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO meetings (id, title, description, date, time, status, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                meeting.id.to_string(),
                meeting.title,
                meeting.description,
                meeting.date.format(DATE_FORMAT).to_string(),
                meeting.time.format(TIME_FORMAT).to_string(),
                meeting.status.as_str(),
                meeting.active as i32,
                meeting.created_at.to_rfc3339(),
                meeting.updated_at.to_rfc3339(),
            ],
        )?;
        write_roster(&tx, meeting)?;

        tx.commit()?;
        Ok(())
    }

    /// Find a meeting with roster and join requests
    #[instrument(skip(self))]
    pub fn find(&self, id: Uuid) -> Result<Option<Meeting>> {
        let meeting = self
            .conn
            .query_row(
                &format!("SELECT {} FROM meetings WHERE id = ?1", MEETING_COLUMNS),
                params![id.to_string()],
                meeting_from_row,
            )
            .optional()?;

        meeting.map(|m| hydrate(self.conn, m)).transpose()
    }

    /// Replace the editable fields and roster of a meeting still in `expected` status
    ///
    /// Returns false when the meeting left that status in the meantime.
    #[instrument(skip(self, meeting), fields(meeting_id = %meeting.id))]
    pub fn replace(&self, meeting: &Meeting, expected: MeetingStatus) -> Result<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let rows = tx.execute(
            "UPDATE meetings SET title = ?1, description = ?2, date = ?3, time = ?4, updated_at = ?5
             WHERE id = ?6 AND status = ?7 AND is_active = 1",
            params![
                meeting.title,
                meeting.description,
                meeting.date.format(DATE_FORMAT).to_string(),
                meeting.time.format(TIME_FORMAT).to_string(),
                Utc::now().to_rfc3339(),
                meeting.id.to_string(),
                expected.as_str(),
            ],
        )?;
        if rows == 0 {
            return Ok(false);
        }

        write_roster(&tx, meeting)?;
        tx.commit()?;
        Ok(true)
    }

    /// Compare-and-set the status; false if the stored status was not `from`
    #[instrument(skip(self))]
    pub fn transition(&self, id: Uuid, from: MeetingStatus, to: MeetingStatus) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE meetings SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4 AND is_active = 1",
            params![to.as_str(), Utc::now().to_rfc3339(), id.to_string(), from.as_str()],
        )?;
        Ok(rows > 0)
    }

    /// Record the hoster unless one is already set; false means another caller won
    #[instrument(skip(self, hoster), fields(member_id = %hoster.member_id))]
    pub fn set_hoster_if_absent(&self, id: Uuid, hoster: &HosterRecord) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE meetings SET hoster_member_id = ?1, hoster_display_name = ?2, hoster_chat_id = ?3,
             hoster_role = ?4, hoster_class = ?5, hoster_score = ?6, hoster_selected_at = ?7, updated_at = ?7
             WHERE id = ?8 AND hoster_member_id IS NULL AND status = 'confirmed'",
            params![
                hoster.member_id.to_string(),
                hoster.display_name,
                hoster.external_chat_id,
                hoster.assigned_role.as_str(),
                hoster.assigned_class.code(),
                hoster.score,
                hoster.selected_at.to_rfc3339(),
                id.to_string(),
            ],
        )?;
        Ok(rows > 0)
    }

    /// Soft delete
    #[instrument(skip(self))]
    pub fn deactivate(&self, id: Uuid) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE meetings SET is_active = 0, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// Active meetings, newest first
    #[instrument(skip(self))]
    pub fn list_active(&self) -> Result<Vec<Meeting>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM meetings WHERE is_active = 1 ORDER BY created_at DESC, rowid DESC",
            MEETING_COLUMNS
        ))?;

        let meetings = stmt
            .query_map([], meeting_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        meetings.into_iter().map(|m| hydrate(self.conn, m)).collect()
    }

    /// Most recently created active meeting matching the filter
    #[instrument(skip(self))]
    pub fn latest(&self, filter: MeetingFilter) -> Result<Option<Meeting>> {
        let condition = match filter {
            MeetingFilter::Open => "status NOT IN ('confirmed', 'canceled')",
            MeetingFilter::Confirmed => "status = 'confirmed'",
        };

        let meeting = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM meetings WHERE is_active = 1 AND {}
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    MEETING_COLUMNS, condition
                ),
                [],
                meeting_from_row,
            )
            .optional()?;

        meeting.map(|m| hydrate(self.conn, m)).transpose()
    }
}
