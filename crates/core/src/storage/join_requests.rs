//! Join request storage operations

use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use tracing::instrument;
use uuid::Uuid;

use super::meetings::{insert_guest, insert_participant, roster_count};
use super::parse::{
    is_unique_violation, parse_datetime, parse_datetime_opt, parse_enum, parse_uuid, OptionalExt,
};
use crate::error::{Error, Result};
use crate::models::{Admission, JoinRequest, MAX_ROSTER_SIZE};

const REQUEST_COLUMNS: &str = "id, meeting_id, external_chat_id, display_name, requested_role,
     requested_class, status, requested_at, processed_at, processed_by, reason";

pub struct JoinRequestStore<'a> {
    conn: &'a Connection,
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<JoinRequest> {
    Ok(JoinRequest {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        meeting_id: parse_uuid(&row.get::<_, String>(1)?)?,
        external_chat_id: row.get(2)?,
        display_name: row.get(3)?,
        requested_role: parse_enum(&row.get::<_, String>(4)?)?,
        requested_class: parse_enum(&row.get::<_, String>(5)?)?,
        status: parse_enum(&row.get::<_, String>(6)?)?,
        requested_at: parse_datetime(&row.get::<_, String>(7)?)?,
        processed_at: parse_datetime_opt(row.get::<_, Option<String>>(8)?)?,
        processed_by: row.get(9)?,
        reason: row.get(10)?,
    })
}

/// All requests for a meeting, oldest first
pub(crate) fn list_for_meeting(conn: &Connection, meeting_id: Uuid) -> Result<Vec<JoinRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM join_requests WHERE meeting_id = ?1 ORDER BY requested_at, rowid",
        REQUEST_COLUMNS
    ))?;

    let requests = stmt
        .query_map(params![meeting_id.to_string()], request_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(requests)
}

impl<'a> JoinRequestStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a pending request
    ///
    /// The partial unique index turns a concurrent duplicate into `Conflict`.
    #[instrument(
        skip(self, request),
        fields(meeting_id = %request.meeting_id, chat_id = %request.external_chat_id)
    )]
    pub fn insert(&self, request: &JoinRequest) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO join_requests (id, meeting_id, external_chat_id, display_name, requested_role,
                 requested_class, status, requested_at, processed_at, processed_by, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    request.id.to_string(),
                    request.meeting_id.to_string(),
                    request.external_chat_id,
                    request.display_name,
                    request.requested_role.as_str(),
                    request.requested_class.code(),
                    request.status.as_str(),
                    request.requested_at.to_rfc3339(),
                    request.processed_at.map(|t| t.to_rfc3339()),
                    request.processed_by,
                    request.reason,
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::Conflict("A pending request for this meeting already exists".into())
                } else {
                    Error::Database(e)
                }
            })?;
        Ok(())
    }

    /// Find the pending request of a requester on a meeting
    #[instrument(skip(self))]
    pub fn find_pending(&self, meeting_id: Uuid, chat_id: &str) -> Result<Option<JoinRequest>> {
        let request = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM join_requests
                     WHERE meeting_id = ?1 AND external_chat_id = ?2 AND status = 'pending'",
                    REQUEST_COLUMNS
                ),
                params![meeting_id.to_string(), chat_id],
                request_from_row,
            )
            .optional()?;
        Ok(request)
    }

    #[instrument(skip(self))]
    pub fn list(&self, meeting_id: Uuid) -> Result<Vec<JoinRequest>> {
        list_for_meeting(self.conn, meeting_id)
    }

    /// Stamp a pending request as processed and apply its roster admission
    ///
    /// The admitted entry is appended at the current roster length.
    /// Returns false if the request was no longer pending.
    #[instrument(
        skip(self, request, admission),
        fields(request_id = %request.id, status = request.status.as_str())
    )]
    pub fn resolve(&self, request: &JoinRequest, admission: Option<&Admission>) -> Result<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let rows = tx.execute(
            "UPDATE join_requests SET status = ?1, processed_at = ?2, processed_by = ?3, reason = ?4
             WHERE id = ?5 AND status = 'pending'",
            params![
                request.status.as_str(),
                request.processed_at.map(|t| t.to_rfc3339()),
                request.processed_by,
                request.reason,
                request.id.to_string(),
            ],
        )?;
        if rows == 0 {
            return Ok(false);
        }

        if let Some(admission) = admission {
            let count = roster_count(&tx, request.meeting_id)?;
            if count >= MAX_ROSTER_SIZE {
                return Err(Error::CapacityExceeded(format!(
                    "Meeting roster is limited to {} entries",
                    MAX_ROSTER_SIZE
                )));
            }

            match admission {
                Admission::Participant(p) => {
                    let mut p = p.clone();
                    p.position = count as u32;
                    insert_participant(&tx, request.meeting_id, &p)
                        .map_err(|e| already_on_roster(e, &request.external_chat_id))?
                }
                Admission::Guest(g) => {
                    let mut g = g.clone();
                    g.position = count as u32;
                    insert_guest(&tx, request.meeting_id, &g)?
                }
            }
        }

        tx.commit()?;
        Ok(true)
    }
}

fn already_on_roster(e: Error, chat_id: &str) -> Error {
    match e {
        Error::Database(ref sql) if is_unique_violation(sql) => {
            Error::Conflict(format!("{} is already a participant", chat_id))
        }
        other => other,
    }
}
