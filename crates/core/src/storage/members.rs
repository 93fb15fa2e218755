//! Member storage operations

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{
    is_unique_violation, join_list, parse_datetime, parse_list, parse_uuid, OptionalExt,
};
use crate::error::{Error, Result};
use crate::models::{Member, MemberKey};

const MEMBER_COLUMNS: &str =
    "id, display_name, external_chat_id, roles, classes, is_active, created_at, updated_at";

pub struct MemberStore<'a> {
    conn: &'a Connection,
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        display_name: row.get(1)?,
        external_chat_id: row.get(2)?,
        eligible_roles: parse_list(&row.get::<_, String>(3)?)?,
        eligible_classes: parse_list(&row.get::<_, String>(4)?)?,
        active: row.get::<_, i32>(5)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(6)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(7)?)?,
    })
}

impl<'a> MemberStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new member
    #[instrument(skip(self, member), fields(member_id = %member.id, name = %member.display_name))]
    pub fn create(&self, member: &Member) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO members (id, display_name, external_chat_id, roles, classes, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    member.id.to_string(),
                    member.display_name,
                    member.external_chat_id,
                    join_list(&member.eligible_roles),
                    join_list(&member.eligible_classes),
                    member.active as i32,
                    member.created_at.to_rfc3339(),
                    member.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| duplicate_chat_id(e, member))?;
        Ok(())
    }

    /// Update a member's editable fields
    #[instrument(skip(self, member), fields(member_id = %member.id))]
    pub fn update(&self, member: &Member) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE members SET display_name = ?1, external_chat_id = ?2, roles = ?3, classes = ?4,
                 is_active = ?5, updated_at = ?6 WHERE id = ?7",
                params![
                    member.display_name,
                    member.external_chat_id,
                    join_list(&member.eligible_roles),
                    join_list(&member.eligible_classes),
                    member.active as i32,
                    Utc::now().to_rfc3339(),
                    member.id.to_string(),
                ],
            )
            .map_err(|e| duplicate_chat_id(e, member))?;
        Ok(rows > 0)
    }

    /// Find a member by id or chat id, active or not
    #[instrument(skip(self))]
    pub fn find(&self, key: &MemberKey) -> Result<Option<Member>> {
        let (sql, value) = match key {
            MemberKey::Id(id) => (
                format!("SELECT {} FROM members WHERE id = ?1", MEMBER_COLUMNS),
                id.to_string(),
            ),
            MemberKey::ExternalChatId(chat_id) => (
                format!("SELECT {} FROM members WHERE external_chat_id = ?1", MEMBER_COLUMNS),
                chat_id.clone(),
            ),
        };

        let member = self
            .conn
            .query_row(&sql, params![value], member_from_row)
            .optional()?;

        Ok(member)
    }

    /// List active members sorted by name
    #[instrument(skip(self))]
    pub fn list_active(&self) -> Result<Vec<Member>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM members WHERE is_active = 1 ORDER BY display_name COLLATE NOCASE",
            MEMBER_COLUMNS
        ))?;

        let members = stmt
            .query_map([], member_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(members)
    }

    /// Soft delete
    #[instrument(skip(self))]
    pub fn deactivate(&self, member_id: Uuid) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE members SET is_active = 0, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), member_id.to_string()],
        )?;
        Ok(rows > 0)
    }
}

fn duplicate_chat_id(e: rusqlite::Error, member: &Member) -> Error {
    if is_unique_violation(&e) {
        Error::Conflict(format!(
            "Chat id {} is already registered to another member",
            member.external_chat_id.as_deref().unwrap_or_default()
        ))
    } else {
        Error::Database(e)
    }
}
