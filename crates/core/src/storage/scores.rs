//! Score ledger storage operations

use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::{AdjustOutcome, Adjustment, Member, Modification, ScoreRecord};

const RECORD_COLUMNS: &str =
    "member_id, external_chat_id, display_name, balance, meetings_credited, last_updated";

pub struct ScoreStore<'a> {
    conn: &'a Connection,
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ScoreRecord> {
    Ok(ScoreRecord {
        member_id: parse_uuid(&row.get::<_, String>(0)?)?,
        external_chat_id: row.get(1)?,
        display_name: row.get(2)?,
        balance: row.get(3)?,
        meetings_credited: row.get(4)?,
        last_updated: parse_datetime(&row.get::<_, String>(5)?)?,
        history: Vec::new(),
    })
}

fn load_history(conn: &Connection, member_id: Uuid) -> Result<Vec<Modification>> {
    let mut stmt = conn.prepare(
        "SELECT delta, balance_before, balance_after, reason, actor, created_at
         FROM score_modifications WHERE member_id = ?1 ORDER BY seq",
    )?;

    let history = stmt
        .query_map(params![member_id.to_string()], |row| {
            Ok(Modification {
                delta: row.get(0)?,
                balance_before: row.get(1)?,
                balance_after: row.get(2)?,
                reason: row.get(3)?,
                actor: row.get(4)?,
                timestamp: parse_datetime(&row.get::<_, String>(5)?)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(history)
}

fn load_record(conn: &Connection, member_id: Uuid) -> Result<Option<ScoreRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM score_records WHERE member_id = ?1", RECORD_COLUMNS),
            params![member_id.to_string()],
            record_from_row,
        )
        .optional()?;

    match record {
        Some(mut record) => {
            record.history = load_history(conn, member_id)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

fn insert_record(conn: &Connection, record: &ScoreRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO score_records (member_id, external_chat_id, display_name, balance, meetings_credited, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.member_id.to_string(),
            record.external_chat_id,
            record.display_name,
            record.balance,
            record.meetings_credited,
            record.last_updated.to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl<'a> ScoreStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Find a member's score record with full history
    #[instrument(skip(self))]
    pub fn find(&self, member_id: Uuid) -> Result<Option<ScoreRecord>> {
        load_record(self.conn, member_id)
    }

    /// Find a score record by chat id
    #[instrument(skip(self))]
    pub fn find_by_chat_id(&self, chat_id: &str) -> Result<Option<ScoreRecord>> {
        let member_id: Option<String> = self
            .conn
            .query_row(
                "SELECT member_id FROM score_records WHERE external_chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;

        match member_id {
            Some(id) => load_record(self.conn, parse_uuid(&id)?),
            None => Ok(None),
        }
    }

    /// Current balance without loading history
    #[instrument(skip(self))]
    pub fn balance(&self, member_id: Uuid) -> Result<Option<i64>> {
        let balance = self
            .conn
            .query_row(
                "SELECT balance FROM score_records WHERE member_id = ?1",
                params![member_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance)
    }

    /// Seed-if-missing, apply and append history as one write transaction
    #[instrument(
        skip(self, member, adjustment),
        fields(member_id = %member.id, delta = adjustment.delta)
    )]
    pub fn apply(&self, member: &Member, adjustment: &Adjustment) -> Result<AdjustOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let mut record = match load_record(&tx, member.id)? {
            Some(record) => record,
            None => {
                let record = ScoreRecord::seeded(member);
                insert_record(&tx, &record)?;
                debug!("Seeded score record");
                record
            }
        };

        let modification = record.apply(adjustment.delta, &adjustment.reason, &adjustment.actor);
        if adjustment.meeting_credit {
            record.meetings_credited += 1;
        }

        tx.execute(
            "UPDATE score_records SET balance = ?1, meetings_credited = ?2, last_updated = ?3,
             display_name = ?4, external_chat_id = ?5 WHERE member_id = ?6",
            params![
                record.balance,
                record.meetings_credited,
                record.last_updated.to_rfc3339(),
                member.display_name,
                member.external_chat_id,
                member.id.to_string(),
            ],
        )?;

        tx.execute(
            "INSERT INTO score_modifications (member_id, delta, balance_before, balance_after, reason, actor, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                member.id.to_string(),
                modification.delta,
                modification.balance_before,
                modification.balance_after,
                modification.reason,
                modification.actor,
                modification.timestamp.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        record.display_name = member.display_name.clone();
        record.external_chat_id = member.external_chat_id.clone();
        Ok(AdjustOutcome {
            record,
            modification,
        })
    }

    /// Records ordered by balance then meetings credited, highest first
    ///
    /// History is not loaded, a full board must fit in one frame.
    #[instrument(skip(self))]
    pub fn leaderboard(&self, limit: Option<u32>) -> Result<Vec<ScoreRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM score_records
             ORDER BY balance DESC, meetings_credited DESC, display_name COLLATE NOCASE
             LIMIT ?1",
            RECORD_COLUMNS
        ))?;

        let limit = limit.map(i64::from).unwrap_or(-1);
        let records = stmt
            .query_map(params![limit], record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
