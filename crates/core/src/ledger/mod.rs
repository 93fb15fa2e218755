//! Score ledger
//!
//! Per-member point balances with an append-only audit trail. Every change
//! goes through [`ScoreLedger::adjust`], which the storage layer applies as a
//! single write transaction per member.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants::assert_score_invariants;
use crate::models::{AdjustOutcome, Adjustment, MemberKey, ScoreRecord, DEFAULT_BALANCE};
use crate::storage::{MemberRepository, ScoreRepository};

/// Actor recorded for automatic credits
pub const SYSTEM_ACTOR: &str = "system";

pub struct ScoreLedger<'a, S: MemberRepository + ScoreRepository> {
    store: &'a S,
}

impl<'a, S: MemberRepository + ScoreRepository> ScoreLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    fn apply(&self, key: &MemberKey, adjustment: Adjustment) -> Result<AdjustOutcome> {
        if adjustment.reason.trim().is_empty() {
            return Err(Error::Validation("A reason is required for score changes".into()));
        }
        if adjustment.actor.trim().is_empty() {
            return Err(Error::Validation("An actor is required for score changes".into()));
        }

        let member = match self.store.find_member(key)? {
            Some(member) if member.active => member,
            _ => return Err(Error::NotFound(format!("Member with {}", key))),
        };

        let outcome = self.store.apply_adjustment(&member, &adjustment)?;
        assert_score_invariants(&outcome.record);

        info!(
            member_id = %member.id,
            delta = outcome.modification.delta,
            balance = outcome.record.balance,
            "Score adjusted"
        );
        Ok(outcome)
    }

    /// Change a balance by `delta`, flooring at zero
    #[instrument(skip(self, reason, actor))]
    pub fn adjust(
        &self,
        key: &MemberKey,
        delta: i64,
        reason: &str,
        actor: &str,
    ) -> Result<AdjustOutcome> {
        self.apply(
            key,
            Adjustment {
                delta,
                reason: reason.to_string(),
                actor: actor.to_string(),
                meeting_credit: false,
            },
        )
    }

    pub fn credit(
        &self,
        member_id: Uuid,
        amount: i64,
        reason: &str,
        actor: &str,
    ) -> Result<AdjustOutcome> {
        if amount <= 0 {
            return Err(Error::Validation("Credit amount must be positive".into()));
        }
        self.adjust(&MemberKey::Id(member_id), amount, reason, actor)
    }

    pub fn debit(
        &self,
        member_id: Uuid,
        amount: i64,
        reason: &str,
        actor: &str,
    ) -> Result<AdjustOutcome> {
        if amount <= 0 {
            return Err(Error::Validation("Debit amount must be positive".into()));
        }
        self.adjust(&MemberKey::Id(member_id), -amount, reason, actor)
    }

    /// Credit attendance of a confirmed meeting
    ///
    /// Not deduplicated here; callers award at most once per meeting.
    #[instrument(skip(self, meeting_title))]
    pub fn award_meeting_credit(
        &self,
        member_id: Uuid,
        amount: i64,
        meeting_title: &str,
    ) -> Result<AdjustOutcome> {
        self.apply(
            &MemberKey::Id(member_id),
            Adjustment {
                delta: amount,
                reason: format!("Tham gia bí cảnh: {}", meeting_title),
                actor: SYSTEM_ACTOR.to_string(),
                meeting_credit: true,
            },
        )
    }

    /// Score record with history; members never scored get an unsaved seed record
    pub fn get_score(&self, key: &MemberKey) -> Result<ScoreRecord> {
        let record = match key {
            MemberKey::Id(id) => self.store.find_score(*id)?,
            MemberKey::ExternalChatId(chat_id) => self.store.find_score_by_chat_id(chat_id)?,
        };
        if let Some(record) = record {
            return Ok(record);
        }

        let member = self
            .store
            .find_member(key)?
            .ok_or_else(|| Error::NotFound(format!("Member with {}", key)))?;
        Ok(ScoreRecord::seeded(&member))
    }

    /// Selection weight of a member; unscored members weigh the seed balance
    pub fn weight_of(&self, member_id: Uuid) -> Result<i64> {
        Ok(self
            .store
            .score_balance(member_id)?
            .unwrap_or(DEFAULT_BALANCE))
    }

    /// Records by balance then meetings credited, highest first
    ///
    /// Rows carry no history; use [`ScoreLedger::get_score`] for the audit trail.
    pub fn leaderboard(&self, limit: Option<u32>) -> Result<Vec<ScoreRecord>> {
        self.store.leaderboard(limit)
    }

    pub fn list_scores(&self) -> Result<Vec<ScoreRecord>> {
        self.store.leaderboard(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Member;
    use crate::storage::Database;

    fn member(db: &Database, name: &str, chat_id: &str) -> Member {
        let member = Member::new(name.to_string()).with_external_chat_id(chat_id);
        db.create_member(&member).unwrap();
        member
    }

    #[test]
    fn test_first_credit_seeds_record() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);
        let m = member(&db, "An", "1");

        let outcome = ledger.credit(m.id, 5, "bonus", "admin").unwrap();
        assert_eq!(outcome.modification.balance_before, DEFAULT_BALANCE);
        assert_eq!(outcome.record.balance, 105);
        assert_eq!(outcome.record.meetings_credited, 0);
    }

    #[test]
    fn test_debit_fresh_member_floors_at_zero() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);
        let m = member(&db, "Bảo", "2");

        let outcome = ledger.debit(m.id, 150, "penalty", "admin").unwrap();
        assert_eq!(outcome.record.balance, 0);
        assert_eq!(outcome.modification.delta, -150);
        assert_eq!(outcome.modification.balance_before, 100);
        assert_eq!(outcome.modification.balance_after, 0);
    }

    #[test]
    fn test_clamp_recorded_in_history() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);
        let m = member(&db, "Cường", "3");

        ledger.credit(m.id, 1, "meeting", "system").unwrap();
        ledger.credit(m.id, 1, "meeting", "system").unwrap();
        ledger.debit(m.id, 500, "reset", "admin").unwrap();

        let record = ledger.get_score(&MemberKey::Id(m.id)).unwrap();
        assert_eq!(record.balance, 0);
        assert_eq!(record.history.len(), 3);
        let last = record.history.last().unwrap();
        assert_eq!(last.delta, -500);
        assert_eq!(last.balance_before, 102);
        assert_eq!(last.balance_after, 0);
    }

    #[test]
    fn test_balance_tracks_running_sum() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);
        let m = member(&db, "Duy", "4");
        let key = MemberKey::Id(m.id);

        let mut expected = DEFAULT_BALANCE;
        for delta in [20, -50, -90, 7, -3, 40, -200, 1] {
            ledger.adjust(&key, delta, "manual", "admin").unwrap();
            expected = (expected + delta).max(0);
            let record = ledger.get_score(&key).unwrap();
            assert_eq!(record.balance, expected);
            assert!(record.history.iter().all(|h| h.balance_after >= 0));
        }
    }

    #[test]
    fn test_missing_or_inactive_member_not_found() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);

        let err = ledger.credit(Uuid::new_v4(), 1, "x", "admin").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let m = member(&db, "Em", "5");
        db.deactivate_member(m.id).unwrap();
        let err = ledger.award_meeting_credit(m.id, 1, "Raid").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_meeting_credit_counts_meetings() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);
        let m = member(&db, "Giang", "6");

        ledger.award_meeting_credit(m.id, 1, "Raid 1").unwrap();
        let outcome = ledger.award_meeting_credit(m.id, 1, "Raid 2").unwrap();
        assert_eq!(outcome.record.balance, 102);
        assert_eq!(outcome.record.meetings_credited, 2);
        assert_eq!(outcome.modification.actor, SYSTEM_ACTOR);
    }

    #[test]
    fn test_validation() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);
        let m = member(&db, "Hạnh", "7");

        assert!(matches!(
            ledger.credit(m.id, 0, "x", "admin").unwrap_err(),
            Error::Validation(_)
        ));
        assert!(matches!(
            ledger.debit(m.id, -5, "x", "admin").unwrap_err(),
            Error::Validation(_)
        ));
        assert!(matches!(
            ledger.adjust(&MemberKey::Id(m.id), 3, "  ", "admin").unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[test]
    fn test_get_score_for_unscored_member() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);
        let m = member(&db, "Khánh", "8");

        let record = ledger
            .get_score(&MemberKey::ExternalChatId("8".into()))
            .unwrap();
        assert_eq!(record.member_id, m.id);
        assert_eq!(record.balance, DEFAULT_BALANCE);
        assert_eq!(ledger.weight_of(m.id).unwrap(), DEFAULT_BALANCE);

        assert!(matches!(
            ledger
                .get_score(&MemberKey::ExternalChatId("nobody".into()))
                .unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_leaderboard_order() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);
        let a = member(&db, "A", "a");
        let b = member(&db, "B", "b");
        let c = member(&db, "C", "c");

        // a: 102 over two meetings, b: 102 from one manual credit, c: 90
        ledger.award_meeting_credit(a.id, 1, "r1").unwrap();
        ledger.award_meeting_credit(a.id, 1, "r2").unwrap();
        ledger.credit(b.id, 2, "bonus", "admin").unwrap();
        ledger.debit(c.id, 10, "late", "admin").unwrap();

        let board = ledger.leaderboard(None).unwrap();
        let order: Vec<_> = board.iter().map(|r| r.member_id).collect();
        assert_eq!(order, vec![a.id, b.id, c.id]);

        let top = ledger.leaderboard(Some(1)).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].member_id, a.id);
    }

    #[test]
    fn test_leaderboard_rows_skip_history() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ScoreLedger::new(&db);
        let a = member(&db, "A", "a");
        for i in 0..50 {
            ledger.credit(a.id, 1, &format!("round {}", i), "admin").unwrap();
        }

        let board = ledger.leaderboard(None).unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].balance, DEFAULT_BALANCE + 50);
        assert!(board[0].history.is_empty());

        let full = ledger.get_score(&MemberKey::Id(a.id)).unwrap();
        assert_eq!(full.history.len(), 50);
    }
}
