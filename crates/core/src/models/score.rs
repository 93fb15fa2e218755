//! Score ledger records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Member;

/// Balance every member starts with
pub const DEFAULT_BALANCE: i64 = 100;

/// One entry in a score record's audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub delta: i64,
    pub balance_before: i64,
    /// Effective balance after clamping at zero
    pub balance_after: i64,
    pub reason: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-member point balance with its modification history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub member_id: Uuid,
    pub external_chat_id: Option<String>,
    pub display_name: String,
    pub balance: i64,
    pub meetings_credited: u32,
    pub last_updated: DateTime<Utc>,
    /// Empty on leaderboard rows
    #[serde(default)]
    pub history: Vec<Modification>,
}

impl ScoreRecord {
    /// Fresh record for a member who has never been credited or debited
    pub fn seeded(member: &Member) -> Self {
        Self {
            member_id: member.id,
            external_chat_id: member.external_chat_id.clone(),
            display_name: member.display_name.clone(),
            balance: DEFAULT_BALANCE,
            meetings_credited: 0,
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Apply a delta, flooring the balance at zero, and append the audit entry
    pub fn apply(&mut self, delta: i64, reason: &str, actor: &str) -> Modification {
        let balance_before = self.balance;
        let balance_after = balance_before.saturating_add(delta).max(0);
        let now = Utc::now();

        let modification = Modification {
            delta,
            balance_before,
            balance_after,
            reason: reason.to_string(),
            actor: actor.to_string(),
            timestamp: now,
        };

        self.balance = balance_after;
        self.last_updated = now;
        self.history.push(modification.clone());
        modification
    }
}

/// A single balance change request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adjustment {
    pub delta: i64,
    pub reason: String,
    pub actor: String,
    /// Count this change as a credited meeting
    #[serde(default)]
    pub meeting_credit: bool,
}

/// Result of applying an [`Adjustment`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustOutcome {
    pub record: ScoreRecord,
    pub modification: Modification,
}
