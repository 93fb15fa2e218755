//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::collections::HashSet;

use crate::models::{Meeting, MeetingStatus, ScoreRecord, DEFAULT_BALANCE, MAX_ROSTER_SIZE};

/// Validate that a score record agrees with its audit trail
///
/// Only meaningful when `history` is fully loaded.
pub fn assert_score_invariants(record: &ScoreRecord) {
    debug_assert!(
        record.balance >= 0,
        "Score record {} has negative balance {}",
        record.member_id,
        record.balance
    );

    let mut running = DEFAULT_BALANCE;
    for (i, entry) in record.history.iter().enumerate() {
        // Each entry starts where the previous one ended
        debug_assert_eq!(
            entry.balance_before, running,
            "Score record {} history entry {} breaks the chain",
            record.member_id, i
        );
        debug_assert_eq!(
            entry.balance_after,
            entry.balance_before.saturating_add(entry.delta).max(0),
            "Score record {} history entry {} is not clamped at zero",
            record.member_id,
            i
        );
        running = entry.balance_after;
    }

    debug_assert_eq!(
        record.balance, running,
        "Score record {} balance disagrees with history",
        record.member_id
    );
}

/// Validate roster size, position uniqueness and id uniqueness
pub fn assert_roster_invariants(meeting: &Meeting) {
    debug_assert!(
        meeting.roster_len() <= MAX_ROSTER_SIZE,
        "Meeting {} has {} roster entries",
        meeting.id,
        meeting.roster_len()
    );

    let positions: HashSet<u32> = meeting
        .participants
        .iter()
        .map(|p| p.position)
        .chain(meeting.guests.iter().map(|g| g.position))
        .collect();
    debug_assert_eq!(
        positions.len(),
        meeting.roster_len(),
        "Meeting {} has duplicate roster positions",
        meeting.id
    );

    let members: HashSet<_> = meeting.participants.iter().map(|p| p.member_id).collect();
    debug_assert_eq!(
        members.len(),
        meeting.participants.len(),
        "Meeting {} lists a member twice",
        meeting.id
    );
}

/// Validate that a recorded hoster is a participant of a meeting past draft
pub fn assert_hoster_invariants(meeting: &Meeting) {
    let Some(hoster) = &meeting.hoster else {
        return;
    };

    debug_assert!(
        meeting.status != MeetingStatus::Draft,
        "Draft meeting {} has a hoster",
        meeting.id
    );

    // Guests are never hosters
    debug_assert!(
        meeting
            .participants
            .iter()
            .any(|p| p.member_id == hoster.member_id),
        "Meeting {} hoster {} is not a participant",
        meeting.id,
        hoster.member_id
    );
}

/// All meeting checks
pub fn assert_meeting_invariants(meeting: &Meeting) {
    debug_assert!(
        !meeting.title.trim().is_empty(),
        "Meeting {} has empty title",
        meeting.id
    );
    assert_roster_invariants(meeting);
    assert_hoster_invariants(meeting);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassCode, Member, Participant, RoleTag};
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn meeting() -> Meeting {
        Meeting::new(
            "Raid".into(),
            "desc".into(),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        )
    }

    fn participant(position: u32) -> Participant {
        Participant {
            member_id: Uuid::new_v4(),
            display_name: "P".into(),
            external_chat_id: None,
            assigned_role: RoleTag::Dps,
            assigned_class: ClassCode::TangKiem,
            position,
        }
    }

    #[test]
    fn test_valid_score_chain() {
        let mut record = ScoreRecord::seeded(&Member::new("Q".into()));
        record.apply(5, "a", "admin");
        record.apply(-300, "b", "admin");
        record.apply(2, "c", "admin");
        assert_score_invariants(&record);
    }

    #[test]
    #[should_panic(expected = "disagrees with history")]
    #[cfg(debug_assertions)]
    fn test_tampered_balance_detected() {
        let mut record = ScoreRecord::seeded(&Member::new("Q".into()));
        record.apply(5, "a", "admin");
        record.balance = 500;
        assert_score_invariants(&record);
    }

    #[test]
    fn test_valid_roster() {
        let mut m = meeting();
        m.participants = vec![participant(0), participant(1)];
        assert_meeting_invariants(&m);
    }

    #[test]
    #[should_panic(expected = "duplicate roster positions")]
    #[cfg(debug_assertions)]
    fn test_duplicate_positions_detected() {
        let mut m = meeting();
        m.participants = vec![participant(0), participant(0)];
        assert_roster_invariants(&m);
    }
}
