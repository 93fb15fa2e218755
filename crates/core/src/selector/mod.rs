//! Hoster selection for confirmed meetings
//!
//! The hoster is drawn from the meeting's participants with probability
//! proportional to each participant's score balance. Guests never take part.
//! A meeting gets at most one hoster; later calls return the recorded one.

use chrono::Utc;
use rand::rngs::{StdRng, ThreadRng};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants::assert_hoster_invariants;
use crate::ledger::ScoreLedger;
use crate::models::{HosterRecord, Meeting, MeetingStatus};
use crate::notify::{messages, send_direct, Notifier};
use crate::storage::{MeetingFilter, Storage};

/// Source of uniform draws in `[0, 1)`
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;
}

impl RandomSource for ThreadRng {
    fn next_unit(&mut self) -> f64 {
        self.gen()
    }
}

impl RandomSource for StdRng {
    fn next_unit(&mut self) -> f64 {
        self.gen()
    }
}

/// Pick an index with probability `weights[i] / sum(weights)`
///
/// `unit` is a uniform draw in `[0, 1)`, scaled to `r` in `[0, total)`; the
/// first index whose cumulative weight reaches `r` wins. If every weight is
/// zero the pick is uniform. Returns `None` only for an empty slice.
pub fn weighted_pick(weights: &[u64], unit: f64) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let unit = unit.clamp(0.0, 1.0);

    let total: u64 = weights.iter().sum();
    if total == 0 {
        let index = (unit * weights.len() as f64) as usize;
        return Some(index.min(weights.len() - 1));
    }

    let r = unit * total as f64;
    let mut cumulative = 0u64;
    for (i, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if cumulative as f64 >= r {
            return Some(i);
        }
    }

    // Rounding at the top of the range
    Some(weights.len() - 1)
}

/// Outcome of a selection call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HosterSelection {
    pub meeting_id: Uuid,
    pub hoster: HosterRecord,
    /// The hoster had been chosen by an earlier call
    pub already_selected: bool,
}

pub struct HosterSelector<'a, S: Storage> {
    store: &'a S,
    notifier: &'a dyn Notifier,
}

impl<'a, S: Storage> HosterSelector<'a, S> {
    pub fn new(store: &'a S, notifier: &'a dyn Notifier) -> Self {
        Self { store, notifier }
    }

    fn load_active(&self, meeting_id: Uuid) -> Result<Meeting> {
        match self.store.find_meeting(meeting_id)? {
            Some(meeting) if meeting.active => Ok(meeting),
            _ => Err(Error::NotFound(format!("Meeting {}", meeting_id))),
        }
    }

    /// Current selection weight of every participant, in roster order
    pub fn weights(&self, meeting: &Meeting) -> Result<Vec<u64>> {
        let ledger = ScoreLedger::new(self.store);
        meeting
            .participants
            .iter()
            .map(|p| -> Result<u64> { Ok(ledger.weight_of(p.member_id)?.max(0) as u64) })
            .collect()
    }

    /// Choose and record the hoster of a confirmed meeting
    #[instrument(skip(self, rng))]
    pub fn select(&self, meeting_id: Uuid, rng: &mut dyn RandomSource) -> Result<HosterSelection> {
        let meeting = self.load_active(meeting_id)?;
        self.select_in(meeting, rng)
    }

    /// Select for the newest active confirmed meeting
    #[instrument(skip(self, rng))]
    pub fn select_for_latest_confirmed(
        &self,
        rng: &mut dyn RandomSource,
    ) -> Result<HosterSelection> {
        let meeting = self
            .store
            .latest_meeting(MeetingFilter::Confirmed)?
            .ok_or_else(|| Error::NotFound("No confirmed meeting".into()))?;
        self.select_in(meeting, rng)
    }

    fn select_in(&self, meeting: Meeting, rng: &mut dyn RandomSource) -> Result<HosterSelection> {
        if let Some(hoster) = &meeting.hoster {
            return Ok(HosterSelection {
                meeting_id: meeting.id,
                hoster: hoster.clone(),
                already_selected: true,
            });
        }
        if meeting.status != MeetingStatus::Confirmed {
            return Err(Error::InvalidTransition(format!(
                "Meeting {} is {}; a hoster is only chosen once confirmed",
                meeting.id, meeting.status
            )));
        }
        if meeting.participants.is_empty() {
            return Err(Error::Validation(format!(
                "Meeting {} has no participants to host",
                meeting.id
            )));
        }

        let weights = self.weights(&meeting)?;
        let index = weighted_pick(&weights, rng.next_unit())
            .ok_or_else(|| Error::Validation("No participants to host".into()))?;
        let chosen = &meeting.participants[index];

        let record = HosterRecord {
            member_id: chosen.member_id,
            display_name: chosen.display_name.clone(),
            external_chat_id: chosen.external_chat_id.clone(),
            assigned_role: chosen.assigned_role,
            assigned_class: chosen.assigned_class,
            score: weights[index] as i64,
            selected_at: Utc::now(),
        };

        if !self.store.set_hoster_if_absent(meeting.id, &record)? {
            // Another caller won the race
            let current = self.load_active(meeting.id)?;
            return match current.hoster {
                Some(hoster) => Ok(HosterSelection {
                    meeting_id: meeting.id,
                    hoster,
                    already_selected: true,
                }),
                None => Err(Error::InvalidTransition(format!(
                    "Meeting {} left confirmed during selection",
                    meeting.id
                ))),
            };
        }

        info!(
            meeting_id = %meeting.id,
            member_id = %record.member_id,
            score = record.score,
            "Hoster selected"
        );

        if let Some(chat_id) = &record.external_chat_id {
            send_direct(self.notifier, chat_id, &messages::hoster_selected(&meeting, &record));
        }

        let mut stored = meeting;
        stored.hoster = Some(record.clone());
        assert_hoster_invariants(&stored);

        Ok(HosterSelection {
            meeting_id: stored.id,
            hoster: record,
            already_selected: false,
        })
    }

    /// The recorded hoster, if any
    pub fn get(&self, meeting_id: Uuid) -> Result<Option<HosterRecord>> {
        let meeting = self
            .store
            .find_meeting(meeting_id)?
            .ok_or_else(|| Error::NotFound(format!("Meeting {}", meeting_id)))?;
        Ok(meeting.hoster)
    }
}
