//! Meeting lifecycle
//!
//! State machine for scheduled raids:
//!
//! ```text
//! draft ──► confirmed ──► completed
//!   │           │
//!   └──► canceled ◄──┘
//! ```
//!
//! Roster edits are only allowed while a meeting is a draft. Confirmation
//! credits every participant once; crediting is best effort per member and
//! never undoes the transition.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::eligibility::ClassRoleMatrix;
use crate::error::{Error, Result};
use crate::invariants::assert_meeting_invariants;
use crate::ledger::ScoreLedger;
use crate::models::{
    ClassCode, Guest, GuestDraft, Meeting, MeetingDraft, MeetingStatus, MemberKey, Participant,
    ParticipantDraft, RoleTag, RosterPosition, RosterRef, MAX_ROSTER_SIZE,
};
use crate::notify::{messages, send_announcement, Notifier};
use crate::registry::normalize_chat_id;
use crate::storage::{MeetingFilter, Storage};

/// Points awarded per confirmed meeting unless configured otherwise
pub const DEFAULT_MEETING_CREDIT: i64 = 1;

/// Result of confirming a meeting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub meeting: Meeting,
    /// Members credited, in roster order
    pub credited: Vec<Uuid>,
    /// Members whose credit failed and was skipped
    pub failed: Vec<Uuid>,
}

fn check_assignment(role: RoleTag, class: ClassCode, who: &str) -> Result<()> {
    if ClassRoleMatrix::is_role_valid_for_class(role, class) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{}: role {} is not valid for class {}",
            who, role, class
        )))
    }
}

/// Assign dense positions across participants and guests
///
/// Entries keep their requested relative order; entries without a requested
/// position go last, participants before guests.
fn normalize_positions(
    participants: &mut [Participant],
    guests: &mut [Guest],
    requested: &[Option<u32>],
) {
    let mut order: Vec<(u32, usize)> = requested
        .iter()
        .enumerate()
        .map(|(i, pos)| (pos.unwrap_or(u32::MAX), i))
        .collect();
    order.sort();

    let split = participants.len();
    for (position, (_, index)) in order.into_iter().enumerate() {
        if index < split {
            participants[index].position = position as u32;
        } else {
            guests[index - split].position = position as u32;
        }
    }
}

pub struct MeetingLifecycle<'a, S: Storage> {
    store: &'a S,
    notifier: &'a dyn Notifier,
    meeting_credit: i64,
}

impl<'a, S: Storage> MeetingLifecycle<'a, S> {
    pub fn new(store: &'a S, notifier: &'a dyn Notifier) -> Self {
        Self {
            store,
            notifier,
            meeting_credit: DEFAULT_MEETING_CREDIT,
        }
    }

    pub fn with_meeting_credit(mut self, amount: i64) -> Self {
        self.meeting_credit = amount;
        self
    }

    /// Roster entry for a registered member; identity and chat id come from the member record
    fn build_participant(
        &self,
        draft: &ParticipantDraft,
        seen: &mut HashSet<Uuid>,
    ) -> Result<Participant> {
        if draft.member_id.is_nil() {
            return Err(Error::Validation("Every participant needs a member id".into()));
        }

        let member = match self.store.find_member(&MemberKey::Id(draft.member_id))? {
            Some(member) if member.active => member,
            Some(member) => {
                return Err(Error::Validation(format!(
                    "Participant {} is no longer an active member",
                    member.display_name
                )))
            }
            None => {
                return Err(Error::Validation(format!(
                    "Participant {} is not a registered member",
                    draft.member_id
                )))
            }
        };

        let name = match draft.display_name.trim() {
            "" => member.display_name.clone(),
            name => name.to_string(),
        };
        check_assignment(draft.role, draft.class, &name)?;

        if !seen.insert(member.id) {
            return Err(Error::Validation(format!("{} is listed twice", name)));
        }

        Ok(Participant {
            member_id: member.id,
            display_name: name,
            external_chat_id: member.external_chat_id,
            assigned_role: draft.role,
            assigned_class: draft.class,
            position: 0,
        })
    }

    fn build_guest(draft: &GuestDraft, seen: &mut HashSet<String>) -> Result<Guest> {
        let id = draft.id.trim();
        let name = draft.display_name.trim();
        if id.is_empty() || name.is_empty() {
            return Err(Error::Validation(
                "Every guest needs an id and display name".into(),
            ));
        }
        check_assignment(draft.role, draft.class, name)?;

        if !seen.insert(id.to_string()) {
            return Err(Error::Validation(format!("Guest id {} is listed twice", id)));
        }

        let eligible_roles = if draft.roles.is_empty() {
            vec![draft.role]
        } else {
            draft.roles.clone()
        };
        let eligible_classes = if draft.classes.is_empty() {
            vec![draft.class]
        } else {
            draft.classes.clone()
        };

        Ok(Guest {
            id: id.to_string(),
            display_name: name.to_string(),
            external_chat_id: normalize_chat_id(draft.external_chat_id.as_deref()),
            eligible_roles,
            eligible_classes,
            assigned_role: draft.role,
            assigned_class: draft.class,
            position: 0,
        })
    }

    /// Validate a draft into a meeting shell plus its positioned roster
    fn build(&self, draft: &MeetingDraft) -> Result<(Meeting, Vec<Participant>, Vec<Guest>)> {
        let title = draft.title.trim();
        let description = draft.description.trim();
        if title.is_empty() {
            return Err(Error::Validation("Title is required".into()));
        }
        if description.is_empty() {
            return Err(Error::Validation("Description is required".into()));
        }

        let size = draft.participants.len() + draft.guests.len();
        if size == 0 {
            return Err(Error::Validation(
                "A meeting needs at least one participant or guest".into(),
            ));
        }
        if size > MAX_ROSTER_SIZE {
            return Err(Error::CapacityExceeded(format!(
                "Roster has {} entries, the limit is {}",
                size, MAX_ROSTER_SIZE
            )));
        }

        let mut seen_members = HashSet::new();
        let mut participants = draft
            .participants
            .iter()
            .map(|p| self.build_participant(p, &mut seen_members))
            .collect::<Result<Vec<_>>>()?;

        let mut seen_guests = HashSet::new();
        let mut guests = draft
            .guests
            .iter()
            .map(|g| Self::build_guest(g, &mut seen_guests))
            .collect::<Result<Vec<_>>>()?;

        let requested: Vec<Option<u32>> = draft
            .participants
            .iter()
            .map(|p| p.position)
            .chain(draft.guests.iter().map(|g| g.position))
            .collect();
        normalize_positions(&mut participants, &mut guests, &requested);

        let meeting = Meeting::new(
            title.to_string(),
            description.to_string(),
            draft.date,
            draft.time,
        );
        Ok((meeting, participants, guests))
    }

    /// Load a meeting that has not been soft deleted
    fn load_active(&self, id: Uuid) -> Result<Meeting> {
        match self.store.find_meeting(id)? {
            Some(meeting) if meeting.active => Ok(meeting),
            _ => Err(Error::NotFound(format!("Meeting {}", id))),
        }
    }

    fn load_draft(&self, id: Uuid) -> Result<Meeting> {
        let meeting = self.load_active(id)?;
        if meeting.status != MeetingStatus::Draft {
            return Err(Error::InvalidTransition(format!(
                "Meeting {} is {} and can no longer be edited",
                id, meeting.status
            )));
        }
        Ok(meeting)
    }

    /// Persist an edited draft and return the stored state
    fn save_draft(&self, meeting: &Meeting) -> Result<Meeting> {
        if !self.store.replace_meeting(meeting, MeetingStatus::Draft)? {
            return Err(Error::InvalidTransition(format!(
                "Meeting {} left draft while being edited",
                meeting.id
            )));
        }
        let stored = self.load_active(meeting.id)?;
        assert_meeting_invariants(&stored);
        Ok(stored)
    }

    /// Create a meeting in draft
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create(&self, draft: &MeetingDraft) -> Result<Meeting> {
        let (mut meeting, participants, guests) = self.build(draft)?;
        meeting.participants = participants;
        meeting.guests = guests;

        self.store.create_meeting(&meeting)?;
        assert_meeting_invariants(&meeting);
        info!(meeting_id = %meeting.id, roster = meeting.roster_len(), "Created meeting");
        Ok(meeting)
    }

    /// Replace the contents of a draft; status only moves through transitions
    #[instrument(skip(self, draft))]
    pub fn update(&self, id: Uuid, draft: &MeetingDraft) -> Result<Meeting> {
        let mut meeting = self.load_draft(id)?;
        let (edited, participants, guests) = self.build(draft)?;

        meeting.title = edited.title;
        meeting.description = edited.description;
        meeting.date = edited.date;
        meeting.time = edited.time;
        meeting.participants = participants;
        meeting.guests = guests;

        let stored = self.save_draft(&meeting)?;
        info!("Updated meeting");
        Ok(stored)
    }

    /// Assign new display positions; the result must be a permutation of 0..n
    #[instrument(skip(self, positions))]
    pub fn reorder_roster(&self, id: Uuid, positions: &[RosterPosition]) -> Result<Meeting> {
        let mut meeting = self.load_draft(id)?;
        let n = meeting.roster_len();

        if positions.len() != n {
            return Err(Error::Validation(format!(
                "Expected {} positions, got {}",
                n,
                positions.len()
            )));
        }

        let mut used = HashSet::new();
        let mut entries = HashSet::new();
        for item in positions {
            if item.position as usize >= n || !used.insert(item.position) {
                return Err(Error::Validation(format!(
                    "Positions must be a permutation of 0..{}",
                    n
                )));
            }
            if !entries.insert(&item.entry) {
                return Err(Error::Validation("A roster entry was listed twice".into()));
            }

            let slot = match &item.entry {
                RosterRef::Participant(member_id) => meeting
                    .participants
                    .iter_mut()
                    .find(|p| p.member_id == *member_id)
                    .map(|p| &mut p.position),
                RosterRef::Guest(guest_id) => meeting
                    .guests
                    .iter_mut()
                    .find(|g| g.id == *guest_id)
                    .map(|g| &mut g.position),
            };
            *slot.ok_or_else(|| Error::NotFound(format!("Roster entry {:?}", item.entry)))? =
                item.position;
        }

        self.save_draft(&meeting)
    }

    /// Move a meeting along a defined edge with a compare-and-set
    fn transition(&self, id: Uuid, to: MeetingStatus) -> Result<Meeting> {
        let meeting = self.load_active(id)?;
        if !meeting.status.can_transition_to(to) {
            return Err(Error::InvalidTransition(format!(
                "Meeting {} cannot go from {} to {}",
                id, meeting.status, to
            )));
        }
        if !self.store.transition_meeting(id, meeting.status, to)? {
            return Err(Error::InvalidTransition(format!(
                "Meeting {} changed status concurrently",
                id
            )));
        }

        info!(meeting_id = %id, from = %meeting.status, to = %to, "Meeting transitioned");
        self.load_active(id)
    }

    /// draft → confirmed, crediting every participant with a chat id once
    #[instrument(skip(self))]
    pub fn confirm(&self, id: Uuid) -> Result<Confirmation> {
        let meeting = self.transition(id, MeetingStatus::Confirmed)?;
        let ledger = ScoreLedger::new(self.store);

        let mut credited = Vec::new();
        let mut failed = Vec::new();
        for participant in meeting
            .participants
            .iter()
            .filter(|p| p.external_chat_id.is_some())
        {
            let award = ledger.award_meeting_credit(
                participant.member_id,
                self.meeting_credit,
                &meeting.title,
            );
            match award {
                Ok(_) => credited.push(participant.member_id),
                Err(e) => {
                    warn!(
                        member_id = %participant.member_id,
                        error = %e,
                        "Skipping meeting credit"
                    );
                    failed.push(participant.member_id);
                }
            }
        }

        send_announcement(
            self.notifier,
            &meeting.roster_chat_ids(),
            &messages::meeting_confirmed(&meeting),
        );

        Ok(Confirmation {
            meeting,
            credited,
            failed,
        })
    }

    /// draft|confirmed → canceled; credits already awarded stay
    #[instrument(skip(self))]
    pub fn cancel(&self, id: Uuid) -> Result<Meeting> {
        self.transition(id, MeetingStatus::Canceled)
    }

    /// confirmed → completed
    #[instrument(skip(self))]
    pub fn complete(&self, id: Uuid) -> Result<Meeting> {
        self.transition(id, MeetingStatus::Completed)
    }

    /// Soft delete
    #[instrument(skip(self))]
    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.load_active(id)?;
        self.store.deactivate_meeting(id)?;
        info!("Deleted meeting");
        Ok(())
    }

    /// Any meeting by id, including soft deleted ones
    pub fn get(&self, id: Uuid) -> Result<Meeting> {
        self.store
            .find_meeting(id)?
            .ok_or_else(|| Error::NotFound(format!("Meeting {}", id)))
    }

    pub fn list_active(&self) -> Result<Vec<Meeting>> {
        self.store.list_active_meetings()
    }

    /// Newest active meeting that is neither confirmed nor canceled
    pub fn latest_active(&self) -> Result<Option<Meeting>> {
        self.store.latest_meeting(MeetingFilter::Open)
    }

    /// Newest active confirmed meeting
    pub fn latest_confirmed(&self) -> Result<Option<Meeting>> {
        self.store.latest_meeting(MeetingFilter::Confirmed)
    }
}
