//! Join-request admission
//!
//! Chat users ask to join a meeting that has not been confirmed yet; an
//! admin approves or rejects each request exactly once. Approval appends the
//! requester to the roster, as a participant when they still resolve to an
//! active member and as a guest otherwise.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::eligibility::ClassRoleMatrix;
use crate::error::{Error, Result};
use crate::models::{
    Admission, Guest, JoinDecision, JoinRequest, JoinSubmission, Meeting, MemberKey, Participant,
    Resolution, SubmitOutcome, MAX_ROSTER_SIZE,
};
use crate::notify::{messages, send_direct, Notifier};
use crate::registry::MemberRegistry;
use crate::storage::Storage;

fn validate_submission(submission: &JoinSubmission) -> Result<JoinSubmission> {
    let chat_id = submission.external_chat_id.trim();
    let name = submission.display_name.trim();
    if chat_id.is_empty() || name.is_empty() {
        return Err(Error::Validation("Chat id and display name are required".into()));
    }
    let (role, class) = (submission.requested_role, submission.requested_class);
    if !ClassRoleMatrix::is_role_valid_for_class(role, class) {
        return Err(Error::Validation(format!(
            "Role {} is not valid for class {}",
            role, class
        )));
    }

    Ok(JoinSubmission {
        external_chat_id: chat_id.to_string(),
        display_name: name.to_string(),
        ..submission.clone()
    })
}

pub struct JoinAdmission<'a, S: Storage> {
    store: &'a S,
    notifier: &'a dyn Notifier,
}

impl<'a, S: Storage> JoinAdmission<'a, S> {
    pub fn new(store: &'a S, notifier: &'a dyn Notifier) -> Self {
        Self { store, notifier }
    }

    fn load_active(&self, meeting_id: Uuid) -> Result<Meeting> {
        match self.store.find_meeting(meeting_id)? {
            Some(meeting) if meeting.active => Ok(meeting),
            _ => Err(Error::NotFound(format!("Meeting {}", meeting_id))),
        }
    }

    /// Queue a request, registering the requester if they are unknown
    #[instrument(skip(self, submission), fields(chat_id = %submission.external_chat_id))]
    pub fn submit(&self, meeting_id: Uuid, submission: &JoinSubmission) -> Result<SubmitOutcome> {
        let submission = validate_submission(submission)?;
        let chat_id = submission.external_chat_id.as_str();

        let meeting = self.load_active(meeting_id)?;
        if !meeting.status.accepts_join_requests() {
            return Err(Error::InvalidTransition(format!(
                "Meeting {} is {} and no longer accepts join requests",
                meeting_id, meeting.status
            )));
        }
        if self.store.find_pending_request(meeting_id, chat_id)?.is_some() {
            return Err(Error::Conflict("You already have a pending join request".into()));
        }
        if meeting.is_participant(chat_id) {
            return Err(Error::Conflict("You are already a participant in this meeting".into()));
        }
        if meeting.is_guest(chat_id) {
            return Err(Error::Conflict("You are already a guest in this meeting".into()));
        }

        let registry = MemberRegistry::new(self.store);
        let existing = self
            .store
            .find_member(&MemberKey::ExternalChatId(chat_id.to_string()))?;
        let new_member_created = match existing {
            Some(_) => false,
            None => {
                registry.provision(&submission)?;
                true
            }
        };

        let request = JoinRequest::new(meeting_id, &submission);
        self.store.insert_join_request(&request)?;
        info!(request_id = %request.id, new_member_created, "Join request submitted");

        send_direct(
            self.notifier,
            chat_id,
            &messages::join_submitted(&meeting, &request),
        );

        Ok(SubmitOutcome {
            request,
            meeting_title: meeting.title,
            new_member_created,
        })
    }

    /// Roster entry for an approved request
    fn admission_for(&self, meeting: &Meeting, request: &JoinRequest) -> Result<Admission> {
        let position = meeting.next_position();
        let member = self
            .store
            .find_member(&MemberKey::ExternalChatId(request.external_chat_id.clone()))?;

        let admission = match member {
            Some(member) if member.active => Admission::Participant(Participant {
                member_id: member.id,
                display_name: request.display_name.clone(),
                external_chat_id: Some(request.external_chat_id.clone()),
                assigned_role: request.requested_role,
                assigned_class: request.requested_class,
                position,
            }),
            // The member vanished between request and approval
            _ => Admission::Guest(Guest {
                id: Guest::generate_id(),
                display_name: request.display_name.clone(),
                external_chat_id: Some(request.external_chat_id.clone()),
                eligible_roles: vec![request.requested_role],
                eligible_classes: vec![request.requested_class],
                assigned_role: request.requested_role,
                assigned_class: request.requested_class,
                position,
            }),
        };
        Ok(admission)
    }

    fn resolve(
        &self,
        meeting_id: Uuid,
        chat_id: &str,
        decision: JoinDecision,
        actor: &str,
        reason: Option<String>,
    ) -> Result<Resolution> {
        if actor.trim().is_empty() {
            return Err(Error::Validation("The processing admin is required".into()));
        }
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let meeting = self.load_active(meeting_id)?;
        let mut request = self
            .store
            .find_pending_request(meeting_id, chat_id)?
            .ok_or_else(|| Error::NotFound(format!("Pending join request from {}", chat_id)))?;

        let admission = match decision {
            JoinDecision::Approve => {
                if meeting.roster_len() >= MAX_ROSTER_SIZE {
                    return Err(Error::CapacityExceeded(format!(
                        "Meeting roster is limited to {} entries",
                        MAX_ROSTER_SIZE
                    )));
                }
                if meeting.is_participant(chat_id) || meeting.is_guest(chat_id) {
                    return Err(Error::Conflict(format!("{} is already on the roster", chat_id)));
                }
                Some(self.admission_for(&meeting, &request)?)
            }
            JoinDecision::Reject => None,
        };

        request.resolve(decision, actor.trim(), reason);
        if !self.store.resolve_join_request(&request, admission.as_ref())? {
            return Err(Error::Conflict("Join request was already processed".into()));
        }
        info!(
            request_id = %request.id,
            status = request.status.as_str(),
            as_guest = admission.as_ref().map(Admission::is_guest).unwrap_or(false),
            "Join request processed"
        );

        send_direct(
            self.notifier,
            chat_id,
            &messages::join_resolved(&meeting, &request, decision),
        );

        Ok(Resolution { request, admission })
    }

    #[instrument(skip(self, reason))]
    pub fn approve(
        &self,
        meeting_id: Uuid,
        chat_id: &str,
        actor: &str,
        reason: Option<String>,
    ) -> Result<Resolution> {
        self.resolve(meeting_id, chat_id, JoinDecision::Approve, actor, reason)
    }

    #[instrument(skip(self, reason))]
    pub fn reject(
        &self,
        meeting_id: Uuid,
        chat_id: &str,
        actor: &str,
        reason: Option<String>,
    ) -> Result<Resolution> {
        self.resolve(meeting_id, chat_id, JoinDecision::Reject, actor, reason)
    }

    /// All requests on a meeting, oldest first
    pub fn list(&self, meeting_id: Uuid) -> Result<Vec<JoinRequest>> {
        self.load_active(meeting_id)?;
        self.store.list_join_requests(meeting_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::MeetingLifecycle;
    use crate::models::{
        ClassCode, GuestDraft, JoinRequestStatus, Member, MeetingDraft, MeetingStatus,
        ParticipantDraft, RoleTag,
    };
    use crate::notify::testing::RecordingNotifier;
    use crate::storage::{Database, MeetingRepository, MemberRepository};
    use chrono::{NaiveDate, NaiveTime};

    fn guest(id: &str) -> GuestDraft {
        GuestDraft {
            id: id.to_string(),
            display_name: id.to_string(),
            external_chat_id: None,
            roles: Vec::new(),
            classes: Vec::new(),
            role: RoleTag::Boss,
            class: ClassCode::BongLai,
            position: None,
        }
    }

    fn meeting_with_guests(db: &Database, count: usize) -> Meeting {
        let notifier = RecordingNotifier::default();
        MeetingLifecycle::new(db, &notifier)
            .create(&MeetingDraft {
                title: "Bí cảnh".into(),
                description: "Tối nay".into(),
                date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
                time: NaiveTime::from_hms_opt(21, 30, 0).unwrap(),
                participants: Vec::new(),
                guests: (0..count).map(|i| guest(&format!("g{}", i))).collect(),
            })
            .unwrap()
    }

    fn submission(chat_id: &str) -> JoinSubmission {
        JoinSubmission {
            external_chat_id: chat_id.to_string(),
            display_name: format!("User {}", chat_id),
            requested_role: RoleTag::Buff,
            requested_class: ClassCode::VanHoa,
        }
    }

    #[test]
    fn test_submit_provisions_unknown_member() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let admission = JoinAdmission::new(&db, &notifier);
        let meeting = meeting_with_guests(&db, 1);

        let outcome = admission.submit(meeting.id, &submission("100")).unwrap();
        assert!(outcome.new_member_created);
        assert_eq!(outcome.meeting_title, "Bí cảnh");
        assert_eq!(outcome.request.status, JoinRequestStatus::Pending);

        let member = db
            .find_member(&MemberKey::ExternalChatId("100".into()))
            .unwrap()
            .unwrap();
        assert!(member.active);
        assert!(member.eligible_classes.contains(&ClassCode::VanHoa));
        assert_eq!(notifier.direct_to("100").len(), 1);
    }

    #[test]
    fn test_one_pending_request_per_requester() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let admission = JoinAdmission::new(&db, &notifier);
        let meeting = meeting_with_guests(&db, 1);

        admission.submit(meeting.id, &submission("200")).unwrap();
        let err = admission.submit(meeting.id, &submission("200")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        admission
            .reject(meeting.id, "200", "admin", Some("Đủ người".into()))
            .unwrap();
        let again = admission.submit(meeting.id, &submission("200")).unwrap();
        assert!(!again.new_member_created);
        assert_eq!(admission.list(meeting.id).unwrap().len(), 2);
    }

    #[test]
    fn test_seated_member_cannot_request() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let admission = JoinAdmission::new(&db, &notifier);

        let seated = Member::new("Seated".into())
            .with_external_chat_id("300")
            .with_classes([ClassCode::VanHoa]);
        db.create_member(&seated).unwrap();

        let meeting = MeetingLifecycle::new(&db, &notifier)
            .create(&MeetingDraft {
                title: "Bí cảnh".into(),
                description: "Tối nay".into(),
                date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
                time: NaiveTime::from_hms_opt(21, 30, 0).unwrap(),
                participants: vec![ParticipantDraft {
                    member_id: seated.id,
                    display_name: String::new(),
                    role: RoleTag::Buff,
                    class: ClassCode::VanHoa,
                    position: None,
                }],
                guests: vec![guest("g0")],
            })
            .unwrap();

        let err = admission.submit(meeting.id, &submission("300")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(admission.list(meeting.id).unwrap().is_empty());
    }

    #[test]
    fn test_submit_window() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let admission = JoinAdmission::new(&db, &notifier);
        let lifecycle = MeetingLifecycle::new(&db, &notifier);

        let confirmed = meeting_with_guests(&db, 1);
        lifecycle.confirm(confirmed.id).unwrap();
        assert!(matches!(
            admission.submit(confirmed.id, &submission("1")).unwrap_err(),
            Error::InvalidTransition(_)
        ));

        let canceled = meeting_with_guests(&db, 1);
        lifecycle.cancel(canceled.id).unwrap();
        assert!(matches!(
            admission.submit(canceled.id, &submission("1")).unwrap_err(),
            Error::InvalidTransition(_)
        ));

        let deleted = meeting_with_guests(&db, 1);
        lifecycle.delete(deleted.id).unwrap();
        assert!(matches!(
            admission.submit(deleted.id, &submission("1")).unwrap_err(),
            Error::NotFound(_)
        ));

        let mut bad = submission("1");
        bad.requested_role = RoleTag::Tank;
        let open = meeting_with_guests(&db, 1);
        assert!(matches!(
            admission.submit(open.id, &bad).unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[test]
    fn test_approve_appends_participant() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let admission = JoinAdmission::new(&db, &notifier);
        let meeting = meeting_with_guests(&db, 2);

        admission.submit(meeting.id, &submission("300")).unwrap();
        let resolution = admission
            .approve(meeting.id, "300", "admin", None)
            .unwrap();

        assert_eq!(resolution.request.status, JoinRequestStatus::Approved);
        assert_eq!(resolution.request.processed_by.as_deref(), Some("admin"));
        assert!(resolution.request.processed_at.is_some());
        assert!(matches!(resolution.admission, Some(Admission::Participant(_))));

        let stored = db.find_meeting(meeting.id).unwrap().unwrap();
        assert_eq!(stored.participants.len(), 1);
        assert_eq!(stored.participants[0].position, 2);
        assert!(stored.is_participant("300"));

        // Now on the roster, so a fresh request conflicts
        let err = admission.submit(meeting.id, &submission("300")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Request is terminal
        let err = admission.approve(meeting.id, "300", "admin", None).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(notifier.direct_to("300").len(), 2);
    }

    #[test]
    fn test_approve_falls_back_to_guest() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let admission = JoinAdmission::new(&db, &notifier);
        let meeting = meeting_with_guests(&db, 1);

        admission.submit(meeting.id, &submission("400")).unwrap();
        let member: Member = db
            .find_member(&MemberKey::ExternalChatId("400".into()))
            .unwrap()
            .unwrap();
        db.deactivate_member(member.id).unwrap();

        let resolution = admission.approve(meeting.id, "400", "admin", None).unwrap();
        assert!(matches!(resolution.admission, Some(Admission::Guest(_))));

        let stored = db.find_meeting(meeting.id).unwrap().unwrap();
        assert!(stored.participants.is_empty());
        assert!(stored.is_guest("400"));
        assert_eq!(stored.guests[1].position, 1);
    }

    #[test]
    fn test_approve_respects_roster_cap() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let admission = JoinAdmission::new(&db, &notifier);
        let meeting = meeting_with_guests(&db, MAX_ROSTER_SIZE);

        admission.submit(meeting.id, &submission("500")).unwrap();
        let err = admission.approve(meeting.id, "500", "admin", None).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));

        // Still pending, can be rejected instead
        let resolution = admission
            .reject(meeting.id, "500", "admin", Some("Full".into()))
            .unwrap();
        assert_eq!(resolution.request.status, JoinRequestStatus::Rejected);
        assert_eq!(resolution.request.reason.as_deref(), Some("Full"));
        assert!(resolution.admission.is_none());
    }

    #[test]
    fn test_notification_failure_does_not_block() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::failing();
        let admission = JoinAdmission::new(&db, &notifier);
        let meeting = meeting_with_guests(&db, 1);

        admission.submit(meeting.id, &submission("600")).unwrap();
        let resolution = admission.approve(meeting.id, "600", "admin", None).unwrap();
        assert_eq!(resolution.request.status, JoinRequestStatus::Approved);
        assert_eq!(
            db.find_meeting(meeting.id).unwrap().unwrap().status,
            MeetingStatus::Draft
        );
    }
}
