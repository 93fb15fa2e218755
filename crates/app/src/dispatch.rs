//! Protocol request handling
//!
//! Each request locks the database, runs one core service call and maps the
//! result to a response.

use std::sync::Arc;

use tracing::{debug, error};

use bicanh_core::{
    Database, ErrorKind, HosterSelector, JoinAdmission, MeetingLifecycle, MemberRegistry,
    Result, ScoreLedger,
};
use bicanh_net::{Handler, Request, Response};

use crate::auth::KeyVerifier;
use crate::state::AppState;

pub struct Dispatcher {
    state: Arc<AppState>,
    keys: KeyVerifier,
}

fn reply<T>(name: &str, result: Result<T>, wrap: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => wrap(value),
        Err(e) => {
            if e.kind() == ErrorKind::Internal {
                error!(request = name, error = %e, "Request failed");
            } else {
                debug!(request = name, error = %e, "Request refused");
            }
            Response::error(&e)
        }
    }
}

impl Dispatcher {
    pub fn new(state: Arc<AppState>, keys: KeyVerifier) -> Self {
        Self { state, keys }
    }

    fn run(&self, db: &Database, request: Request) -> Response {
        let name = request.name();
        let notifier = self.state.notifier.as_ref();
        let registry = MemberRegistry::new(db);
        let ledger = ScoreLedger::new(db);
        let lifecycle =
            MeetingLifecycle::new(db, notifier).with_meeting_credit(self.state.meeting_credit);
        let admission = JoinAdmission::new(db, notifier);
        let selector = HosterSelector::new(db, notifier);

        match request {
            // Answered by the server before reaching here
            Request::Hello { .. } | Request::Ping => Response::Pong,

            Request::CreateMember { member } => {
                reply(name, registry.register(&member), |member| Response::Member { member })
            }
            Request::UpdateMember { member_id, member } => reply(
                name,
                registry.update(member_id, &member),
                |member| Response::Member { member },
            ),
            Request::DeactivateMember { member_id } => {
                reply(name, registry.deactivate(member_id), |()| Response::Done)
            }
            Request::ListMembers => {
                reply(name, registry.list_active(), |members| Response::Members { members })
            }

            Request::CreateMeeting { meeting } => {
                reply(name, lifecycle.create(&meeting), |meeting| Response::Meeting { meeting })
            }
            Request::UpdateMeeting { meeting_id, meeting } => reply(
                name,
                lifecycle.update(meeting_id, &meeting),
                |meeting| Response::Meeting { meeting },
            ),
            Request::ReorderRoster {
                meeting_id,
                positions,
            } => reply(
                name,
                lifecycle.reorder_roster(meeting_id, &positions),
                |meeting| Response::Meeting { meeting },
            ),
            Request::GetMeeting { meeting_id } => {
                reply(name, lifecycle.get(meeting_id), |meeting| Response::Meeting { meeting })
            }
            Request::ListMeetings => {
                reply(name, lifecycle.list_active(), |meetings| Response::Meetings { meetings })
            }
            Request::LatestActiveMeeting => reply(name, lifecycle.latest_active(), |meeting| {
                Response::MaybeMeeting { meeting }
            }),
            Request::LatestConfirmedMeeting => {
                reply(name, lifecycle.latest_confirmed(), |meeting| {
                    Response::MaybeMeeting { meeting }
                })
            }
            Request::ConfirmMeeting { meeting_id } => {
                reply(name, lifecycle.confirm(meeting_id), |confirmation| {
                    Response::Confirmed { confirmation }
                })
            }
            Request::CancelMeeting { meeting_id } => {
                reply(name, lifecycle.cancel(meeting_id), |meeting| Response::Meeting { meeting })
            }
            Request::CompleteMeeting { meeting_id } => {
                reply(name, lifecycle.complete(meeting_id), |meeting| Response::Meeting { meeting })
            }
            Request::DeleteMeeting { meeting_id } => {
                reply(name, lifecycle.delete(meeting_id), |()| Response::Done)
            }

            Request::SubmitJoinRequest {
                meeting_id,
                submission,
            } => reply(name, admission.submit(meeting_id, &submission), |outcome| {
                Response::JoinSubmitted { outcome }
            }),
            Request::ApproveJoinRequest {
                meeting_id,
                external_chat_id,
                processed_by,
                reason,
            } => reply(
                name,
                admission.approve(meeting_id, &external_chat_id, &processed_by, reason),
                |resolution| Response::JoinResolved { resolution },
            ),
            Request::RejectJoinRequest {
                meeting_id,
                external_chat_id,
                processed_by,
                reason,
            } => reply(
                name,
                admission.reject(meeting_id, &external_chat_id, &processed_by, reason),
                |resolution| Response::JoinResolved { resolution },
            ),
            Request::ListJoinRequests { meeting_id } => {
                reply(name, admission.list(meeting_id), |requests| {
                    Response::JoinRequests { requests }
                })
            }

            Request::SelectHoster { meeting_id } => {
                let mut rng = rand::thread_rng();
                reply(name, selector.select(meeting_id, &mut rng), |selection| {
                    Response::HosterSelected { selection }
                })
            }
            Request::SelectHosterForLatestConfirmed => {
                let mut rng = rand::thread_rng();
                reply(name, selector.select_for_latest_confirmed(&mut rng), |selection| {
                    Response::HosterSelected { selection }
                })
            }
            Request::GetHoster { meeting_id } => {
                reply(name, selector.get(meeting_id), |hoster| Response::Hoster { hoster })
            }

            Request::AdjustScore {
                member,
                delta,
                reason,
                actor,
            } => reply(
                name,
                ledger.adjust(&member, delta, &reason, &actor),
                |outcome| Response::ScoreAdjusted { outcome },
            ),
            Request::GetScore { member } => {
                reply(name, ledger.get_score(&member), |record| Response::Score { record })
            }
            Request::Leaderboard { limit } => {
                reply(name, ledger.leaderboard(limit), |records| Response::Leaderboard { records })
            }
        }
    }
}

impl Handler for Dispatcher {
    fn authenticate(&self, api_key: &str) -> bool {
        self.keys.verify(api_key)
    }

    fn handle(&self, request: Request) -> Response {
        let name = request.name();
        match self.state.db() {
            Ok(db) => self.run(&db, request),
            Err(e) => reply(name, Err::<(), _>(e), |()| Response::Done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    use bicanh_core::{
        ClassCode, JoinSubmission, MeetingDraft, MeetingStatus, MemberDraft, MemberKey,
        NoopNotifier, ParticipantDraft, RoleTag,
    };
    use bicanh_net::{Client, Error as NetError, Server};

    use crate::auth::hash_key;

    const KEY: &str = "test-key";

    fn dispatcher() -> Dispatcher {
        let db = Database::open_in_memory().unwrap();
        let state = AppState::new(db, Arc::new(NoopNotifier), 1);
        let keys = KeyVerifier::new(Some(hash_key(KEY).unwrap())).unwrap();
        Dispatcher::new(Arc::new(state), keys)
    }

    fn member_draft(name: &str, chat_id: &str) -> MemberDraft {
        MemberDraft {
            display_name: name.into(),
            external_chat_id: Some(chat_id.into()),
            roles: vec![RoleTag::Dps],
            classes: vec![ClassCode::ThienSach],
        }
    }

    fn meeting_draft(members: &[(Uuid, &str)]) -> MeetingDraft {
        MeetingDraft {
            title: "Bí cảnh tối thứ sáu".into(),
            description: "Đi full team".into(),
            date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            participants: members
                .iter()
                .map(|(id, name)| ParticipantDraft {
                    member_id: *id,
                    display_name: name.to_string(),
                    role: RoleTag::Dps,
                    class: ClassCode::ThienSach,
                    position: None,
                })
                .collect(),
            guests: vec![],
        }
    }

    fn member_of(response: Response) -> bicanh_core::Member {
        match response {
            Response::Member { member } => member,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_authenticate() {
        let d = dispatcher();
        assert!(d.authenticate(KEY));
        assert!(!d.authenticate("other"));
    }

    #[test]
    fn test_unknown_meeting_is_not_found() {
        let d = dispatcher();
        match d.handle(Request::GetMeeting {
            meeting_id: Uuid::new_v4(),
        }) {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotFound),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_member_is_validation() {
        let d = dispatcher();
        let response = d.handle(Request::CreateMember {
            member: MemberDraft {
                display_name: "   ".into(),
                ..MemberDraft::default()
            },
        });
        assert!(matches!(
            response,
            Response::Error {
                kind: ErrorKind::Validation,
                ..
            }
        ));
    }

    #[test]
    fn test_confirm_credits_and_selects() {
        let d = dispatcher();
        let an = member_of(d.handle(Request::CreateMember {
            member: member_draft("An", "111"),
        }));
        let binh = member_of(d.handle(Request::CreateMember {
            member: member_draft("Bình", "222"),
        }));

        let meeting = match d.handle(Request::CreateMeeting {
            meeting: meeting_draft(&[(an.id, "An"), (binh.id, "Bình")]),
        }) {
            Response::Meeting { meeting } => meeting,
            other => panic!("unexpected {:?}", other),
        };

        match d.handle(Request::ConfirmMeeting {
            meeting_id: meeting.id,
        }) {
            Response::Confirmed { confirmation } => {
                assert_eq!(confirmation.meeting.status, MeetingStatus::Confirmed);
                assert_eq!(confirmation.credited, vec![an.id, binh.id]);
            }
            other => panic!("unexpected {:?}", other),
        }

        match d.handle(Request::GetScore {
            member: MemberKey::ExternalChatId("111".into()),
        }) {
            Response::Score { record } => {
                assert_eq!(record.balance, 101);
                assert_eq!(record.meetings_credited, 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        let first = match d.handle(Request::SelectHoster {
            meeting_id: meeting.id,
        }) {
            Response::HosterSelected { selection } => selection,
            other => panic!("unexpected {:?}", other),
        };
        assert!(!first.already_selected);
        assert!([an.id, binh.id].contains(&first.hoster.member_id));

        match d.handle(Request::SelectHosterForLatestConfirmed) {
            Response::HosterSelected { selection } => {
                assert!(selection.already_selected);
                assert_eq!(selection.hoster.member_id, first.hoster.member_id);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_flow_over_tcp() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = Server::start(addr, Arc::new(dispatcher())).await.unwrap();

        let denied = Client::connect(server.addr(), "wrong").await;
        assert!(matches!(denied, Err(NetError::Rejected(_))));

        let mut client = Client::connect(server.addr(), KEY).await.unwrap();
        let an = client.create_member(member_draft("An", "111")).await.unwrap();
        let meeting = client
            .create_meeting(meeting_draft(&[(an.id, "An")]))
            .await
            .unwrap();

        let submission = JoinSubmission {
            external_chat_id: "333".into(),
            display_name: "Cường".into(),
            requested_role: RoleTag::Tank,
            requested_class: ClassCode::ThienSach,
        };
        let outcome = client
            .submit_join_request(meeting.id, submission.clone())
            .await
            .unwrap();
        assert!(outcome.new_member_created);

        match client.submit_join_request(meeting.id, submission).await {
            Err(NetError::Remote { kind, .. }) => assert_eq!(kind, ErrorKind::Conflict),
            other => panic!("unexpected {:?}", other),
        }

        let resolution = client
            .approve_join_request(meeting.id, "333", "admin", None)
            .await
            .unwrap();
        assert!(resolution.admission.is_some());

        let meeting = client.get_meeting(meeting.id).await.unwrap();
        assert_eq!(meeting.roster_len(), 2);
        assert!(meeting.is_participant("333"));

        server.shutdown();
    }
}
