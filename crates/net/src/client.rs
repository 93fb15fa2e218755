//! TCP client for the coordination service
//!
//! Used by the chat bot and admin tooling. One request is in flight at a time.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::{debug, info};
use uuid::Uuid;

use bicanh_core::{
    AdjustOutcome, Confirmation, HosterRecord, HosterSelection, JoinRequest, JoinSubmission,
    Meeting, MeetingDraft, Member, MemberDraft, MemberKey, Resolution, ScoreRecord,
    SubmitOutcome,
};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{Request, Response};
use crate::server::SERVER_FULL;

/// Authenticated connection
pub struct Client {
    stream: TcpStream,
    server_version: String,
}

/// Turn a response of the wrong shape into an error
fn unexpected(response: Response) -> Error {
    match response {
        Response::Error { kind, message } => Error::Remote { kind, message },
        other => Error::UnexpectedResponse(format!("{:?}", other)),
    }
}

impl Client {
    /// Connect and authenticate
    pub async fn connect(addr: SocketAddr, api_key: &str) -> Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        debug!(addr = %addr, "TCP connected");

        write_frame(
            &mut stream,
            &Request::Hello {
                api_key: api_key.to_string(),
            },
        )
        .await?;

        match read_frame::<Response, _>(&mut stream).await? {
            Response::Welcome { server_version } => {
                info!(addr = %addr, server_version = %server_version, "Connected");
                Ok(Client {
                    stream,
                    server_version,
                })
            }
            Response::Rejected { reason } if reason == SERVER_FULL => Err(Error::ServerFull),
            Response::Rejected { reason } => Err(Error::Rejected(reason)),
            other => Err(unexpected(other)),
        }
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Send one request and wait for its response
    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        write_frame(&mut self.stream, request).await?;
        read_frame(&mut self.stream).await
    }

    /// Send a request whose only success answer is `Done`
    async fn call_done(&mut self, request: &Request) -> Result<()> {
        match self.call(request).await? {
            Response::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn call_meeting(&mut self, request: &Request) -> Result<Meeting> {
        match self.call(request).await? {
            Response::Meeting { meeting } => Ok(meeting),
            other => Err(unexpected(other)),
        }
    }

    async fn call_maybe_meeting(&mut self, request: &Request) -> Result<Option<Meeting>> {
        match self.call(request).await? {
            Response::MaybeMeeting { meeting } => Ok(meeting),
            other => Err(unexpected(other)),
        }
    }

    async fn call_resolution(&mut self, request: &Request) -> Result<Resolution> {
        match self.call(request).await? {
            Response::JoinResolved { resolution } => Ok(resolution),
            other => Err(unexpected(other)),
        }
    }

    async fn call_selection(&mut self, request: &Request) -> Result<HosterSelection> {
        match self.call(request).await? {
            Response::HosterSelected { selection } => Ok(selection),
            other => Err(unexpected(other)),
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.call(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    // Members

    pub async fn create_member(&mut self, member: MemberDraft) -> Result<Member> {
        match self.call(&Request::CreateMember { member }).await? {
            Response::Member { member } => Ok(member),
            other => Err(unexpected(other)),
        }
    }

    pub async fn update_member(&mut self, member_id: Uuid, member: MemberDraft) -> Result<Member> {
        match self.call(&Request::UpdateMember { member_id, member }).await? {
            Response::Member { member } => Ok(member),
            other => Err(unexpected(other)),
        }
    }

    pub async fn deactivate_member(&mut self, member_id: Uuid) -> Result<()> {
        self.call_done(&Request::DeactivateMember { member_id }).await
    }

    pub async fn list_members(&mut self) -> Result<Vec<Member>> {
        match self.call(&Request::ListMembers).await? {
            Response::Members { members } => Ok(members),
            other => Err(unexpected(other)),
        }
    }

    // Meetings

    pub async fn create_meeting(&mut self, meeting: MeetingDraft) -> Result<Meeting> {
        self.call_meeting(&Request::CreateMeeting { meeting }).await
    }

    pub async fn update_meeting(
        &mut self,
        meeting_id: Uuid,
        meeting: MeetingDraft,
    ) -> Result<Meeting> {
        self.call_meeting(&Request::UpdateMeeting { meeting_id, meeting })
            .await
    }

    pub async fn get_meeting(&mut self, meeting_id: Uuid) -> Result<Meeting> {
        self.call_meeting(&Request::GetMeeting { meeting_id }).await
    }

    pub async fn list_meetings(&mut self) -> Result<Vec<Meeting>> {
        match self.call(&Request::ListMeetings).await? {
            Response::Meetings { meetings } => Ok(meetings),
            other => Err(unexpected(other)),
        }
    }

    pub async fn latest_active_meeting(&mut self) -> Result<Option<Meeting>> {
        self.call_maybe_meeting(&Request::LatestActiveMeeting).await
    }

    pub async fn latest_confirmed_meeting(&mut self) -> Result<Option<Meeting>> {
        self.call_maybe_meeting(&Request::LatestConfirmedMeeting)
            .await
    }

    pub async fn confirm_meeting(&mut self, meeting_id: Uuid) -> Result<Confirmation> {
        match self.call(&Request::ConfirmMeeting { meeting_id }).await? {
            Response::Confirmed { confirmation } => Ok(confirmation),
            other => Err(unexpected(other)),
        }
    }

    pub async fn cancel_meeting(&mut self, meeting_id: Uuid) -> Result<Meeting> {
        self.call_meeting(&Request::CancelMeeting { meeting_id }).await
    }

    pub async fn complete_meeting(&mut self, meeting_id: Uuid) -> Result<Meeting> {
        self.call_meeting(&Request::CompleteMeeting { meeting_id })
            .await
    }

    pub async fn delete_meeting(&mut self, meeting_id: Uuid) -> Result<()> {
        self.call_done(&Request::DeleteMeeting { meeting_id }).await
    }

    // Join requests

    pub async fn submit_join_request(
        &mut self,
        meeting_id: Uuid,
        submission: JoinSubmission,
    ) -> Result<SubmitOutcome> {
        match self
            .call(&Request::SubmitJoinRequest {
                meeting_id,
                submission,
            })
            .await?
        {
            Response::JoinSubmitted { outcome } => Ok(outcome),
            other => Err(unexpected(other)),
        }
    }

    pub async fn approve_join_request(
        &mut self,
        meeting_id: Uuid,
        external_chat_id: &str,
        processed_by: &str,
        reason: Option<String>,
    ) -> Result<Resolution> {
        self.call_resolution(&Request::ApproveJoinRequest {
            meeting_id,
            external_chat_id: external_chat_id.to_string(),
            processed_by: processed_by.to_string(),
            reason,
        })
        .await
    }

    pub async fn reject_join_request(
        &mut self,
        meeting_id: Uuid,
        external_chat_id: &str,
        processed_by: &str,
        reason: Option<String>,
    ) -> Result<Resolution> {
        self.call_resolution(&Request::RejectJoinRequest {
            meeting_id,
            external_chat_id: external_chat_id.to_string(),
            processed_by: processed_by.to_string(),
            reason,
        })
        .await
    }

    pub async fn list_join_requests(&mut self, meeting_id: Uuid) -> Result<Vec<JoinRequest>> {
        match self.call(&Request::ListJoinRequests { meeting_id }).await? {
            Response::JoinRequests { requests } => Ok(requests),
            other => Err(unexpected(other)),
        }
    }

    // Hoster

    pub async fn select_hoster(&mut self, meeting_id: Uuid) -> Result<HosterSelection> {
        self.call_selection(&Request::SelectHoster { meeting_id })
            .await
    }

    pub async fn select_hoster_for_latest_confirmed(&mut self) -> Result<HosterSelection> {
        self.call_selection(&Request::SelectHosterForLatestConfirmed)
            .await
    }

    pub async fn get_hoster(&mut self, meeting_id: Uuid) -> Result<Option<HosterRecord>> {
        match self.call(&Request::GetHoster { meeting_id }).await? {
            Response::Hoster { hoster } => Ok(hoster),
            other => Err(unexpected(other)),
        }
    }

    // Score ledger

    pub async fn adjust_score(
        &mut self,
        member: MemberKey,
        delta: i64,
        reason: &str,
        actor: &str,
    ) -> Result<AdjustOutcome> {
        let request = Request::AdjustScore {
            member,
            delta,
            reason: reason.to_string(),
            actor: actor.to_string(),
        };
        match self.call(&request).await? {
            Response::ScoreAdjusted { outcome } => Ok(outcome),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_score(&mut self, member: MemberKey) -> Result<ScoreRecord> {
        match self.call(&Request::GetScore { member }).await? {
            Response::Score { record } => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    pub async fn leaderboard(&mut self, limit: Option<u32>) -> Result<Vec<ScoreRecord>> {
        match self.call(&Request::Leaderboard { limit }).await? {
            Response::Leaderboard { records } => Ok(records),
            other => Err(unexpected(other)),
        }
    }
}
