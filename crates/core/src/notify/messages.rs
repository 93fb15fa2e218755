//! Chat message bodies

use crate::models::{HosterRecord, JoinDecision, JoinRequest, Meeting};

fn when(meeting: &Meeting) -> String {
    format!(
        "{} lúc {}",
        meeting.date.format("%Y-%m-%d"),
        meeting.time.format("%H:%M")
    )
}

/// Sent to the requester once a join request is stored
pub fn join_submitted(meeting: &Meeting, request: &JoinRequest) -> String {
    format!(
        "🎮 **Yêu cầu tham gia đã được gửi**\n\n\
         **Bí cảnh:** {}\n\
         **Ngày:** {}\n\
         **Vai trò yêu cầu:** {} - {}\n\n\
         ✅ Yêu cầu tham gia của bạn đã được gửi thành công!\n\
         ⏳ Vui lòng chờ admin phê duyệt yêu cầu của bạn.",
        meeting.title,
        when(meeting),
        request.requested_role,
        request.requested_class,
    )
}

/// Sent to the requester after an admin decision
pub fn join_resolved(meeting: &Meeting, request: &JoinRequest, decision: JoinDecision) -> String {
    let (status, outcome) = match decision {
        JoinDecision::Approve => ("chấp nhận", "✅ Bạn đã được chấp nhận tham gia bí cảnh này!"),
        JoinDecision::Reject => ("từ chối", "❌ Yêu cầu tham gia của bạn đã bị từ chối."),
    };
    let reason = request
        .reason
        .as_deref()
        .map(|r| format!("\nLý do: {}", r))
        .unwrap_or_default();

    format!(
        "🎮 **Thông báo yêu cầu tham gia bí cảnh**\n\n\
         **Bí cảnh:** {}\n\
         **Ngày:** {}\n\
         **Trạng thái:** {}\n\
         **Vai trò yêu cầu:** {} - {}{}\n\n{}",
        meeting.title,
        when(meeting),
        status,
        request.requested_role,
        request.requested_class,
        reason,
        outcome,
    )
}

/// Broadcast when a meeting is confirmed; the transport adds mentions
pub fn meeting_confirmed(meeting: &Meeting) -> String {
    format!(
        "{} - {} vào lúc {} - {} nhé mọi người !",
        meeting.title,
        meeting.description,
        meeting.date.format("%Y-%m-%d"),
        meeting.time.format("%H:%M"),
    )
}

/// Sent to the participant picked as hoster
pub fn hoster_selected(meeting: &Meeting, hoster: &HosterRecord) -> String {
    format!(
        "👑 **Bạn được chọn làm chủ xị**\n\n\
         **Bí cảnh:** {}\n\
         **Ngày:** {}\n\
         **Vai trò:** {} - {}\n\
         **Điểm:** {}",
        meeting.title,
        when(meeting),
        hoster.assigned_role,
        hoster.assigned_class,
        hoster.score,
    )
}
