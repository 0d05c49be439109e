//! Status snapshots and the text panel built from them.

use std::fmt::Write as _;

use {serde::Serialize, voltron_whatsapp::ConnectedUser};

use crate::state::SessionPhase;

/// Point-in-time view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    pub is_ready: bool,
    pub user: Option<ConnectedUser>,
    pub prefix: String,
    pub phase: SessionPhase,
}

/// Outcome of a full startup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartupSummary {
    pub total: usize,
    pub successful: usize,
}

impl StartupSummary {
    pub fn failed(&self) -> usize {
        self.total - self.successful
    }
}

/// Human-readable status block for every session, in startup order.
pub fn render_status_panel(statuses: &[SessionStatus]) -> String {
    let mut out = String::from("📊 *SESSION STATUS*\n");
    if statuses.is_empty() {
        out.push_str("\nNo sessions running.");
        return out;
    }
    for status in statuses {
        let online = if status.is_ready {
            "🟢 ONLINE"
        } else {
            "🔴 OFFLINE"
        };
        let user = status
            .user
            .as_ref()
            .and_then(|u| u.name.as_deref())
            .unwrap_or("Not Connected");
        let _ = write!(
            out,
            "\n{}: {online}\n   👤 {user} | Prefix: {}",
            status.session_id, status.prefix
        );
    }
    out
}
