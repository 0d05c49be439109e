//! Types shared between the client seam and the sidecar wire protocol.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

/// Chromium flags the sidecar uses when it runs a headless browser transport.
pub const HARDENED_BROWSER_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
];

/// Construction options for one WhatsApp client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientOptions {
    pub session_id: String,
    pub prefix: String,
    /// Local auth store for this session (`<sessions dir>/<session id>`).
    pub auth_dir: PathBuf,
    /// Render QR codes in the terminal.
    pub qr_terminal: bool,
    pub headless: bool,
    pub browser_args: Vec<String>,
    pub restart_on_auth_failure: bool,
    pub takeover_on_conflict: bool,
    /// Phone number used for pairing-code linking.
    pub phone_number: Option<String>,
}

impl ClientOptions {
    /// Options with the defaults every session uses: auth store keyed by
    /// session id, terminal QR, hardened headless transport.
    pub fn new(session_id: &str, prefix: &str, sessions_dir: &Path) -> Self {
        Self {
            session_id: session_id.to_string(),
            prefix: prefix.to_string(),
            auth_dir: sessions_dir.join(session_id),
            qr_terminal: true,
            headless: true,
            browser_args: HARDENED_BROWSER_ARGS.iter().map(|s| s.to_string()).collect(),
            restart_on_auth_failure: true,
            takeover_on_conflict: false,
            phone_number: None,
        }
    }
}

/// Identity of the account a session is logged in as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectedUser {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// One inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: String,
    /// Chat JID replies go to.
    pub chat_id: String,
    /// Sender JID (`<phone>[:device]@s.whatsapp.net`).
    pub sender: String,
    pub sender_name: Option<String>,
    pub body: String,
    pub from_me: bool,
    pub is_group: bool,
}

impl IncomingMessage {
    /// Sender phone number with the JID server and device suffix stripped.
    pub fn sender_phone(&self) -> &str {
        phone_from_jid(&self.sender)
    }
}

/// `15550001:3@s.whatsapp.net` → `15550001`.
pub fn phone_from_jid(jid: &str) -> &str {
    let user = jid.split_once('@').map_or(jid, |(user, _)| user);
    user.split_once(':').map_or(user, |(phone, _)| phone)
}

/// Read-only view of a session's pairing code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairingCodeInfo {
    pub has_code: bool,
    pub code: Option<String>,
    pub is_expired: bool,
    /// Seconds until expiry; zero once expired.
    pub expires_in: u64,
}

impl PairingCodeInfo {
    /// A code exists and has not expired.
    pub fn is_live(&self) -> bool {
        self.has_code && !self.is_expired
    }
}

/// A pairing code as issued by the WhatsApp linking flow.
#[derive(Debug, Clone)]
pub struct IssuedPairingCode {
    pub code: String,
    pub expires_at: Instant,
}

impl IssuedPairingCode {
    pub fn new(code: String, ttl: Duration) -> Self {
        Self {
            code,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn info_at(&self, now: Instant) -> PairingCodeInfo {
        let remaining = self.expires_at.saturating_duration_since(now);
        PairingCodeInfo {
            has_code: true,
            code: Some(self.code.clone()),
            is_expired: remaining.is_zero(),
            expires_in: remaining.as_secs(),
        }
    }

    pub fn info(&self) -> PairingCodeInfo {
        self.info_at(Instant::now())
    }
}

/// Events a client delivers to its session, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A QR code is waiting to be scanned.
    Qr(String),
    /// A pairing code was issued.
    PairingCode { code: String, expires_in_secs: u64 },
    Authenticated,
    Ready(ConnectedUser),
    AuthFailure(String),
    Disconnected(String),
    Message(IncomingMessage),
}

// ── Sidecar wire protocol ───────────────────────────────────────────────────

/// Frames sent to the sidecar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    Login {
        account_id: String,
        auth_dir: String,
        print_qr: bool,
        headless: bool,
        browser_args: Vec<String>,
        restart_on_auth_failure: bool,
        takeover_on_conflict: bool,
    },
    Logout {
        account_id: String,
    },
    SendMessage {
        request_id: String,
        account_id: String,
        to: String,
        text: String,
    },
    RequestPairingCode {
        account_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        phone_number: Option<String>,
    },
}

impl GatewayMessage {
    pub fn login(options: &ClientOptions) -> Self {
        Self::Login {
            account_id: options.session_id.clone(),
            auth_dir: options.auth_dir.to_string_lossy().into_owned(),
            // The sidecar only forwards the code; rendering happens here.
            print_qr: false,
            headless: options.headless,
            browser_args: options.browser_args.clone(),
            restart_on_auth_failure: options.restart_on_auth_failure,
            takeover_on_conflict: options.takeover_on_conflict,
        }
    }
}

/// Frames received from the sidecar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    Qr {
        account_id: String,
        qr: String,
    },
    PairingCode {
        account_id: String,
        code: String,
        expires_in_secs: u64,
    },
    Authenticated {
        account_id: String,
    },
    Connected {
        account_id: String,
        #[serde(default)]
        phone_number: Option<String>,
        #[serde(default)]
        push_name: Option<String>,
    },
    AuthFailure {
        account_id: String,
        error: String,
    },
    Disconnected {
        account_id: String,
        reason: String,
    },
    LoggedOut {
        account_id: String,
    },
    InboundMessage {
        account_id: String,
        message_id: String,
        chat_jid: String,
        sender_jid: String,
        #[serde(default)]
        sender_name: Option<String>,
        #[serde(default)]
        from_me: bool,
        #[serde(default)]
        is_group: bool,
        #[serde(default)]
        body: Option<String>,
    },
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        #[serde(default)]
        account_id: Option<String>,
        error: String,
    },
}

impl SidecarMessage {
    /// Session the frame belongs to; `None` for request-scoped frames.
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Self::Qr { account_id, .. }
            | Self::PairingCode { account_id, .. }
            | Self::Authenticated { account_id }
            | Self::Connected { account_id, .. }
            | Self::AuthFailure { account_id, .. }
            | Self::Disconnected { account_id, .. }
            | Self::LoggedOut { account_id }
            | Self::InboundMessage { account_id, .. } => Some(account_id),
            Self::Error { account_id, .. } => account_id.as_deref(),
            Self::SendResult { .. } => None,
        }
    }

    /// Translate a session-scoped frame into a client event.
    ///
    /// `SendResult` and `Error` frames carry no session state and map to `None`.
    pub fn into_client_event(self) -> Option<ClientEvent> {
        match self {
            Self::Qr { qr, .. } => Some(ClientEvent::Qr(qr)),
            Self::PairingCode {
                code,
                expires_in_secs,
                ..
            } => Some(ClientEvent::PairingCode {
                code,
                expires_in_secs,
            }),
            Self::Authenticated { .. } => Some(ClientEvent::Authenticated),
            Self::Connected {
                phone_number,
                push_name,
                ..
            } => Some(ClientEvent::Ready(ConnectedUser {
                name: push_name,
                phone: phone_number,
            })),
            Self::AuthFailure { error, .. } => Some(ClientEvent::AuthFailure(error)),
            Self::Disconnected { reason, .. } => Some(ClientEvent::Disconnected(reason)),
            Self::LoggedOut { .. } => Some(ClientEvent::Disconnected("logged out".into())),
            Self::InboundMessage {
                message_id,
                chat_jid,
                sender_jid,
                sender_name,
                from_me,
                is_group,
                body,
                ..
            } => Some(ClientEvent::Message(IncomingMessage {
                id: message_id,
                chat_id: chat_jid,
                sender: sender_jid,
                sender_name,
                body: body.unwrap_or_default(),
                from_me,
                is_group,
            })),
            Self::SendResult { .. } | Self::Error { .. } => None,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn phone_is_extracted_from_jid() {
        assert_eq!(phone_from_jid("15550001@s.whatsapp.net"), "15550001");
        assert_eq!(phone_from_jid("15550001:12@s.whatsapp.net"), "15550001");
        assert_eq!(phone_from_jid("15550001"), "15550001");
    }

    #[test]
    fn client_options_key_auth_dir_by_session() {
        let opts = ClientOptions::new("voltron-session-2", "!", Path::new("./sessions"));
        assert_eq!(opts.auth_dir, PathBuf::from("./sessions/voltron-session-2"));
        assert!(opts.qr_terminal);
        assert!(opts.headless);
        assert!(opts.browser_args.iter().any(|a| a == "--no-sandbox"));
        assert!(!opts.takeover_on_conflict);
    }

    #[test]
    fn pairing_code_info_counts_down() {
        let issued = IssuedPairingCode::new("ABCD-1234".into(), Duration::from_secs(60));
        let info = issued.info_at(issued.expires_at - Duration::from_secs(20));
        assert!(info.is_live());
        assert_eq!(info.code.as_deref(), Some("ABCD-1234"));
        assert_eq!(info.expires_in, 20);

        let expired = issued.info_at(issued.expires_at + Duration::from_secs(1));
        assert!(expired.has_code);
        assert!(expired.is_expired);
        assert!(!expired.is_live());
        assert_eq!(expired.expires_in, 0);
    }

    #[test]
    fn default_pairing_info_has_no_code() {
        let info = PairingCodeInfo::default();
        assert!(!info.has_code);
        assert!(!info.is_live());
    }

    #[test]
    fn login_frame_shape() {
        let opts = ClientOptions::new("s1", ".", Path::new("/tmp/auth"));
        let frame = serde_json::to_value(GatewayMessage::login(&opts)).unwrap();
        assert_eq!(frame["type"], "login");
        assert_eq!(frame["account_id"], "s1");
        assert_eq!(frame["auth_dir"], "/tmp/auth/s1");
        assert_eq!(frame["print_qr"], false);
    }

    #[test]
    fn pairing_request_omits_missing_phone() {
        let frame = serde_json::to_value(GatewayMessage::RequestPairingCode {
            account_id: "s1".into(),
            phone_number: None,
        })
        .unwrap();
        assert_eq!(frame, json!({"type": "request_pairing_code", "account_id": "s1"}));
    }

    #[test]
    fn connected_frame_becomes_ready() {
        let msg: SidecarMessage = serde_json::from_value(json!({
            "type": "connected",
            "account_id": "s1",
            "phone_number": "15550001",
            "push_name": "Alice",
        }))
        .unwrap();
        assert_eq!(msg.account_id(), Some("s1"));
        assert_eq!(
            msg.into_client_event(),
            Some(ClientEvent::Ready(ConnectedUser {
                name: Some("Alice".into()),
                phone: Some("15550001".into()),
            }))
        );
    }

    #[test]
    fn inbound_frame_defaults_optional_fields() {
        let msg: SidecarMessage = serde_json::from_value(json!({
            "type": "inbound_message",
            "account_id": "s1",
            "message_id": "m1",
            "chat_jid": "123@g.us",
            "sender_jid": "15550001@s.whatsapp.net",
        }))
        .unwrap();
        let Some(ClientEvent::Message(message)) = msg.into_client_event() else {
            panic!("expected a message event");
        };
        assert_eq!(message.body, "");
        assert!(!message.from_me);
        assert_eq!(message.sender_phone(), "15550001");
    }

    #[test]
    fn logged_out_maps_to_disconnect() {
        let msg = SidecarMessage::LoggedOut {
            account_id: "s1".into(),
        };
        assert_eq!(
            msg.into_client_event(),
            Some(ClientEvent::Disconnected("logged out".into()))
        );
    }

    #[test]
    fn send_result_has_no_session() {
        let msg = SidecarMessage::SendResult {
            request_id: "r1".into(),
            success: true,
            error: None,
        };
        assert_eq!(msg.account_id(), None);
        assert_eq!(msg.into_client_event(), None);
    }
}
