//! Readiness state machine for one session.

use serde::Serialize;

use voltron_whatsapp::{ClientEvent, ConnectedUser};

/// Where a session is in the link/auth lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Created,
    AwaitingScan,
    AwaitingPair,
    Authenticated,
    Ready,
    Failed,
    Disconnected,
    Stopped,
}

/// Mutable readiness state. `ready` is true only between a `Ready` event and
/// the next `AuthFailure`, `Disconnected` or stop.
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    pub phase: SessionPhase,
    pub ready: bool,
    pub user: Option<ConnectedUser>,
}

impl Readiness {
    /// Apply one client event. Message events leave the state untouched.
    pub fn apply(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::Qr(_) => self.phase = SessionPhase::AwaitingScan,
            ClientEvent::PairingCode { .. } => self.phase = SessionPhase::AwaitingPair,
            ClientEvent::Authenticated => self.phase = SessionPhase::Authenticated,
            ClientEvent::Ready(user) => {
                self.phase = SessionPhase::Ready;
                self.ready = true;
                self.user = Some(user.clone());
            },
            ClientEvent::AuthFailure(_) => {
                self.phase = SessionPhase::Failed;
                self.ready = false;
            },
            ClientEvent::Disconnected(_) => {
                self.phase = SessionPhase::Disconnected;
                self.ready = false;
                self.user = None;
            },
            ClientEvent::Message(_) => {},
        }
    }

    pub fn stop(&mut self) {
        self.phase = SessionPhase::Stopped;
        self.ready = false;
        self.user = None;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> ConnectedUser {
        ConnectedUser {
            name: Some("Alice".into()),
            phone: Some("15550001".into()),
        }
    }

    #[test]
    fn ready_after_ready_event() {
        let mut r = Readiness::default();
        r.apply(&ClientEvent::Qr("2@x".into()));
        assert_eq!(r.phase, SessionPhase::AwaitingScan);
        r.apply(&ClientEvent::Authenticated);
        assert!(!r.ready);
        r.apply(&ClientEvent::Ready(user()));
        assert!(r.ready);
        assert_eq!(r.user, Some(user()));
    }

    #[test]
    fn auth_failure_clears_readiness_but_keeps_user() {
        let mut r = Readiness::default();
        r.apply(&ClientEvent::Ready(user()));
        r.apply(&ClientEvent::AuthFailure("bad creds".into()));
        assert!(!r.ready);
        assert_eq!(r.phase, SessionPhase::Failed);
        assert!(r.user.is_some());
    }

    #[test]
    fn disconnect_clears_user() {
        let mut r = Readiness::default();
        r.apply(&ClientEvent::Ready(user()));
        r.apply(&ClientEvent::Disconnected("closed".into()));
        assert!(!r.ready);
        assert_eq!(r.user, None);

        r.apply(&ClientEvent::Ready(user()));
        assert!(r.ready);
    }

    #[test]
    fn pairing_code_moves_to_awaiting_pair() {
        let mut r = Readiness::default();
        r.apply(&ClientEvent::PairingCode {
            code: "ABCD-1234".into(),
            expires_in_secs: 60,
        });
        assert_eq!(r.phase, SessionPhase::AwaitingPair);
    }

    #[test]
    fn stop_resets() {
        let mut r = Readiness::default();
        r.apply(&ClientEvent::Ready(user()));
        r.stop();
        assert_eq!(r.phase, SessionPhase::Stopped);
        assert!(!r.ready);
        assert!(r.user.is_none());
    }
}
