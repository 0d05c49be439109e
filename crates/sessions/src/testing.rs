//! In-memory WhatsApp client for tests.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    voltron_config::VoltronConfig,
    voltron_whatsapp::{
        ClientEvent, ClientFactory, ClientOptions, EventSender, IncomingMessage,
        IssuedPairingCode, PairingCodeInfo, WhatsAppClient,
    },
};

pub(crate) const FAKE_PAIR_CODE: &str = "1234-5678";

/// Records every outbound message and lifecycle call.
pub(crate) struct FakeClient {
    pub options: ClientOptions,
    events: EventSender,
    fail_start: bool,
    fail_sends: AtomicBool,
    /// When false, pairing requests never produce a code.
    issues_codes: AtomicBool,
    pairing_delay: Mutex<Duration>,
    initialized_at: Mutex<Option<tokio::time::Instant>>,
    destroys: AtomicUsize,
    pair_requests: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
    pairing: Mutex<Option<IssuedPairingCode>>,
}

impl FakeClient {
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn issue_codes(&self, issue: bool) {
        self.issues_codes.store(issue, Ordering::SeqCst);
    }

    /// Make `request_pairing_code` take `delay` before it answers.
    pub fn slow_pairing(&self, delay: Duration) {
        *self.pairing_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn pair_requests(&self) -> usize {
        self.pair_requests.load(Ordering::SeqCst)
    }

    pub fn initialized_at(&self) -> Option<tokio::time::Instant> {
        *self.initialized_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WhatsAppClient for FakeClient {
    async fn initialize(&self) -> voltron_whatsapp::Result<()> {
        *self.initialized_at.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(tokio::time::Instant::now());
        if self.fail_start {
            return Err(voltron_whatsapp::Error::message("browser launch failed"));
        }
        Ok(())
    }

    async fn destroy(&self) -> voltron_whatsapp::Result<()> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> voltron_whatsapp::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(voltron_whatsapp::Error::SendFailed {
                message: "offline".into(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn request_pairing_code(&self) -> voltron_whatsapp::Result<()> {
        self.pair_requests.fetch_add(1, Ordering::SeqCst);
        let delay = *self.pairing_delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let issued = self
            .issues_codes
            .load(Ordering::SeqCst)
            .then(|| IssuedPairingCode::new(FAKE_PAIR_CODE.into(), Duration::from_secs(60)));
        *self.pairing.lock().unwrap_or_else(|e| e.into_inner()) = issued;
        Ok(())
    }

    fn pairing_code_info(&self) -> PairingCodeInfo {
        self.pairing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(IssuedPairingCode::info)
            .unwrap_or_default()
    }
}

/// Hands out [`FakeClient`]s and keeps them for inspection.
#[derive(Default)]
pub(crate) struct FakeFactory {
    fail_start: HashSet<String>,
    clients: Mutex<Vec<Arc<FakeClient>>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_start(session_ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail_start: session_ids.iter().map(|s| s.to_string()).collect(),
            clients: Mutex::new(Vec::new()),
        })
    }

    /// Most recently created client for `session_id`.
    #[allow(clippy::expect_used)]
    pub fn client(&self, session_id: &str) -> Arc<FakeClient> {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|c| c.options.session_id == session_id)
            .cloned()
            .expect("no client created for session")
    }

    pub fn clients_for(&self, session_id: &str) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.options.session_id == session_id)
            .count()
    }
}

impl ClientFactory for FakeFactory {
    fn create(
        &self,
        options: ClientOptions,
        events: EventSender,
    ) -> voltron_whatsapp::Result<Arc<dyn WhatsAppClient>> {
        let client = Arc::new(FakeClient {
            fail_start: self.fail_start.contains(&options.session_id),
            options,
            events,
            fail_sends: AtomicBool::new(false),
            issues_codes: AtomicBool::new(true),
            pairing_delay: Mutex::new(Duration::ZERO),
            initialized_at: Mutex::new(None),
            destroys: AtomicUsize::new(0),
            pair_requests: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            pairing: Mutex::new(None),
        });
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&client));
        Ok(client)
    }
}

/// Default settings with a scratch sessions dir.
pub(crate) fn settings() -> VoltronConfig {
    let mut cfg = VoltronConfig::default();
    cfg.bot.sessions_dir = "/tmp/voltron-test-sessions".into();
    cfg
}

/// A direct message from `phone`.
pub(crate) fn incoming(phone: &str, body: &str) -> IncomingMessage {
    let jid = format!("{phone}@s.whatsapp.net");
    IncomingMessage {
        id: format!("msg-{phone}"),
        chat_id: jid.clone(),
        sender: jid,
        sender_name: None,
        body: body.to_string(),
        from_me: false,
        is_group: false,
    }
}

/// Let spawned event loops drain.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
