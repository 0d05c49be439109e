/// Settings schema: bot identity, sessions, feature flags, security policy,
/// logging and deployment options.
///
/// Keys are camelCase on disk so environment files written for the bot's
/// earlier releases keep loading unchanged.
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VoltronConfig {
    pub bot: BotConfig,
    pub sessions: Vec<SessionConfig>,
    pub features: FeaturesConfig,
    pub security: SecurityConfig,
    pub database: DatabaseConfig,
    pub apis: ApisConfig,
    pub logging: LoggingConfig,
    pub deployment: DeploymentConfig,
    pub whatsapp: SidecarSettings,
}

impl Default for VoltronConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            sessions: vec![
                SessionConfig::new("voltron-session-1", ".", "Primary Session"),
                SessionConfig::new("voltron-session-2", "!", "Secondary Session"),
                SessionConfig::new("voltron-session-3", "#", "Backup Session"),
            ],
            features: FeaturesConfig::default(),
            security: SecurityConfig::default(),
            database: DatabaseConfig::default(),
            apis: ApisConfig::default(),
            logging: LoggingConfig::default(),
            deployment: DeploymentConfig::default(),
            whatsapp: SidecarSettings::default(),
        }
    }
}

/// Bot identity and session lifecycle tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BotConfig {
    pub name: String,
    pub version: String,
    /// Default command prefix for sessions that do not set their own.
    pub prefix: String,
    /// Expected number of sessions. Informational; every enabled session runs.
    pub session_count: usize,
    /// Advisory ceiling; startup warns when more sessions are enabled.
    pub max_sessions: usize,
    /// Forwarded to the WhatsApp client as "restart on auth failure".
    pub auto_restart: bool,
    /// Pause between stopping and re-initializing a session on restart.
    pub restart_delay_ms: u64,
    /// Pause between consecutive session starts.
    pub session_stagger_ms: u64,
    /// Base directory for per-session WhatsApp auth state.
    pub sessions_dir: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "VOLTRON-MD".into(),
            version: "3.0.0".into(),
            prefix: ".".into(),
            session_count: 3,
            max_sessions: 5,
            auto_restart: true,
            restart_delay_ms: 5_000,
            session_stagger_ms: 5_000,
            sessions_dir: PathBuf::from("./sessions"),
        }
    }
}

/// One WhatsApp account slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub id: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Phone number (international format, digits only) used when a pairing
    /// code is requested instead of a QR scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl SessionConfig {
    pub fn new(id: &str, prefix: &str, description: &str) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            description: description.into(),
            enabled: true,
            phone_number: None,
        }
    }
}

fn default_prefix() -> String {
    ".".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeaturesConfig {
    pub anti_spam: bool,
    pub anti_link: bool,
    pub auto_read: bool,
    pub auto_typing: bool,
    pub welcome_message: bool,
    pub goodbye_message: bool,
    pub auto_backup: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            anti_spam: true,
            anti_link: true,
            auto_read: false,
            auto_typing: false,
            welcome_message: true,
            goodbye_message: true,
            auto_backup: true,
        }
    }
}

/// Who may talk to the bot and who may run admin commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Phone numbers or glob patterns; `all` opens the bot to everyone.
    pub allowed_users: Vec<String>,
    pub blocked_users: Vec<String>,
    /// Phone numbers allowed to run admin commands; `all` makes everyone admin.
    pub admin_numbers: Vec<String>,
    /// Inbound messages longer than this (in chars) are dropped.
    pub max_message_length: usize,
    pub rate_limit: RateLimitConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_users: vec!["all".into()],
            blocked_users: Vec::new(),
            admin_numbers: Vec::new(),
            max_message_length: 1_000,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_ms: u64,
    pub max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub enabled: bool,
    /// `json`, `mongodb` or `mysql`.
    #[serde(rename = "type")]
    pub kind: String,
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: "json".into(),
            path: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApisConfig {
    pub weather: ApiKeyConfig,
    pub youtube: ApiKeyConfig,
}

/// Toggle plus credential for a third-party API.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiKeyConfig {
    pub enabled: bool,
    #[serde(serialize_with = "serialize_secret")]
    pub api_key: Secret<String>,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: Secret::new(String::new()),
        }
    }
}

impl std::fmt::Debug for ApiKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    pub level: String,
    /// Also write logs to rotating files under `dir`.
    pub file: bool,
    pub console: bool,
    pub max_files: usize,
    /// Kept for compatibility; rotation is daily, not size based.
    pub max_size: String,
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: true,
            console: true,
            max_files: 10,
            max_size: "10m".into(),
            dir: PathBuf::from("./logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Port for the `/health` endpoint.
    pub port: u16,
    pub health_check: bool,
    pub docker: bool,
    /// `koyeb`, `railway`, `heroku` or `vps`.
    pub platform: String,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            port: 3_000,
            health_check: true,
            docker: true,
            platform: "koyeb".into(),
        }
    }
}

/// How to reach the Baileys sidecar that hosts the WhatsApp clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SidecarSettings {
    pub port: u16,
    /// Spawn and supervise the sidecar process instead of expecting one.
    pub auto_start: bool,
    /// Directory containing the sidecar's `package.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for SidecarSettings {
    fn default() -> Self {
        Self {
            port: 32_680,
            auto_start: false,
            dir: None,
        }
    }
}

impl VoltronConfig {
    /// Enabled sessions in configuration order.
    pub fn enabled_sessions(&self) -> Vec<SessionConfig> {
        self.sessions.iter().filter(|s| s.enabled).cloned().collect()
    }

    /// Look up an enabled session by id.
    pub fn session(&self, session_id: &str) -> Option<SessionConfig> {
        self.enabled_sessions()
            .into_iter()
            .find(|s| s.id == session_id)
    }

    /// Check a feature flag by its camelCase name (e.g. `antiLink`).
    /// Unknown names are disabled.
    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        serde_json::to_value(&self.features)
            .ok()
            .and_then(|v| v.get(feature).and_then(serde_json::Value::as_bool))
            .unwrap_or(false)
    }

    /// Whether `phone_number` may run admin commands.
    pub fn is_admin(&self, phone_number: &str) -> bool {
        let admins = &self.security.admin_numbers;
        admins.iter().any(|a| a == "all") || admins.iter().any(|a| a == phone_number)
    }

    /// Override one `section.key` value in memory.
    ///
    /// Returns `Ok(false)` when `section` is not an object section of the
    /// config. The change is never written back to disk.
    pub fn update(
        &mut self,
        section: &str,
        key: &str,
        value: serde_json::Value,
    ) -> anyhow::Result<bool> {
        let mut root = serde_json::to_value(&*self)?;
        let Some(section) = root.get_mut(section).and_then(|v| v.as_object_mut()) else {
            return Ok(false);
        };
        section.insert(key.to_string(), value);
        *self = serde_json::from_value(root)?;
        Ok(true)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_three_enabled_sessions() {
        let cfg = VoltronConfig::default();
        let ids: Vec<_> = cfg.enabled_sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![
            "voltron-session-1",
            "voltron-session-2",
            "voltron-session-3"
        ]);
        assert_eq!(cfg.sessions[1].prefix, "!");
    }

    #[test]
    fn disabled_sessions_are_skipped() {
        let mut cfg = VoltronConfig::default();
        cfg.sessions[0].enabled = false;
        let ids: Vec<_> = cfg.enabled_sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["voltron-session-2", "voltron-session-3"]);
        assert!(cfg.session("voltron-session-1").is_none());
        assert!(cfg.session("voltron-session-3").is_some());
    }

    #[test]
    fn session_count_does_not_limit_enabled_sessions() {
        let mut cfg = VoltronConfig::default();
        cfg.sessions.push(SessionConfig::new("voltron-session-4", "#", "Extra"));
        assert_eq!(cfg.enabled_sessions().len(), 4);

        cfg.bot.session_count = 0;
        cfg.bot.max_sessions = 2;
        assert_eq!(cfg.enabled_sessions().len(), 4);
        assert!(cfg.session("voltron-session-4").is_some());
    }

    #[test]
    fn feature_lookup_by_name() {
        let cfg = VoltronConfig::default();
        assert!(cfg.is_feature_enabled("antiLink"));
        assert!(!cfg.is_feature_enabled("autoRead"));
        assert!(!cfg.is_feature_enabled("noSuchFeature"));
    }

    #[test]
    fn admin_check_supports_wildcard() {
        let mut cfg = VoltronConfig::default();
        assert!(!cfg.is_admin("15550001"));

        cfg.security.admin_numbers = vec!["15550001".into()];
        assert!(cfg.is_admin("15550001"));
        assert!(!cfg.is_admin("15550002"));

        cfg.security.admin_numbers = vec!["all".into()];
        assert!(cfg.is_admin("15550002"));
    }

    #[test]
    fn update_known_section() {
        let mut cfg = VoltronConfig::default();
        assert!(cfg.update("bot", "name", "NEW-NAME".into()).unwrap());
        assert_eq!(cfg.bot.name, "NEW-NAME");

        assert!(cfg.update("features", "autoRead", true.into()).unwrap());
        assert!(cfg.features.auto_read);
    }

    #[test]
    fn update_unknown_section_is_rejected() {
        let mut cfg = VoltronConfig::default();
        assert!(!cfg.update("nope", "name", "x".into()).unwrap());
        // `sessions` is a list, not a section.
        assert!(!cfg.update("sessions", "id", "x".into()).unwrap());
    }

    #[test]
    fn update_with_wrong_type_errors() {
        let mut cfg = VoltronConfig::default();
        assert!(cfg.update("bot", "sessionCount", "many".into()).is_err());
        assert_eq!(cfg.bot.session_count, 3);
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let cfg = ApiKeyConfig {
            enabled: true,
            api_key: Secret::new("super-secret".into()),
        };
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }
}
