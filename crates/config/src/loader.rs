use std::path::{Path, PathBuf};

use {
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{env_subst::substitute_env_with, schema::VoltronConfig};

/// Environment variable selecting `config/<env>.{json,toml,yaml,yml}`.
pub const ENV_NAME_VAR: &str = "VOLTRON_ENV";

/// Environment used when [`ENV_NAME_VAR`] is unset.
pub const DEFAULT_ENV_NAME: &str = "development";

/// Extensions tried for the environment file, in order.
const CONFIG_EXTENSIONS: &[&str] = &["json", "toml", "yaml", "yml"];

/// Load settings from the working directory and the process environment.
///
/// Defaults → deep-merged environment file (if any) → env var overrides.
/// Never fails: unreadable or malformed files are logged and skipped.
pub fn discover_and_load() -> VoltronConfig {
    load_from(Path::new("."), &|name: &str| std::env::var(name).ok())
}

/// Same as [`discover_and_load`] with an explicit base directory and env lookup.
pub fn load_from(base_dir: &Path, lookup: &dyn Fn(&str) -> Option<String>) -> VoltronConfig {
    let env_name = lookup(ENV_NAME_VAR).unwrap_or_else(|| DEFAULT_ENV_NAME.to_string());

    let mut config = match find_env_file(base_dir, &env_name) {
        Some(path) => match merged_with_file(&path, lookup) {
            Ok(cfg) => {
                info!(path = %path.display(), env = %env_name, "loaded environment config");
                cfg
            },
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not load environment config, using defaults"
                );
                VoltronConfig::default()
            },
        },
        None => {
            debug!(env = %env_name, "no environment config file, using defaults");
            VoltronConfig::default()
        },
    };

    apply_env_overrides(&mut config, lookup);
    config
}

/// Locate `config/<env_name>.<ext>` under `base_dir`.
pub fn find_env_file(base_dir: &Path, env_name: &str) -> Option<PathBuf> {
    CONFIG_EXTENSIONS
        .iter()
        .map(|ext| base_dir.join("config").join(format!("{env_name}.{ext}")))
        .find(|p| p.exists())
}

fn merged_with_file(
    path: &Path,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> anyhow::Result<VoltronConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env_with(&raw, lookup);
    let overlay = parse_config_value(&raw, path)?;
    if !overlay.is_object() {
        anyhow::bail!("top level of {} must be an object", path.display());
    }

    let mut base = serde_json::to_value(VoltronConfig::default())?;
    deep_merge(&mut base, overlay);
    Ok(serde_json::from_value(base)?)
}

fn parse_config_value(raw: &str, path: &Path) -> anyhow::Result<Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match ext {
        "json" => Ok(serde_json::from_str(raw)?),
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

/// Recursively merge `overlay` into `target`.
///
/// Objects merge key by key; arrays and scalars in `overlay` replace
/// whatever `target` held.
pub fn deep_merge(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    },
                    _ => {
                        target.insert(key, value);
                    },
                }
            }
        },
        (target, overlay) => *target = overlay,
    }
}

/// Apply the recognized environment variables on top of `config`.
pub fn apply_env_overrides(config: &mut VoltronConfig, lookup: &dyn Fn(&str) -> Option<String>) {
    if let Some(name) = lookup("BOT_NAME") {
        config.bot.name = name;
    }
    if let Some(prefix) = lookup("BOT_PREFIX") {
        config.bot.prefix = prefix;
    }
    if let Some(raw) = lookup("SESSION_COUNT") {
        match raw.trim().parse::<usize>() {
            Ok(count) => config.bot.session_count = count,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid SESSION_COUNT"),
        }
    }

    for slot in 1..=3 {
        let var = format!("SESSION_{slot}_NAME");
        if let Some(id) = lookup(&var) {
            match config.sessions.get_mut(slot - 1) {
                Some(session) => session.id = id,
                None => warn!(var = %var, "no session slot to rename"),
            }
        }
    }

    if let Some(v) = lookup("ANTI_SPAM") {
        config.features.anti_spam = v == "true";
    }
    if let Some(v) = lookup("ANTI_LINK") {
        config.features.anti_link = v == "true";
    }

    if let Some(admins) = lookup("ADMIN_NUMBERS") {
        config.security.admin_numbers = admins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    if let Some(level) = lookup("LOG_LEVEL") {
        config.logging.level = level;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, std::collections::HashMap};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn write_env_file(dir: &Path, name: &str, body: &str) {
        let config_dir = dir.join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(name), body).unwrap();
    }

    #[test]
    fn deep_merge_recurses_into_objects() {
        let mut base = json!({"bot": {"name": "a", "prefix": "."}, "list": [1, 2]});
        deep_merge(&mut base, json!({"bot": {"name": "b"}, "list": [3], "extra": {"k": 1}}));
        assert_eq!(
            base,
            json!({"bot": {"name": "b", "prefix": "."}, "list": [3], "extra": {"k": 1}})
        );
    }

    #[test]
    fn deep_merge_scalar_replaces_object() {
        let mut base = json!({"bot": {"name": "a"}});
        deep_merge(&mut base, json!({"bot": 5}));
        assert_eq!(base, json!({"bot": 5}));
    }

    #[test]
    fn defaults_without_file_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_from(dir.path(), &env(&[]));
        assert_eq!(cfg.bot.name, "VOLTRON-MD");
        assert_eq!(cfg.enabled_sessions().len(), 3);
    }

    #[test]
    fn env_file_is_deep_merged() {
        let dir = tempfile::tempdir().unwrap();
        write_env_file(
            dir.path(),
            "development.json",
            r#"{"bot": {"name": "FILE-BOT"}, "features": {"autoRead": true}}"#,
        );
        let cfg = load_from(dir.path(), &env(&[]));
        assert_eq!(cfg.bot.name, "FILE-BOT");
        // Untouched siblings keep their defaults.
        assert_eq!(cfg.bot.prefix, ".");
        assert!(cfg.features.auto_read);
        assert!(cfg.features.anti_spam);
    }

    #[test]
    fn env_name_selects_file() {
        let dir = tempfile::tempdir().unwrap();
        write_env_file(dir.path(), "production.toml", "[bot]\nname = \"PROD\"\n");
        write_env_file(dir.path(), "development.json", r#"{"bot": {"name": "DEV"}}"#);

        let cfg = load_from(dir.path(), &env(&[(ENV_NAME_VAR, "production")]));
        assert_eq!(cfg.bot.name, "PROD");
    }

    #[test]
    fn env_vars_override_file() {
        let dir = tempfile::tempdir().unwrap();
        write_env_file(dir.path(), "development.json", r#"{"bot": {"name": "FILE-BOT"}}"#);
        let cfg = load_from(dir.path(), &env(&[("BOT_NAME", "ENV-BOT")]));
        assert_eq!(cfg.bot.name, "ENV-BOT");
    }

    #[test]
    fn file_placeholders_are_substituted() {
        let dir = tempfile::tempdir().unwrap();
        write_env_file(
            dir.path(),
            "development.json",
            r#"{"deployment": {"platform": "${PLATFORM:-vps}"}}"#,
        );
        let cfg = load_from(dir.path(), &env(&[]));
        assert_eq!(cfg.deployment.platform, "vps");
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_env_file(dir.path(), "development.json", "{ not json");
        let cfg = load_from(dir.path(), &env(&[("LOG_LEVEL", "debug")]));
        assert_eq!(cfg.bot.name, "VOLTRON-MD");
        // Env overrides still apply.
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn session_list_in_file_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_env_file(
            dir.path(),
            "development.json",
            r#"{"sessions": [{"id": "solo", "prefix": "/"}]}"#,
        );
        let cfg = load_from(dir.path(), &env(&[]));
        let sessions = cfg.enabled_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "solo");
        assert!(sessions[0].enabled);
    }

    #[test]
    fn recognized_env_overrides() {
        let mut cfg = VoltronConfig::default();
        apply_env_overrides(
            &mut cfg,
            &env(&[
                ("BOT_PREFIX", "/"),
                ("SESSION_COUNT", "2"),
                ("SESSION_1_NAME", "alpha"),
                ("SESSION_3_NAME", "gamma"),
                ("ANTI_SPAM", "false"),
                ("ANTI_LINK", "yes"),
                ("ADMIN_NUMBERS", "111, 222,,333"),
            ]),
        );
        assert_eq!(cfg.bot.prefix, "/");
        assert_eq!(cfg.bot.session_count, 2);
        assert_eq!(cfg.sessions[0].id, "alpha");
        assert_eq!(cfg.sessions[1].id, "voltron-session-2");
        assert_eq!(cfg.sessions[2].id, "gamma");
        assert!(!cfg.features.anti_spam);
        assert!(!cfg.features.anti_link);
        assert_eq!(cfg.security.admin_numbers, vec!["111", "222", "333"]);
    }

    #[test]
    fn invalid_session_count_is_ignored() {
        let mut cfg = VoltronConfig::default();
        apply_env_overrides(&mut cfg, &env(&[("SESSION_COUNT", "lots")]));
        assert_eq!(cfg.bot.session_count, 3);
    }

    #[test]
    fn session_rename_without_slot_is_ignored() {
        let mut cfg = VoltronConfig::default();
        cfg.sessions.truncate(1);
        apply_env_overrides(&mut cfg, &env(&[("SESSION_2_NAME", "beta")]));
        assert_eq!(cfg.sessions.len(), 1);
    }
}
