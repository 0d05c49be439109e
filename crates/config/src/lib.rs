//! Configuration loading for the multi-session bot.
//!
//! Settings come from built-in defaults, optionally deep-merged with
//! `config/<VOLTRON_ENV>.{json,toml,yaml}`, then overridden by a fixed set of
//! environment variables. `${ENV_VAR}` placeholders in the file are
//! substituted before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        DEFAULT_ENV_NAME, ENV_NAME_VAR, apply_env_overrides, deep_merge, discover_and_load,
        find_env_file, load_from,
    },
    schema::{
        ApiKeyConfig, ApisConfig, BotConfig, DatabaseConfig, DeploymentConfig, FeaturesConfig,
        LoggingConfig, RateLimitConfig, SecurityConfig, SessionConfig, SidecarSettings,
        VoltronConfig,
    },
};
