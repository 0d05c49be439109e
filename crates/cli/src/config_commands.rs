use {
    anyhow::{Context, Result, bail},
    clap::Subcommand,
    serde_json::Value,
};

use voltron_config::VoltronConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (or one section) as JSON.
    Get { section: Option<String> },
}

pub fn handle_config(action: ConfigAction, config: &VoltronConfig) -> Result<()> {
    match action {
        ConfigAction::Get { section } => {
            let value = effective_value(config, section.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        },
    }
}

fn effective_value(config: &VoltronConfig, section: Option<&str>) -> Result<Value> {
    let mut root = serde_json::to_value(config)?;
    redact_api_keys(&mut root);
    match section {
        None => Ok(root),
        Some(name) => match root.get(name) {
            Some(v) => Ok(v.clone()),
            None => bail!("unknown config section '{name}'"),
        },
    }
}

fn redact_api_keys(root: &mut Value) {
    let Some(apis) = root.get_mut("apis").and_then(Value::as_object_mut) else {
        return;
    };
    for api in apis.values_mut() {
        if let Some(key) = api.get_mut("apiKey")
            && key.as_str().is_some_and(|k| !k.is_empty())
        {
            *key = Value::String("[REDACTED]".into());
        }
    }
}

/// Parse a `section.key=value` override. The value is read as JSON when it
/// parses, otherwise kept as a plain string.
pub fn parse_override(raw: &str) -> Result<(String, String, Value)> {
    let (path, value) = raw
        .split_once('=')
        .with_context(|| format!("override '{raw}' must look like section.key=value"))?;
    let (section, key) = path
        .split_once('.')
        .with_context(|| format!("override '{raw}' must name a section and a key"))?;
    if section.is_empty() || key.is_empty() {
        bail!("override '{raw}' must name a section and a key");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((section.to_string(), key.to_string(), value))
}

/// Apply every `--set` override in order.
pub fn apply_overrides(config: &mut VoltronConfig, overrides: &[String]) -> Result<()> {
    for raw in overrides {
        let (section, key, value) = parse_override(raw)?;
        if !config
            .update(&section, &key, value)
            .with_context(|| format!("invalid value in override '{raw}'"))?
        {
            bail!("unknown config section '{section}' in override '{raw}'");
        }
    }
    Ok(())
}
