use std::sync::Arc;

use anyhow::{bail, Context};
use iajson_client::{ClientConfig, Dispatcher, InMemoryCredentialStore};
use serde_json::{Map, Value};

use super::args::SiteArgs;

pub fn config_for(site: &SiteArgs) -> ClientConfig {
    let config = ClientConfig::from_env();
    match site.timeout {
        Some(secs) => config.with_timeout(secs),
        None => config,
    }
}

/// Discover the site and seed credentials from the environment.
pub async fn connect(site: &SiteArgs) -> anyhow::Result<Dispatcher> {
    let client = Dispatcher::discover(&site.domain, config_for(site)).await?;
    Ok(client.with_credential_store(Arc::new(InMemoryCredentialStore::from_env())))
}

/// Merge `--json-params` and `key=value` pairs into one object.
///
/// Pair values are parsed as JSON when they parse (`5`, `true`, `"x"`),
/// otherwise taken as plain strings.
pub fn parse_params(json: Option<&str>, pairs: &[String]) -> anyhow::Result<Value> {
    let mut params = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--json-params is not JSON")? {
            Value::Object(map) => map,
            _ => bail!("--json-params must be a JSON object"),
        },
        None => Map::new(),
    };

    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("invalid --param '{pair}': expected KEY=VALUE");
        };
        if key.is_empty() {
            bail!("invalid --param '{pair}': empty key");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        params.insert(key.to_string(), value);
    }

    Ok(Value::Object(params))
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
