//! Process configuration, read once at startup. No global mutable state: the loaded
//! struct is passed to whoever needs it.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail};

use crate::gateway::{GatewayPolicy, DEFAULT_MAX_BODY_BYTES};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Telegram bot token.
    pub bot_token: String,
    /// Bot-specific API base URL, trailing slash included.
    pub api_url: String,
    /// Expected webhook secret token, when set for the webhook.
    pub webhook_secret: Option<String>,
    /// Path of the SQLite state database.
    pub db_path: PathBuf,
    /// Trust `X-Forwarded-For` (deployment sits behind a known proxy).
    pub trust_forwarded: bool,
    /// Webhook body-size cap in bytes.
    pub max_body_bytes: usize,
    /// Bind address for the webhook server.
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bot_token = lookup("BOT_TOKEN")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| anyhow!("environment variable BOT_TOKEN is not set"))?;
        let api_url = match lookup("API_URL") {
            Some(url) if !url.is_empty() => url,
            _ => format!("{DEFAULT_API_BASE}/bot{bot_token}/"),
        };
        let max_body_bytes = match lookup("MAX_BODY_BYTES") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("MAX_BODY_BYTES must be an integer, got {value:?}"))?,
            None => DEFAULT_MAX_BODY_BYTES,
        };
        let port = match lookup("PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("PORT must be an integer, got {value:?}"))?,
            None => 8080,
        };
        Ok(Self {
            api_url,
            bot_token,
            webhook_secret: lookup("WEBHOOK_SECRET").filter(|secret| !secret.is_empty()),
            db_path: lookup("STATE_DB").map_or_else(|| "beadloom.db".into(), PathBuf::from),
            trust_forwarded: parse_bool(lookup("TRUST_FORWARDED").as_deref())?,
            max_body_bytes,
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port,
        })
    }

    /// Gateway settings derived from this configuration.
    pub fn gateway_policy(&self) -> GatewayPolicy {
        GatewayPolicy {
            secret: self.webhook_secret.clone(),
            max_body_bytes: self.max_body_bytes,
            trust_forwarded: self.trust_forwarded,
        }
    }
}

fn parse_bool(value: Option<&str>) -> anyhow::Result<bool> {
    match value {
        None | Some("") => Ok(false),
        Some(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => bail!("cannot interpret {other:?} as a boolean"),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<_, _> = vars
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn minimal() {
        let config = load(&[("BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!("123:abc", config.bot_token);
        assert_eq!("https://api.telegram.org/bot123:abc/", config.api_url);
        assert_eq!(None, config.webhook_secret);
        assert_eq!(PathBuf::from("beadloom.db"), config.db_path);
        assert!(!config.trust_forwarded);
        assert_eq!(DEFAULT_MAX_BODY_BYTES, config.max_body_bytes);
        assert_eq!("127.0.0.1", config.host);
        assert_eq!(8080, config.port);
    }

    #[test]
    fn missing_token() {
        let err = load(&[]).unwrap_err();
        assert_eq!("environment variable BOT_TOKEN is not set", err.to_string());
        assert!(load(&[("BOT_TOKEN", "")]).is_err());
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("BOT_TOKEN", "t"),
            ("API_URL", "http://localhost:9000/bot-t/"),
            ("WEBHOOK_SECRET", "hush"),
            ("STATE_DB", "/var/lib/beadloom/state.db"),
            ("TRUST_FORWARDED", "true"),
            ("MAX_BODY_BYTES", "2048"),
            ("HOST", "0.0.0.0"),
            ("PORT", "9999"),
        ])
        .unwrap();
        assert_eq!("http://localhost:9000/bot-t/", config.api_url);
        assert_eq!(Some("hush".into()), config.webhook_secret);
        assert_eq!(PathBuf::from("/var/lib/beadloom/state.db"), config.db_path);
        assert!(config.trust_forwarded);
        assert_eq!(2048, config.max_body_bytes);
        assert_eq!("0.0.0.0", config.host);
        assert_eq!(9999, config.port);

        let policy = config.gateway_policy();
        assert_eq!(Some("hush".into()), policy.secret);
        assert_eq!(2048, policy.max_body_bytes);
        assert!(policy.trust_forwarded);
    }

    #[test]
    fn booleans() {
        assert!(parse_bool(Some("1")).unwrap());
        assert!(parse_bool(Some("Yes")).unwrap());
        assert!(!parse_bool(Some("off")).unwrap());
        assert!(!parse_bool(None).unwrap());
        assert!(parse_bool(Some("maybe")).is_err());
    }

    #[test]
    fn bad_numbers() {
        assert!(load(&[("BOT_TOKEN", "t"), ("MAX_BODY_BYTES", "lots")]).is_err());
        assert!(load(&[("BOT_TOKEN", "t"), ("PORT", "eighty")]).is_err());
    }
}
