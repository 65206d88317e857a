use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::ChatId, errors::Error, gateway::RetryPolicy, Result};

pub const DEFAULT_WELCOME_TEXT: &str = "Hello, welcome to the private chat bot!";

/// Upper bound for `RETRY_MAX_ATTEMPTS`.
pub const MAX_RETRY_ATTEMPTS: u64 = 10;

/// Typed configuration for the relay.
///
/// Built once at startup and passed into every component; nothing reads the
/// process environment after `load()` returns.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub staff_group_id: ChatId,
    pub telegram_api_base: String,

    // Webhook
    pub listen_addr: SocketAddr,
    pub webhook_path: String,
    pub webhook_secret: Option<String>,

    // Directory storage (None = in-memory)
    pub store_path: Option<PathBuf>,

    pub welcome_text: String,

    // Outbound calls
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub http_timeout: Duration,
    pub handler_deadline: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let staff_group_id = get("STAFF_GROUP_ID")
            .ok_or_else(|| {
                Error::Config("STAFF_GROUP_ID environment variable is required".to_string())
            })
            .and_then(|raw| {
                raw.trim().parse::<i64>().map(ChatId).map_err(|_| {
                    Error::Config(format!("STAFF_GROUP_ID must be a numeric chat id: {raw}"))
                })
            })?;

        let telegram_api_base = get("TELEGRAM_API_BASE")
            .unwrap_or_else(|| "https://api.telegram.org".to_string())
            .trim_end_matches('/')
            .to_string();

        let listen_addr = match get("LISTEN_ADDR") {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("LISTEN_ADDR is invalid ({raw}): {e}")))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let webhook_path = get("WEBHOOK_PATH").unwrap_or_else(|| "/webhook".to_string());
        if !webhook_path.starts_with('/') {
            return Err(Error::Config(format!(
                "WEBHOOK_PATH must start with '/': {webhook_path}"
            )));
        }
        let webhook_secret = get("WEBHOOK_SECRET");

        // Explicitly empty STORE_PATH selects the in-memory store.
        let store_path = match lookup("STORE_PATH") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(PathBuf::from(raw.trim())),
            None => Some(PathBuf::from("/tmp/topic-relay-directory.json")),
        };

        let welcome_text =
            get("WELCOME_TEXT").unwrap_or_else(|| DEFAULT_WELCOME_TEXT.to_string());

        let retry_max_attempts = match parse_u64(&get, "RETRY_MAX_ATTEMPTS")?.unwrap_or(3) {
            n @ 1..=MAX_RETRY_ATTEMPTS => n as u32,
            n => {
                return Err(Error::Config(format!(
                    "RETRY_MAX_ATTEMPTS must be between 1 and {MAX_RETRY_ATTEMPTS}: {n}"
                )))
            }
        };
        let retry_base_delay =
            Duration::from_millis(parse_u64(&get, "RETRY_BASE_DELAY_MS")?.unwrap_or(1000));
        let http_timeout =
            Duration::from_millis(parse_u64(&get, "HTTP_TIMEOUT_MS")?.unwrap_or(10_000));
        let handler_deadline =
            Duration::from_millis(parse_u64(&get, "HANDLER_DEADLINE_MS")?.unwrap_or(60_000));

        Ok(Self {
            telegram_bot_token,
            staff_group_id,
            telegram_api_base,
            listen_addr,
            webhook_path,
            webhook_secret,
            store_path,
            welcome_text,
            retry_max_attempts,
            retry_base_delay,
            http_timeout,
            handler_deadline,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: self.retry_base_delay,
        }
    }
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must be a non-negative integer: {raw}")))
        })
        .transpose()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
