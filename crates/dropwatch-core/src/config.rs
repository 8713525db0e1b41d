use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::ChatId, errors::Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://circusbymaniac.shop";

pub const DEFAULT_STORE_NAME: &str = "CIRCUS by MANIAC";

pub const DEFAULT_COLLECTIONS: [&str; 4] = [
    "ifsixwasnine-beyond-the-time-man",
    "ifsixwasnine-limited-man",
    "lgb-beyond-the-time-man",
    "lgb-limited-man",
];

/// Fixed delays between upstream calls. Upstream throttles bursts, so these
/// are required rather than tuning knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacing {
    /// Between successive `products.json` pages of a full catalog drain.
    pub catalog_page: Duration,
    /// Between successive notifications in one batch.
    pub notification: Duration,
    /// Between pages / collections of an on-demand query.
    pub query_page: Duration,
    /// Pause after a failed update poll.
    pub poll_error_backoff: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            catalog_page: Duration::from_millis(500),
            notification: Duration::from_millis(500),
            query_page: Duration::from_millis(300),
            poll_error_backoff: Duration::from_secs(5),
        }
    }
}

impl Pacing {
    /// No delays at all (tests, dry runs).
    pub const fn immediate() -> Self {
        Self {
            catalog_page: Duration::ZERO,
            notification: Duration::ZERO,
            query_page: Duration::ZERO,
            poll_error_backoff: Duration::ZERO,
        }
    }
}

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_chat_id: ChatId,
    pub telegram_timeout: Duration,
    pub updates_long_poll: Duration,

    // Liveness
    pub port: u16,
    pub self_ping_url: Option<String>,
    pub self_ping_interval: Duration,

    // Catalog
    pub store_name: String,
    pub store_base_url: String,
    pub collections: Vec<String>,
    pub price_symbol: String,
    pub catalog_timeout: Duration,
    pub check_interval: Duration,

    // Persisted state
    pub seen_file: PathBuf,
    pub offset_file: PathBuf,

    pub pacing: Pacing,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup (the process
    /// environment in production).
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(var);

        // Required
        let telegram_bot_token = vars.string("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let raw_chat = vars.string("TELEGRAM_CHAT_ID").unwrap_or_default();
        if raw_chat.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_CHAT_ID environment variable is required".to_string(),
            ));
        }
        let telegram_chat_id = raw_chat
            .trim()
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| Error::Config(format!("TELEGRAM_CHAT_ID is not an integer: {raw_chat}")))?;

        let telegram_timeout = Duration::from_secs(vars.u64("TELEGRAM_TIMEOUT_SECS").unwrap_or(15));
        let updates_long_poll =
            Duration::from_secs(vars.u64("UPDATES_LONG_POLL_SECS").unwrap_or(10));

        // Liveness
        let port = vars.u16("PORT").unwrap_or(10000);
        let self_ping_url = vars
            .string("SELF_PING_URL")
            .and_then(non_empty)
            .or_else(|| vars.string("RENDER_EXTERNAL_URL").and_then(non_empty));
        let self_ping_interval =
            Duration::from_secs(vars.u64("SELF_PING_INTERVAL_SECS").unwrap_or(300).max(1));

        // Catalog
        let store_name = vars
            .string("STORE_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_STORE_NAME.to_string());
        let store_base_url = vars
            .string("STORE_BASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        let collections = match vars.string("STORE_COLLECTIONS") {
            Some(raw) => parse_csv(&raw),
            None => DEFAULT_COLLECTIONS.iter().map(|s| s.to_string()).collect(),
        };
        if collections.is_empty() {
            return Err(Error::Config(
                "STORE_COLLECTIONS must name at least one collection".to_string(),
            ));
        }
        let price_symbol = vars.string("PRICE_SYMBOL").unwrap_or_else(|| "¥".to_string());
        let catalog_timeout = Duration::from_secs(vars.u64("CATALOG_TIMEOUT_SECS").unwrap_or(20));
        let check_interval =
            Duration::from_secs(vars.u64("CHECK_INTERVAL_SECS").unwrap_or(600).max(1));

        // Persisted state
        let seen_file = PathBuf::from(
            vars.string("SEEN_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "seen_products.json".to_string()),
        );
        let offset_file = PathBuf::from(
            vars.string("OFFSET_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "bot_offset.json".to_string()),
        );

        Ok(Self {
            telegram_bot_token,
            telegram_chat_id,
            telegram_timeout,
            updates_long_poll,
            port,
            self_ping_url,
            self_ping_interval,
            store_name,
            store_base_url,
            collections,
            price_symbol,
            catalog_timeout,
            check_interval,
            seen_file,
            offset_file,
            pacing: Pacing::default(),
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn u64(&self, key: &str) -> Option<u64> {
        self.string(key).and_then(|s| s.trim().parse::<u64>().ok())
    }

    fn u16(&self, key: &str) -> Option<u16> {
        self.string(key).and_then(|s| s.trim().parse::<u16>().ok())
    }
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
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
