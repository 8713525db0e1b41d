/// Core error type.
///
/// Adapter crates map their library errors (reqwest, teloxide) into this type
/// so the watcher can treat every failure as "no data" / "send failed" and
/// keep going.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network failure, timeout or non-2xx status talking to an upstream API.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered but the payload could not be understood.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
