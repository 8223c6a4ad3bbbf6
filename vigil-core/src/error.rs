use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("threat feed unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream rejected request (status {status}): {message}")]
    UpstreamRejection { status: u16, message: String },

    #[error("domain registration failed: {0}")]
    Registration(String),

    #[error("DNS update failed: {0}")]
    DnsUpdate(String),

    #[error("hosting provisioning failed: {0}")]
    Hosting(String),

    #[error("server reload failed: {0}")]
    Reload(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("state inconsistency: {0}")]
    StateInconsistency(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("operation failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: usize, last_error: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VigilError>;
