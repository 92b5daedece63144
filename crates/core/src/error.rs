//! Error types for the schedule ingestion core

use thiserror::Error;

/// Ingestion errors, one variant per tagged kind
///
/// The string tag from `kind()` is what callers branch on and what run
/// records persist; the display text is what administrators see in
/// `last_error`.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Port {0} is not allowed")]
    InvalidPort(u16),

    #[error("Refusing to fetch local hostname: {0}")]
    Localhost(String),

    #[error("Refusing to fetch private or internal address: {0}")]
    PrivateIp(String),

    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(u32),

    #[error("Response exceeded {0} bytes")]
    ResponseTooLarge(u64),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Domain is not on the allowlist: {0}")]
    AllowlistDenied(String),

    #[error("Domain is pending admin approval: {0}")]
    AllowlistPending(String),

    #[error("Domain is blocked: {0}")]
    AllowlistBlocked(String),

    #[error("Unsupported vendor: {0}")]
    UnsupportedVendor(String),

    #[error("No supported connector for {0}")]
    NoConnector(String),

    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),
}

impl IngestError {
    /// Stable machine-readable tag for this error kind
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::InvalidUrl(_) => "invalid_url",
            IngestError::InvalidPort(_) => "invalid_port",
            IngestError::Localhost(_) => "localhost",
            IngestError::PrivateIp(_) => "private_ip",
            IngestError::TooManyRedirects(_) => "too_many_redirects",
            IngestError::ResponseTooLarge(_) => "response_too_large",
            IngestError::FetchFailed(_) => "fetch_failed",
            IngestError::AllowlistDenied(_) => "allowlist_denied",
            IngestError::AllowlistPending(_) => "allowlist_pending",
            IngestError::AllowlistBlocked(_) => "allowlist_blocked",
            IngestError::UnsupportedVendor(_) => "unsupported_vendor",
            IngestError::NoConnector(_) => "no_connector",
            IngestError::Store(_) => "store",
        }
    }
}

/// Result type alias for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;
