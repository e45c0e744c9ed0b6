use thiserror::Error;

/// Unified error type for the entire t212-dashboard-core library.
/// Every public function returns `Result<T, CoreError>`.
///
/// `Clone` so that one upstream failure can be handed to every caller
/// that was waiting on the same coalesced request.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Storage / File ──────────────────────────────────────────────
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Unsupported file version: {0}")]
    UnsupportedVersion(u16),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed — wrong password or corrupted file")]
    Decryption,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("API error ({provider}, status {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized: API key rejected for account {0}")]
    Unauthorized(String),

    #[error("Rate limited on {endpoint} for account {account}, retry in {retry_after_ms} ms")]
    RateLimited {
        account: String,
        endpoint: String,
        retry_after_ms: u64,
    },

    // ── Business Logic ──────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Trail stop order not found: {0}")]
    TrailStopNotFound(String),
}

impl CoreError {
    /// Whether a cached (possibly stale) response may stand in for this failure.
    ///
    /// Rejected credentials are never papered over with old data.
    pub fn allows_stale_fallback(&self) -> bool {
        !matches!(self, CoreError::Unauthorized(_))
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors carry the full URL; drop the query (cursors, tickers)
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}

impl From<aes_gcm::Error> for CoreError {
    fn from(_: aes_gcm::Error) -> Self {
        CoreError::Decryption
    }
}
