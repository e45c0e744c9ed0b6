use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shorter keys are masked without revealing a tail.
const MIN_KEY_LEN_FOR_TAIL: usize = 8;

/// Which Trading212 environment an API key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    /// Real-money account
    Live,
    /// Paper-trading account
    Demo,
}

impl Environment {
    /// Base URL of the public REST API for this environment.
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Live => "https://live.trading212.com/api/v0",
            Environment::Demo => "https://demo.trading212.com/api/v0",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Live => write!(f, "Live"),
            Environment::Demo => write!(f, "Demo"),
        }
    }
}

/// A connected Trading212 account.
///
/// The API key is stored only inside the encrypted profile and is kept out
/// of `Debug` output so it never ends up in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,

    /// User-chosen display name (e.g., "ISA", "Invest")
    pub name: String,

    pub environment: Environment,

    /// Trading212 API key, sent verbatim in the `Authorization` header
    pub api_key: String,

    /// Account currency reported by the API (e.g., "GBP"); filled on connect
    #[serde(default)]
    pub currency: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        environment: Environment,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into().trim().to_string(),
            environment,
            api_key: api_key.into().trim().to_string(),
            currency: None,
            created_at: Utc::now(),
        }
    }

    /// Last four characters of the key, for display. Keys of eight
    /// characters or fewer are masked entirely.
    pub fn masked_key(&self) -> String {
        if self.api_key.chars().count() <= MIN_KEY_LEN_FOR_TAIL {
            return "****".to_string();
        }
        let tail: String = self
            .api_key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{tail}")
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("environment", &self.environment)
            .field("api_key", &self.masked_key())
            .field("currency", &self.currency)
            .finish()
    }
}
