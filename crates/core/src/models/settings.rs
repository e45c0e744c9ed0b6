use serde::{Deserialize, Serialize};

/// User-configurable settings, stored inside the encrypted profile file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Currency used when the dashboard shows a combined figure (e.g., "GBP", "EUR")
    pub display_currency: String,

    /// How often the frontend should poll the dashboard summary, in seconds
    pub refresh_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_currency: "GBP".to_string(),
            refresh_interval_secs: 10,
        }
    }
}
