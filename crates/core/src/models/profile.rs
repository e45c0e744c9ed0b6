use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::account::Account;
use super::settings::Settings;
use super::trail_stop::TrailStopOrder;

/// First total P/L observed for an account on a given UTC day.
/// Today's P/L is measured against it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PnlBaseline {
    pub date: NaiveDate,
    pub total_pnl: f64,
}

/// The main data container. Everything in here gets serialized,
/// encrypted, and saved to the portable .t2db file.
///
/// Contains: connected accounts (with their API keys), trail stop orders,
/// user settings, and the daily P/L baselines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub accounts: Vec<Account>,

    pub trail_stops: Vec<TrailStopOrder>,

    pub settings: Settings,

    #[serde(default)]
    pub pnl_baselines: HashMap<Uuid, PnlBaseline>,
}

impl Profile {
    pub fn account(&self, id: Uuid) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }
}
