use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::account::Environment;
use super::cash::AccountCash;
use super::order::Order;
use super::position::Position;

/// Where a gateway response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    /// Fetched from upstream by this request
    Fresh,
    /// Served from cache within its TTL
    Cached,
    /// Served from cache past its TTL because upstream failed or was rate limited
    Stale,
}

/// One independently-loaded part of a dashboard.
///
/// A failed section never fails its neighbours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Section<T> {
    Ready { data: T, freshness: Freshness },
    Failed { error: String },
}

impl<T> Section<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            Section::Ready { data, .. } => Some(data),
            Section::Failed { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Section::Ready { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            Section::Ready {
                freshness: Freshness::Stale,
                ..
            }
        )
    }
}

/// Derived figures for one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionStats {
    pub ticker: String,
    pub quantity: f64,
    /// average_price × quantity
    pub cost: f64,
    /// current_price × quantity
    pub market_value: f64,
    /// ppl + fx_ppl, in account currency
    pub pnl: f64,
    pub pnl_pct: f64,
    /// Share of the account's market value (0–100)
    pub allocation_pct: f64,
}

/// Totals over a set of positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    pub cost: f64,
    pub market_value: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub positions: Vec<PositionStats>,
}

/// Headline P/L figures for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStats {
    /// Unrealised + realised
    pub total_pnl: f64,
    /// Change in total P/L since the first observation of the UTC day
    pub today_pnl: f64,
    pub unrealised_pnl: f64,
    pub realised_pnl: f64,
    pub account_value: f64,
    /// Total P/L as a percentage of the invested amount
    pub total_pnl_pct: f64,
}

/// Everything the dashboard shows for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_id: Uuid,
    pub account_name: String,
    pub environment: Option<Environment>,
    pub currency: Option<String>,
    pub cash: Section<AccountCash>,
    pub positions: Section<Vec<Position>>,
    pub orders: Section<Vec<Order>>,
    /// Present when cash loaded
    pub stats: Option<AccountStats>,
    /// Present when positions loaded
    pub portfolio: Option<PortfolioTotals>,
}

impl AccountSummary {
    /// Number of sections that failed to load.
    pub fn failed_sections(&self) -> usize {
        [
            !self.cash.is_ready(),
            !self.positions.is_ready(),
            !self.orders.is_ready(),
        ]
        .iter()
        .filter(|failed| **failed)
        .count()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_sections() == 0
    }
}

/// Sums of account stats sharing the same currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyTotals {
    pub account_value: f64,
    pub total_pnl: f64,
    pub today_pnl: f64,
    pub accounts: usize,
}

/// The aggregated multi-account view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub generated_at: DateTime<Utc>,
    pub accounts: Vec<AccountSummary>,
    /// Keyed by account currency; accounts whose currency is unknown use "???"
    pub totals_by_currency: BTreeMap<String, CurrencyTotals>,
}

impl DashboardSummary {
    pub fn failed_sections(&self) -> usize {
        self.accounts.iter().map(|a| a.failed_sections()).sum()
    }

    /// True when at least one section is missing or stale.
    pub fn is_degraded(&self) -> bool {
        self.accounts.iter().any(|a| {
            !a.is_complete() || a.cash.is_stale() || a.positions.is_stale() || a.orders.is_stale()
        })
    }
}
