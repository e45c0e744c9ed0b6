use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::models::account::Account;
use crate::models::cash::AccountCash;
use crate::models::order::HistoricalOrder;
use crate::models::position::Position;
use crate::models::profile::PnlBaseline;
use crate::models::summary::{
    AccountStats, AccountSummary, CurrencyTotals, DashboardSummary, Freshness, PortfolioTotals,
    PositionStats, Section,
};
use crate::services::gateway_service::AccountSnapshot;

/// Currency key used for accounts whose currency is not known yet.
pub const UNKNOWN_CURRENCY: &str = "???";

/// Filled order value on one day, split by side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyOrderFlow {
    pub date: Option<NaiveDate>,
    /// Total filled value of buys (positive)
    pub bought: f64,
    /// Total filled value of sells (positive)
    pub sold: f64,
    pub filled_orders: usize,
}

impl DailyOrderFlow {
    /// Sell proceeds minus buy cost.
    pub fn net(&self) -> f64 {
        self.sold - self.bought
    }
}

/// Derives dashboard statistics from raw upstream data.
///
/// Pure arithmetic apart from the daily P/L baselines, which the caller
/// owns (they live in the profile so they survive restarts).
pub struct AnalyticsService;

impl AnalyticsService {
    pub fn new() -> Self {
        Self
    }

    /// Cost, value and P/L of a single position.
    ///
    /// P/L is taken from the broker (`ppl` plus any FX component) rather
    /// than recomputed, because only the broker knows the FX rates it used.
    pub fn position_stats(&self, position: &Position) -> PositionStats {
        let cost = position.average_price * position.quantity;
        let market_value = position.current_price * position.quantity;
        let pnl = position.ppl + position.fx_ppl.unwrap_or(0.0);
        PositionStats {
            ticker: position.ticker.clone(),
            quantity: position.quantity,
            cost,
            market_value,
            pnl,
            pnl_pct: pct(pnl, cost),
            allocation_pct: 0.0, // filled by portfolio_totals
        }
    }

    /// Totals over all positions, with per-position allocation.
    /// Positions are ordered by market value, largest first.
    pub fn portfolio_totals(&self, positions: &[Position]) -> PortfolioTotals {
        let mut stats: Vec<PositionStats> =
            positions.iter().map(|p| self.position_stats(p)).collect();

        let cost: f64 = stats.iter().map(|s| s.cost).sum();
        let market_value: f64 = stats.iter().map(|s| s.market_value).sum();
        let pnl: f64 = stats.iter().map(|s| s.pnl).sum();

        for s in &mut stats {
            s.allocation_pct = pct(s.market_value, market_value);
        }
        stats.sort_by(|a, b| {
            b.market_value
                .partial_cmp(&a.market_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        PortfolioTotals {
            cost,
            market_value,
            pnl,
            pnl_pct: pct(pnl, cost),
            positions: stats,
        }
    }

    /// Unrealised plus realised P/L.
    pub fn total_pnl(&self, cash: &AccountCash) -> f64 {
        cash.ppl + cash.result
    }

    /// P/L since the first observation of `date`.
    ///
    /// The first call on a new day stores `current_total` as that day's
    /// baseline and returns 0. Baselines from earlier days are replaced.
    pub fn today_pnl_on(
        &self,
        baselines: &mut HashMap<Uuid, PnlBaseline>,
        account: Uuid,
        date: NaiveDate,
        current_total: f64,
    ) -> f64 {
        match baselines.get(&account) {
            Some(baseline) if baseline.date == date => current_total - baseline.total_pnl,
            _ => {
                baselines.insert(
                    account,
                    PnlBaseline {
                        date,
                        total_pnl: current_total,
                    },
                );
                0.0
            }
        }
    }

    /// Like [`today_pnl_on`](Self::today_pnl_on) but never records a
    /// baseline: 0 unless one already exists for `date`.
    pub fn today_pnl_observed(
        &self,
        baselines: &HashMap<Uuid, PnlBaseline>,
        account: Uuid,
        date: NaiveDate,
        current_total: f64,
    ) -> f64 {
        match baselines.get(&account) {
            Some(baseline) if baseline.date == date => current_total - baseline.total_pnl,
            _ => 0.0,
        }
    }

    /// Headline figures for an account from its cash breakdown.
    pub fn account_stats_on(
        &self,
        baselines: &mut HashMap<Uuid, PnlBaseline>,
        account: Uuid,
        cash: &AccountCash,
        date: NaiveDate,
    ) -> AccountStats {
        let total_pnl = self.total_pnl(cash);
        let today_pnl = self.today_pnl_on(baselines, account, date, total_pnl);
        self.stats_from(cash, total_pnl, today_pnl)
    }

    fn stats_from(&self, cash: &AccountCash, total_pnl: f64, today_pnl: f64) -> AccountStats {
        AccountStats {
            total_pnl,
            today_pnl,
            unrealised_pnl: cash.ppl,
            realised_pnl: cash.result,
            account_value: cash.total,
            total_pnl_pct: pct(total_pnl, cash.invested),
        }
    }

    /// Filled buys and sells executed on `date` (UTC).
    pub fn order_flow_on(&self, history: &[HistoricalOrder], date: NaiveDate) -> DailyOrderFlow {
        let mut flow = DailyOrderFlow {
            date: Some(date),
            ..DailyOrderFlow::default()
        };

        for order in history {
            let executed_on = order
                .date_executed
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc).date_naive());
            if executed_on != Some(date) {
                continue;
            }
            let Some(value) = order.filled_value else {
                continue;
            };
            if order.is_sell() {
                flow.sold += value.abs();
            } else {
                flow.bought += value.abs();
            }
            flow.filled_orders += 1;
        }

        flow
    }

    /// Combine a gateway snapshot with account metadata and stats.
    pub fn summarize_on(
        &self,
        baselines: &mut HashMap<Uuid, PnlBaseline>,
        account: &Account,
        snapshot: AccountSnapshot,
        date: NaiveDate,
    ) -> AccountSummary {
        // Stale cash may predate `date` and must not become its baseline
        let stats = match &snapshot.cash {
            Section::Ready {
                data: cash,
                freshness: Freshness::Stale,
            } => {
                let total_pnl = self.total_pnl(cash);
                let today_pnl = self.today_pnl_observed(baselines, account.id, date, total_pnl);
                Some(self.stats_from(cash, total_pnl, today_pnl))
            }
            Section::Ready { data: cash, .. } => {
                Some(self.account_stats_on(baselines, account.id, cash, date))
            }
            Section::Failed { .. } => None,
        };
        let portfolio = snapshot
            .positions
            .data()
            .map(|positions| self.portfolio_totals(positions));

        AccountSummary {
            account_id: account.id,
            account_name: account.name.clone(),
            environment: Some(account.environment),
            currency: account.currency.clone(),
            cash: snapshot.cash,
            positions: snapshot.positions,
            orders: snapshot.orders,
            stats,
            portfolio,
        }
    }

    /// Multi-account view with totals grouped by account currency.
    pub fn dashboard(&self, accounts: Vec<AccountSummary>) -> DashboardSummary {
        let mut totals_by_currency: BTreeMap<String, CurrencyTotals> = BTreeMap::new();

        for summary in &accounts {
            let Some(stats) = &summary.stats else {
                continue;
            };
            let currency = summary
                .currency
                .clone()
                .unwrap_or_else(|| UNKNOWN_CURRENCY.to_string());
            let totals = totals_by_currency.entry(currency).or_default();
            totals.account_value += stats.account_value;
            totals.total_pnl += stats.total_pnl;
            totals.today_pnl += stats.today_pnl;
            totals.accounts += 1;
        }

        DashboardSummary {
            generated_at: Utc::now(),
            accounts,
            totals_by_currency,
        }
    }
}

impl Default for AnalyticsService {
    fn default() -> Self {
        Self::new()
    }
}

/// `part / whole × 100`, or 0 when `whole` is 0.
fn pct(part: f64, whole: f64) -> f64 {
    if whole.abs() > f64::EPSILON {
        (part / whole) * 100.0
    } else {
        0.0
    }
}
