// ═══════════════════════════════════════════════════════════════════
// Integration Tests — Dashboard facade end to end with mock brokers
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use t212_dashboard_core::config::{CacheConfig, DashboardConfig, RateLimitConfig, WindowConfig};
use t212_dashboard_core::errors::CoreError;
use t212_dashboard_core::models::account::{Account, Environment};
use t212_dashboard_core::models::cash::{AccountCash, AccountInfo};
use t212_dashboard_core::models::order::{HistoricalOrder, Order, OrderHistoryPage};
use t212_dashboard_core::models::position::Position;
use t212_dashboard_core::models::summary::Freshness;
use t212_dashboard_core::models::trail_stop::{TrailDistance, TrailStopStatus, TrailStopUpdate};
use t212_dashboard_core::providers::traits::BrokerApi;
use t212_dashboard_core::storage::encryption::KdfParams;
use t212_dashboard_core::Dashboard;

// ═══════════════════════════════════════════════════════════════════
// Mock Broker
// ═══════════════════════════════════════════════════════════════════

struct MockBroker {
    currency: String,
    ppl: Mutex<f64>,
    prices: Mutex<Vec<(String, f64)>>,
    history: Vec<HistoricalOrder>,
    failing: AtomicBool,
    unauthorized: AtomicBool,
}

impl MockBroker {
    fn new(currency: &str) -> Arc<Self> {
        Arc::new(Self {
            currency: currency.into(),
            ppl: Mutex::new(0.0),
            prices: Mutex::new(vec![]),
            history: vec![],
            failing: AtomicBool::new(false),
            unauthorized: AtomicBool::new(false),
        })
    }

    fn with_history(currency: &str, history: Vec<HistoricalOrder>) -> Arc<Self> {
        Arc::new(Self {
            currency: currency.into(),
            ppl: Mutex::new(0.0),
            prices: Mutex::new(vec![]),
            history,
            failing: AtomicBool::new(false),
            unauthorized: AtomicBool::new(false),
        })
    }

    fn set_price(&self, ticker: &str, price: f64) {
        let mut prices = self.prices.lock().unwrap();
        prices.retain(|(t, _)| t != ticker);
        prices.push((ticker.into(), price));
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(CoreError::Unauthorized("mock".into()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::Network("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerApi for MockBroker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_cash(&self) -> Result<AccountCash, CoreError> {
        self.check()?;
        let ppl = *self.ppl.lock().unwrap();
        Ok(AccountCash {
            free: 100.0,
            total: 1_000.0 + ppl,
            ppl,
            result: 50.0,
            invested: 900.0,
            pie_cash: 0.0,
            blocked: None,
        })
    }

    async fn fetch_info(&self) -> Result<AccountInfo, CoreError> {
        self.check()?;
        Ok(AccountInfo {
            id: 7,
            currency_code: self.currency.clone(),
        })
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, CoreError> {
        self.check()?;
        Ok(self
            .prices
            .lock()
            .unwrap()
            .iter()
            .map(|(ticker, price)| Position {
                ticker: ticker.clone(),
                quantity: 1.0,
                average_price: 100.0,
                current_price: *price,
                ppl: price - 100.0,
                fx_ppl: None,
                initial_fill_date: None,
                frontend: None,
            })
            .collect())
    }

    async fn fetch_orders(&self) -> Result<Vec<Order>, CoreError> {
        self.check()?;
        Ok(vec![])
    }

    async fn fetch_order_history(
        &self,
        _cursor: Option<&str>,
        _limit: u32,
    ) -> Result<OrderHistoryPage, CoreError> {
        self.check()?;
        Ok(OrderHistoryPage {
            items: self.history.clone(),
            next_page_path: None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════
// Test Helpers
// ═══════════════════════════════════════════════════════════════════

/// Every load goes upstream: no cache hits, no local rate limiting.
fn live_config() -> DashboardConfig {
    let wide = WindowConfig::new(1_000, 1_000);
    DashboardConfig {
        cache: CacheConfig {
            cash_ttl_ms: 0,
            info_ttl_ms: 0,
            portfolio_ttl_ms: 0,
            orders_ttl_ms: 0,
            order_history_ttl_ms: 0,
            stale_grace_secs: 300,
        },
        rate_limits: RateLimitConfig {
            cash: wide,
            info: wide,
            portfolio: wide,
            orders: wide,
            order_history: wide,
        },
        ..DashboardConfig::default()
    }
}

fn new_dashboard() -> Dashboard {
    let mut dashboard = Dashboard::create_new(live_config());
    dashboard.set_kdf_params(KdfParams::light());
    dashboard
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
}

async fn connect(dashboard: &mut Dashboard, name: &str, mock: &Arc<MockBroker>) -> Uuid {
    dashboard
        .connect_account_with_client(Account::new(name, Environment::Live, "key-0000"), mock.clone())
        .await
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════
// Accounts
// ═══════════════════════════════════════════════════════════════════

mod accounts {
    use super::*;

    #[tokio::test]
    async fn connect_records_currency() {
        let mut dashboard = new_dashboard();
        assert!(!dashboard.has_unsaved_changes());

        let id = connect(&mut dashboard, "ISA", &MockBroker::new("gbp")).await;

        let account = dashboard.get_account(id).unwrap();
        assert_eq!(account.currency.as_deref(), Some("GBP"));
        assert!(dashboard.gateway().registry().contains(id));
        assert!(dashboard.has_unsaved_changes());
    }

    #[tokio::test]
    async fn rejected_key_leaves_nothing_behind() {
        let mut dashboard = new_dashboard();
        let mock = MockBroker::new("GBP");
        mock.unauthorized.store(true, Ordering::SeqCst);

        let account = Account::new("ISA", Environment::Live, "bad-key");
        let id = account.id;
        let err = dashboard
            .connect_account_with_client(account, mock)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Unauthorized(_)));
        assert!(dashboard.get_accounts().is_empty());
        assert!(!dashboard.gateway().registry().contains(id));
        assert!(!dashboard.has_unsaved_changes());
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let mut dashboard = new_dashboard();
        connect(&mut dashboard, "ISA", &MockBroker::new("GBP")).await;

        let err = dashboard
            .connect_account_with_client(
                Account::new("isa", Environment::Live, "other"),
                MockBroker::new("GBP"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert_eq!(dashboard.get_accounts().len(), 1);
    }

    #[tokio::test]
    async fn rename_and_remove() {
        let mut dashboard = new_dashboard();
        let mock = MockBroker::new("GBP");
        mock.set_price("AAPL_US_EQ", 100.0);
        let id = connect(&mut dashboard, "ISA", &mock).await;
        dashboard
            .create_trail_stop(id, "AAPL_US_EQ", 1.0, TrailDistance::Percent(5.0), None)
            .await
            .unwrap();

        dashboard.rename_account(id, "Stocks ISA").unwrap();
        assert_eq!(dashboard.get_account(id).unwrap().name, "Stocks ISA");

        dashboard.remove_account(id).unwrap();
        assert!(dashboard.get_account(id).is_none());
        assert!(dashboard.get_trail_stops(id).is_empty());
        assert!(!dashboard.gateway().registry().contains(id));
        assert!(matches!(
            dashboard.remove_account(id),
            Err(CoreError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rename_relabels_stored_key_client() {
        let mut dashboard = new_dashboard();
        let id = connect(&mut dashboard, "ISA", &MockBroker::new("GBP")).await;
        let bytes = dashboard.save_to_bytes("pw").unwrap();

        // Reloaded accounts get clients built from their stored keys
        let mut restored = Dashboard::load_from_bytes(&bytes, "pw", live_config()).unwrap();
        assert_eq!(restored.gateway().registry().get(id).unwrap().name(), "ISA");

        restored.rename_account(id, "Long term").unwrap();
        assert_eq!(
            restored.gateway().registry().get(id).unwrap().name(),
            "Long term"
        );
    }

    #[tokio::test]
    async fn rename_keeps_supplied_client() {
        let mut dashboard = new_dashboard();
        let mock = MockBroker::new("GBP");
        let id = connect(&mut dashboard, "ISA", &mock).await;
        dashboard.account_summary_on(id, day()).await.unwrap();

        dashboard.rename_account(id, "Long term").unwrap();
        assert_eq!(dashboard.gateway().registry().get(id).unwrap().name(), "mock");

        let summary = dashboard.account_summary_on(id, day()).await.unwrap();
        assert!(summary.is_complete());
        assert_eq!(summary.account_name, "Long term");
    }

    #[tokio::test]
    async fn attach_client_requires_known_account() {
        let mut dashboard = new_dashboard();
        let err = dashboard
            .attach_client(Uuid::new_v4(), MockBroker::new("GBP"))
            .unwrap_err();
        assert!(matches!(err, CoreError::AccountNotFound(_)));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Summaries
// ═══════════════════════════════════════════════════════════════════

mod summaries {
    use super::*;

    #[tokio::test]
    async fn account_summary_has_stats_and_portfolio() {
        let mut dashboard = new_dashboard();
        let mock = MockBroker::new("GBP");
        *mock.ppl.lock().unwrap() = 20.0;
        mock.set_price("AAPL_US_EQ", 120.0);
        let id = connect(&mut dashboard, "ISA", &mock).await;

        let summary = dashboard.account_summary_on(id, day()).await.unwrap();

        assert!(summary.is_complete());
        assert_eq!(summary.currency.as_deref(), Some("GBP"));
        let stats = summary.stats.unwrap();
        assert_eq!(stats.total_pnl, 70.0);
        assert_eq!(stats.today_pnl, 0.0);
        let portfolio = summary.portfolio.unwrap();
        assert_eq!(portfolio.market_value, 120.0);
        assert_eq!(portfolio.positions[0].allocation_pct, 100.0);
    }

    #[tokio::test]
    async fn unknown_account_is_error() {
        let mut dashboard = new_dashboard();
        let err = dashboard
            .account_summary_on(Uuid::new_v4(), day())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn today_pnl_tracks_daily_baseline() {
        let mut dashboard = new_dashboard();
        let mock = MockBroker::new("GBP");
        *mock.ppl.lock().unwrap() = 100.0;
        let id = connect(&mut dashboard, "ISA", &mock).await;

        dashboard.save_to_bytes("pw").unwrap();
        dashboard.account_summary_on(id, day()).await.unwrap();
        assert!(dashboard.has_unsaved_changes());

        dashboard.save_to_bytes("pw").unwrap();
        *mock.ppl.lock().unwrap() = 130.0;
        let later = dashboard.account_summary_on(id, day()).await.unwrap();
        assert_eq!(later.stats.unwrap().today_pnl, 30.0);
        assert!(!dashboard.has_unsaved_changes());

        let next_day = day().succ_opt().unwrap();
        let tomorrow = dashboard.account_summary_on(id, next_day).await.unwrap();
        assert_eq!(tomorrow.stats.unwrap().today_pnl, 0.0);
        assert!(dashboard.has_unsaved_changes());
    }

    #[tokio::test]
    async fn dashboard_survives_failing_account() {
        let mut dashboard = new_dashboard();
        let healthy = MockBroker::new("GBP");
        let broken = MockBroker::new("EUR");
        let a = connect(&mut dashboard, "ISA", &healthy).await;
        let b = connect(&mut dashboard, "Invest", &broken).await;
        broken.failing.store(true, Ordering::SeqCst);

        let summary = dashboard.dashboard_summary_on(day()).await;

        assert_eq!(summary.accounts.len(), 2);
        assert_eq!(summary.accounts[0].account_id, a);
        assert!(summary.accounts[0].is_complete());
        assert_eq!(summary.accounts[1].account_id, b);
        assert_eq!(summary.accounts[1].failed_sections(), 3);
        assert!(summary.is_degraded());
        assert_eq!(summary.totals_by_currency["GBP"].accounts, 1);
        assert!(!summary.totals_by_currency.contains_key("EUR"));
    }

    #[tokio::test]
    async fn recovering_account_served_stale() {
        let mut dashboard = new_dashboard();
        let mock = MockBroker::new("GBP");
        let id = connect(&mut dashboard, "ISA", &mock).await;

        dashboard.dashboard_summary_on(day()).await;
        mock.failing.store(true, Ordering::SeqCst);
        let degraded = dashboard.dashboard_summary_on(day()).await;

        let account = &degraded.accounts[0];
        assert_eq!(account.account_id, id);
        assert!(account.is_complete());
        assert!(account.cash.is_stale());
        assert!(degraded.is_degraded());
    }

    #[tokio::test]
    async fn empty_dashboard() {
        let mut dashboard = new_dashboard();
        let summary = dashboard.dashboard_summary_on(day()).await;
        assert!(summary.accounts.is_empty());
        assert!(summary.totals_by_currency.is_empty());
        assert!(!summary.is_degraded());
    }

    #[tokio::test]
    async fn refresh_account_expires_cache() {
        let mut dashboard = Dashboard::create_new(DashboardConfig {
            rate_limits: live_config().rate_limits,
            ..DashboardConfig::default()
        });
        let id = connect(&mut dashboard, "ISA", &MockBroker::new("GBP")).await;

        dashboard.gateway().cash(id).await.unwrap();
        let cached = dashboard.gateway().cash(id).await.unwrap();
        assert_eq!(cached.freshness, Freshness::Cached);

        assert!(dashboard.refresh_account(id) >= 1);
        let fresh = dashboard.gateway().cash(id).await.unwrap();
        assert_eq!(fresh.freshness, Freshness::Fresh);
    }

    #[tokio::test]
    async fn order_flow_for_day() {
        let filled = |id: i64, qty: f64, value: f64, when: &str| HistoricalOrder {
            id,
            ticker: "VUSA_EQ".into(),
            order_type: "MARKET".into(),
            status: "FILLED".into(),
            ordered_quantity: Some(qty),
            filled_quantity: Some(qty),
            fill_price: None,
            filled_value: Some(value),
            date_created: None,
            date_executed: Some(when.into()),
        };
        let mock = MockBroker::with_history(
            "GBP",
            vec![
                filled(1, 1.0, 80.0, "2025-01-15T10:00:00Z"),
                filled(2, -2.0, 170.0, "2025-01-15T11:00:00Z"),
                filled(3, 1.0, 75.0, "2025-01-14T10:00:00Z"),
            ],
        );
        let mut dashboard = new_dashboard();
        let id = connect(&mut dashboard, "ISA", &mock).await;

        let flow = dashboard.order_flow_on(id, day()).await.unwrap();
        assert_eq!(flow.bought, 80.0);
        assert_eq!(flow.sold, 170.0);
        assert_eq!(flow.filled_orders, 2);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Trail stops
// ═══════════════════════════════════════════════════════════════════

mod trail_stops {
    use super::*;

    #[tokio::test]
    async fn create_from_position_then_raise_and_trigger() {
        let mut dashboard = new_dashboard();
        let mock = MockBroker::new("GBP");
        mock.set_price("AAPL_US_EQ", 100.0);
        let id = connect(&mut dashboard, "ISA", &mock).await;

        let order = dashboard
            .create_trail_stop(id, "aapl_us_eq", 1.0, TrailDistance::Amount(10.0), None)
            .await
            .unwrap();
        assert_eq!(dashboard.get_trail_stop(order).unwrap().stop_price, 90.0);

        mock.set_price("AAPL_US_EQ", 125.0);
        let changes = dashboard.check_trail_stops(id).await.unwrap();
        assert_eq!(changes, vec![(order, TrailStopUpdate::Raised { stop_price: 115.0 })]);

        mock.set_price("AAPL_US_EQ", 114.0);
        let changes = dashboard.check_trail_stops(id).await.unwrap();
        assert_eq!(
            changes,
            vec![(
                order,
                TrailStopUpdate::Triggered {
                    price: 114.0,
                    stop_price: 115.0
                }
            )]
        );

        let stored = dashboard.get_trail_stop(order).unwrap();
        assert_eq!(stored.status, TrailStopStatus::Triggered);
        assert!(dashboard.get_active_trail_stops().is_empty());
    }

    #[tokio::test]
    async fn new_high_under_wider_trail_marks_profile_dirty() {
        let mut dashboard = new_dashboard();
        let mock = MockBroker::new("GBP");
        let id = connect(&mut dashboard, "ISA", &mock).await;
        let order = dashboard
            .create_trail_stop(id, "AAPL_US_EQ", 1.0, TrailDistance::Percent(10.0), Some(100.0))
            .await
            .unwrap();
        dashboard
            .update_trail_stop(order, TrailDistance::Percent(20.0))
            .unwrap();
        dashboard.save_to_bytes("pw").unwrap();

        mock.set_price("AAPL_US_EQ", 105.0);
        let changes = dashboard.check_trail_stops(id).await.unwrap();

        assert_eq!(changes.len(), 1);
        assert!(dashboard.has_unsaved_changes());
        assert_eq!(dashboard.get_trail_stop(order).unwrap().high_water_mark, 105.0);
    }

    #[tokio::test]
    async fn explicit_reference_price() {
        let mut dashboard = new_dashboard();
        let id = connect(&mut dashboard, "ISA", &MockBroker::new("GBP")).await;

        let order = dashboard
            .create_trail_stop(id, "MSFT_US_EQ", 2.0, TrailDistance::Percent(50.0), Some(400.0))
            .await
            .unwrap();
        assert_eq!(dashboard.get_trail_stop(order).unwrap().stop_price, 200.0);
    }

    #[tokio::test]
    async fn no_position_no_reference_price() {
        let mut dashboard = new_dashboard();
        let id = connect(&mut dashboard, "ISA", &MockBroker::new("GBP")).await;

        let err = dashboard
            .create_trail_stop(id, "TSLA_US_EQ", 1.0, TrailDistance::Percent(5.0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn update_note_cancel_remove() {
        let mut dashboard = new_dashboard();
        let id = connect(&mut dashboard, "ISA", &MockBroker::new("GBP")).await;
        let order = dashboard
            .create_trail_stop(id, "VUSA_EQ", 1.0, TrailDistance::Amount(5.0), Some(80.0))
            .await
            .unwrap();

        dashboard
            .update_trail_stop(order, TrailDistance::Amount(2.0))
            .unwrap();
        assert_eq!(dashboard.get_trail_stop(order).unwrap().stop_price, 78.0);

        dashboard
            .set_trail_stop_note(order, Some("long term".into()))
            .unwrap();
        dashboard.cancel_trail_stop(order).unwrap();
        assert!(dashboard.cancel_trail_stop(order).is_err());

        let removed = dashboard.remove_trail_stop(order).unwrap();
        assert_eq!(removed.note.as_deref(), Some("long term"));
        assert!(dashboard.get_trail_stops(id).is_empty());
    }

    #[tokio::test]
    async fn check_all_skips_unreachable_accounts() {
        let mut dashboard = new_dashboard();
        let ok = MockBroker::new("GBP");
        let down = MockBroker::new("GBP");
        ok.set_price("AAPL_US_EQ", 100.0);
        down.set_price("AAPL_US_EQ", 100.0);
        let a = connect(&mut dashboard, "ISA", &ok).await;
        let b = connect(&mut dashboard, "Invest", &down).await;

        let order_a = dashboard
            .create_trail_stop(a, "AAPL_US_EQ", 1.0, TrailDistance::Amount(10.0), None)
            .await
            .unwrap();
        dashboard
            .create_trail_stop(b, "AAPL_US_EQ", 1.0, TrailDistance::Amount(10.0), None)
            .await
            .unwrap();

        down.unauthorized.store(true, Ordering::SeqCst);
        ok.set_price("AAPL_US_EQ", 85.0);
        down.set_price("AAPL_US_EQ", 85.0);

        let changes = dashboard.check_all_trail_stops().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, order_a);
        assert_eq!(dashboard.get_active_trail_stops().len(), 1);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Persistence & settings
// ═══════════════════════════════════════════════════════════════════

mod persistence {
    use super::*;

    #[tokio::test]
    async fn save_load_then_attach_client() {
        let mut dashboard = new_dashboard();
        let mock = MockBroker::new("USD");
        mock.set_price("AAPL_US_EQ", 100.0);
        let id = connect(&mut dashboard, "ISA", &mock).await;
        dashboard
            .create_trail_stop(id, "AAPL_US_EQ", 1.0, TrailDistance::Percent(10.0), None)
            .await
            .unwrap();
        dashboard.set_display_currency("usd").unwrap();

        let bytes = dashboard.save_to_bytes("correct horse").unwrap();
        assert!(!dashboard.has_unsaved_changes());

        let mut restored = Dashboard::load_from_bytes(&bytes, "correct horse", live_config()).unwrap();
        assert!(!restored.has_unsaved_changes());
        assert_eq!(restored.get_accounts().len(), 1);
        assert_eq!(restored.get_trail_stops(id).len(), 1);
        assert_eq!(restored.get_settings().display_currency, "USD");
        assert!(restored.gateway().registry().contains(id));

        restored.attach_client(id, mock.clone()).unwrap();
        let summary = restored.account_summary_on(id, day()).await.unwrap();
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn wrong_password_rejected() {
        let mut dashboard = new_dashboard();
        connect(&mut dashboard, "ISA", &MockBroker::new("GBP")).await;
        let bytes = dashboard.save_to_bytes("pw").unwrap();

        let err = Dashboard::load_from_bytes(&bytes, "nope", live_config()).unwrap_err();
        assert!(matches!(err, CoreError::Decryption));
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.t2db");
        let mut dashboard = new_dashboard();
        let id = connect(&mut dashboard, "ISA", &MockBroker::new("GBP")).await;

        dashboard.save_to_file(&path, "pw").unwrap();
        let restored = Dashboard::load_from_file(&path, "pw", live_config()).unwrap();

        assert_eq!(restored.get_account(id).unwrap().currency.as_deref(), Some("GBP"));
        assert_eq!(restored.get_account(id).unwrap().api_key, "key-0000");
    }

    #[test]
    fn settings_validation() {
        let mut dashboard = new_dashboard();

        assert!(dashboard.set_display_currency("EURO").is_err());
        assert!(dashboard.set_display_currency("E1R").is_err());
        assert!(dashboard.set_refresh_interval(0).is_err());
        assert!(!dashboard.has_unsaved_changes());

        dashboard.set_display_currency(" eur ").unwrap();
        dashboard.set_refresh_interval(30).unwrap();
        assert_eq!(dashboard.get_settings().display_currency, "EUR");
        assert_eq!(dashboard.get_settings().refresh_interval_secs, 30);
        assert!(dashboard.has_unsaved_changes());
    }

    #[test]
    fn config_is_kept() {
        let dashboard = new_dashboard();
        assert_eq!(dashboard.get_config().cache.cash_ttl_ms, 0);
        assert!(format!("{dashboard:?}").contains("accounts: 0"));
    }
}
