pub mod config;
pub mod errors;
pub mod format;
pub mod logging;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use config::DashboardConfig;
use errors::CoreError;
use models::{
    account::{Account, Environment},
    profile::Profile,
    settings::Settings,
    summary::{AccountSummary, DashboardSummary},
    trail_stop::{TrailDistance, TrailStopOrder, TrailStopUpdate},
};
use providers::{registry::ClientRegistry, trading212::Trading212Client, traits::BrokerApi};
use services::{
    account_service::AccountService,
    analytics_service::{AnalyticsService, DailyOrderFlow},
    gateway_service::GatewayService,
    trail_stop_service::TrailStopService,
};
use storage::{encryption::KdfParams, manager::StorageManager};

/// Main entry point for the dashboard core library.
/// Holds the profile (accounts, trail stops, settings) and all services
/// needed to operate on it.
#[must_use]
pub struct Dashboard {
    profile: Profile,
    config: DashboardConfig,
    gateway: GatewayService,
    account_service: AccountService,
    trail_stop_service: TrailStopService,
    analytics_service: AnalyticsService,
    kdf_params: KdfParams,
    /// Accounts served by a caller-supplied client rather than one built
    /// from the stored key.
    custom_clients: HashSet<Uuid>,
    /// Tracks whether any mutation has occurred since the last save/load.
    dirty: bool,
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("accounts", &self.profile.accounts.len())
            .field("trail_stops", &self.profile.trail_stops.len())
            .field("settings", &self.profile.settings)
            .field("cached_responses", &self.gateway.cache().len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Dashboard {
    /// Create an empty profile.
    pub fn create_new(config: DashboardConfig) -> Self {
        Self::build(Profile::default(), config)
    }

    /// Load an existing profile from encrypted bytes (password required).
    pub fn load_from_bytes(
        encrypted: &[u8],
        password: &str,
        config: DashboardConfig,
    ) -> Result<Self, CoreError> {
        let profile = StorageManager::load_from_bytes(encrypted, password)?;
        Ok(Self::build(profile, config))
    }

    /// Save the profile to encrypted bytes. Clears the unsaved-changes flag.
    pub fn save_to_bytes(&mut self, password: &str) -> Result<Vec<u8>, CoreError> {
        let bytes = StorageManager::save_with_params(&self.profile, password, self.kdf_params)?;
        self.dirty = false;
        Ok(bytes)
    }

    pub fn load_from_file(
        path: impl AsRef<Path>,
        password: &str,
        config: DashboardConfig,
    ) -> Result<Self, CoreError> {
        let profile = StorageManager::load_from_file(path, password)?;
        Ok(Self::build(profile, config))
    }

    /// Save to an encrypted file. Clears the unsaved-changes flag.
    pub fn save_to_file(&mut self, path: impl AsRef<Path>, password: &str) -> Result<(), CoreError> {
        StorageManager::save_to_file(&self.profile, path, password, self.kdf_params)?;
        self.dirty = false;
        Ok(())
    }

    /// Key-derivation cost used by subsequent saves.
    pub fn set_kdf_params(&mut self, params: KdfParams) {
        self.kdf_params = params;
    }

    // ── Accounts ────────────────────────────────────────────────────

    /// Connect a Trading212 account.
    ///
    /// The key is verified by fetching the account info once; on failure
    /// nothing is kept.
    pub async fn connect_account(
        &mut self,
        name: &str,
        environment: Environment,
        api_key: &str,
    ) -> Result<Uuid, CoreError> {
        let account = Account::new(name, environment, api_key);
        let client = Arc::new(Trading212Client::new(&account, self.config.request_timeout()));
        self.connect(account, client, false).await
    }

    /// Connect an account using a caller-supplied upstream client.
    pub async fn connect_account_with_client(
        &mut self,
        account: Account,
        client: Arc<dyn BrokerApi>,
    ) -> Result<Uuid, CoreError> {
        self.connect(account, client, true).await
    }

    async fn connect(
        &mut self,
        account: Account,
        client: Arc<dyn BrokerApi>,
        custom: bool,
    ) -> Result<Uuid, CoreError> {
        let id = self.account_service.add(&mut self.profile, account)?;
        self.gateway.register_client(id, client);
        if custom {
            self.custom_clients.insert(id);
        }

        match self.gateway.info(id).await {
            Ok(info) => {
                self.account_service
                    .set_currency(&mut self.profile, id, &info.data.currency_code)?;
                self.dirty = true;
                info!(account = %id, currency = %info.data.currency_code, "account connected");
                Ok(id)
            }
            Err(e) => {
                warn!(account = %id, error = %e, "account verification failed");
                self.gateway.remove_client(id);
                self.custom_clients.remove(&id);
                self.account_service.remove(&mut self.profile, id)?;
                Err(e)
            }
        }
    }

    /// Swap the upstream client of an existing account (custom transports,
    /// mocks). Cached responses of the old client are dropped.
    pub fn attach_client(&mut self, id: Uuid, client: Arc<dyn BrokerApi>) -> Result<(), CoreError> {
        if self.profile.account(id).is_none() {
            return Err(CoreError::AccountNotFound(id.to_string()));
        }
        self.gateway.register_client(id, client);
        self.custom_clients.insert(id);
        Ok(())
    }

    /// Remove an account together with its trail stops and cached data.
    pub fn remove_account(&mut self, id: Uuid) -> Result<(), CoreError> {
        self.account_service.remove(&mut self.profile, id)?;
        self.gateway.remove_client(id);
        self.custom_clients.remove(&id);
        self.dirty = true;
        Ok(())
    }

    /// Rename an account. A client built from the stored key is rebuilt so
    /// its logs carry the new name; caller-supplied clients are kept.
    pub fn rename_account(&mut self, id: Uuid, name: &str) -> Result<(), CoreError> {
        self.account_service.rename(&mut self.profile, id, name)?;
        if !self.custom_clients.contains(&id) {
            if let Some(account) = self.profile.account(id) {
                let client = Trading212Client::new(account, self.config.request_timeout());
                self.gateway.swap_client(id, Arc::new(client));
            }
        }
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn get_account(&self, id: Uuid) -> Option<&Account> {
        self.account_service.get(&self.profile, id)
    }

    #[must_use]
    pub fn get_accounts(&self) -> Vec<&Account> {
        self.account_service.list(&self.profile)
    }

    // ── Dashboard data ──────────────────────────────────────────────

    /// Summary of one account. Sections that fail upstream are reported
    /// inside the summary, not as an error.
    pub async fn account_summary(&mut self, id: Uuid) -> Result<AccountSummary, CoreError> {
        self.account_summary_on(id, Utc::now().date_naive()).await
    }

    pub async fn account_summary_on(
        &mut self,
        id: Uuid,
        date: NaiveDate,
    ) -> Result<AccountSummary, CoreError> {
        if self.profile.account(id).is_none() {
            return Err(CoreError::AccountNotFound(id.to_string()));
        }
        let snapshot = self.gateway.account_snapshot(id).await;

        let before = self.profile.pnl_baselines.clone();
        let account = self
            .profile
            .accounts
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| CoreError::AccountNotFound(id.to_string()))?;
        let summary = self.analytics_service.summarize_on(
            &mut self.profile.pnl_baselines,
            account,
            snapshot,
            date,
        );
        self.mark_dirty_if_changed(&before);
        Ok(summary)
    }

    /// Summaries of every connected account, loaded concurrently.
    /// Never fails: broken accounts show up as failed sections.
    pub async fn dashboard_summary(&mut self) -> DashboardSummary {
        self.dashboard_summary_on(Utc::now().date_naive()).await
    }

    pub async fn dashboard_summary_on(&mut self, date: NaiveDate) -> DashboardSummary {
        let ids: Vec<Uuid> = self.profile.accounts.iter().map(|a| a.id).collect();
        let snapshots = self.gateway.snapshots(&ids).await;

        let before = self.profile.pnl_baselines.clone();
        let mut summaries = Vec::with_capacity(snapshots.len());
        for (id, snapshot) in snapshots {
            let Some(account) = self.profile.accounts.iter().find(|a| a.id == id) else {
                continue;
            };
            summaries.push(self.analytics_service.summarize_on(
                &mut self.profile.pnl_baselines,
                account,
                snapshot,
                date,
            ));
        }
        self.mark_dirty_if_changed(&before);

        let summary = self.analytics_service.dashboard(summaries);
        if summary.is_degraded() {
            warn!(
                failed_sections = summary.failed_sections(),
                "dashboard served with degraded data"
            );
        }
        summary
    }

    /// Filled buys and sells of today, from the first history page.
    pub async fn today_order_flow(&self, id: Uuid) -> Result<DailyOrderFlow, CoreError> {
        self.order_flow_on(id, Utc::now().date_naive()).await
    }

    pub async fn order_flow_on(&self, id: Uuid, date: NaiveDate) -> Result<DailyOrderFlow, CoreError> {
        let history = self.gateway.order_history(id, None).await?;
        Ok(self.analytics_service.order_flow_on(&history.data.items, date))
    }

    /// Make the next load of this account go upstream (rate limits permitting).
    pub fn refresh_account(&self, id: Uuid) -> usize {
        self.gateway.refresh(id)
    }

    /// Direct access to the aggregation layer (typed per-endpoint loads).
    #[must_use]
    pub fn gateway(&self) -> &GatewayService {
        &self.gateway
    }

    // ── Trail stops ─────────────────────────────────────────────────

    /// Create a trail stop. Without a reference price the position's
    /// current price is used.
    pub async fn create_trail_stop(
        &mut self,
        account_id: Uuid,
        ticker: &str,
        quantity: f64,
        trail: TrailDistance,
        reference_price: Option<f64>,
    ) -> Result<Uuid, CoreError> {
        let reference_price = match reference_price {
            Some(price) => price,
            None => {
                if self.profile.account(account_id).is_none() {
                    return Err(CoreError::AccountNotFound(account_id.to_string()));
                }
                let positions = self.gateway.positions(account_id).await?;
                positions
                    .data
                    .iter()
                    .find(|p| p.ticker.eq_ignore_ascii_case(ticker.trim()))
                    .map(|p| p.current_price)
                    .ok_or_else(|| {
                        CoreError::ValidationError(format!(
                            "No open position in {ticker} to take a reference price from"
                        ))
                    })?
            }
        };

        let id = self.trail_stop_service.create(
            &mut self.profile,
            account_id,
            ticker,
            quantity,
            trail,
            reference_price,
        )?;
        self.dirty = true;
        Ok(id)
    }

    pub fn update_trail_stop(&mut self, id: Uuid, trail: TrailDistance) -> Result<(), CoreError> {
        self.trail_stop_service
            .update_trail(&mut self.profile, id, trail)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_trail_stop_note(&mut self, id: Uuid, note: Option<String>) -> Result<(), CoreError> {
        self.trail_stop_service.set_note(&mut self.profile, id, note)?;
        self.dirty = true;
        Ok(())
    }

    pub fn cancel_trail_stop(&mut self, id: Uuid) -> Result<(), CoreError> {
        self.trail_stop_service.cancel(&mut self.profile, id)?;
        self.dirty = true;
        Ok(())
    }

    pub fn remove_trail_stop(&mut self, id: Uuid) -> Result<TrailStopOrder, CoreError> {
        let removed = self.trail_stop_service.remove(&mut self.profile, id)?;
        self.dirty = true;
        Ok(removed)
    }

    #[must_use]
    pub fn get_trail_stop(&self, id: Uuid) -> Option<&TrailStopOrder> {
        self.trail_stop_service.get(&self.profile, id)
    }

    #[must_use]
    pub fn get_trail_stops(&self, account_id: Uuid) -> Vec<&TrailStopOrder> {
        self.trail_stop_service
            .list_for_account(&self.profile, account_id)
    }

    #[must_use]
    pub fn get_active_trail_stops(&self) -> Vec<&TrailStopOrder> {
        self.trail_stop_service.active(&self.profile)
    }

    /// Evaluate an account's active trail stops against its current positions.
    pub async fn check_trail_stops(
        &mut self,
        account_id: Uuid,
    ) -> Result<Vec<(Uuid, TrailStopUpdate)>, CoreError> {
        if self.profile.account(account_id).is_none() {
            return Err(CoreError::AccountNotFound(account_id.to_string()));
        }
        let positions = self.gateway.positions(account_id).await?;
        let changes = self.trail_stop_service.evaluate_positions(
            &mut self.profile,
            account_id,
            &positions.data,
        );
        if !changes.is_empty() {
            self.dirty = true;
        }
        Ok(changes)
    }

    /// Evaluate trail stops of every account that has active ones.
    /// Accounts whose positions cannot be loaded are skipped and logged.
    pub async fn check_all_trail_stops(&mut self) -> Vec<(Uuid, TrailStopUpdate)> {
        let mut account_ids: Vec<Uuid> = self
            .trail_stop_service
            .active(&self.profile)
            .iter()
            .map(|o| o.account_id)
            .collect();
        account_ids.sort();
        account_ids.dedup();

        let mut changes = Vec::new();
        for account_id in account_ids {
            match self.check_trail_stops(account_id).await {
                Ok(mut account_changes) => changes.append(&mut account_changes),
                Err(e) => {
                    warn!(account = %account_id, error = %e, "skipping trail stop check")
                }
            }
        }
        changes
    }

    // ── Settings ────────────────────────────────────────────────────

    /// Currency code must be a 3-letter alphabetic string.
    pub fn set_display_currency(&mut self, currency: &str) -> Result<(), CoreError> {
        let trimmed = currency.trim().to_uppercase();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::ValidationError(format!(
                "Invalid currency code '{currency}': must be exactly 3 ASCII letters (e.g., GBP, EUR, USD)"
            )));
        }
        self.profile.settings.display_currency = trimmed;
        self.dirty = true;
        Ok(())
    }

    pub fn set_refresh_interval(&mut self, secs: u64) -> Result<(), CoreError> {
        if secs == 0 {
            return Err(CoreError::ValidationError(
                "Refresh interval must be at least one second".into(),
            ));
        }
        self.profile.settings.refresh_interval_secs = secs;
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn get_settings(&self) -> &Settings {
        &self.profile.settings
    }

    #[must_use]
    pub fn get_config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Returns `true` if the profile has been modified since the last save or load.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    // ── Internal ────────────────────────────────────────────────────

    fn mark_dirty_if_changed(
        &mut self,
        before: &std::collections::HashMap<Uuid, models::profile::PnlBaseline>,
    ) {
        if *before != self.profile.pnl_baselines {
            self.dirty = true;
        }
    }

    fn build(profile: Profile, config: DashboardConfig) -> Self {
        let registry = ClientRegistry::from_accounts(&profile.accounts, config.request_timeout());
        let gateway = GatewayService::new(registry, &config);

        Self {
            profile,
            config,
            gateway,
            account_service: AccountService::new(),
            trail_stop_service: TrailStopService::new(),
            analytics_service: AnalyticsService::new(),
            kdf_params: KdfParams::default(),
            custom_clients: HashSet::new(),
            dirty: false,
        }
    }
}
