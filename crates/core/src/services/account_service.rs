use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::account::{Account, Environment};
use crate::models::profile::Profile;

/// Manages connected accounts in the profile.
///
/// Removing an account also removes everything that belongs to it.
pub struct AccountService;

impl AccountService {
    pub fn new() -> Self {
        Self
    }

    /// Add an account. Names are unique per environment (case-insensitive).
    pub fn add(&self, profile: &mut Profile, account: Account) -> Result<Uuid, CoreError> {
        Self::validate_name(&account.name)?;
        if account.api_key.is_empty() {
            return Err(CoreError::ValidationError("API key must not be empty".into()));
        }
        self.ensure_unique_name(profile, &account.name, account.environment, None)?;

        let id = account.id;
        profile.accounts.push(account);
        Ok(id)
    }

    pub fn rename(&self, profile: &mut Profile, id: Uuid, name: &str) -> Result<(), CoreError> {
        let name = name.trim();
        Self::validate_name(name)?;
        let environment = profile
            .account(id)
            .map(|a| a.environment)
            .ok_or_else(|| CoreError::AccountNotFound(id.to_string()))?;
        self.ensure_unique_name(profile, name, environment, Some(id))?;

        if let Some(account) = profile.accounts.iter_mut().find(|a| a.id == id) {
            account.name = name.to_string();
        }
        Ok(())
    }

    /// Record the currency reported by the API.
    pub fn set_currency(&self, profile: &mut Profile, id: Uuid, currency: &str) -> Result<(), CoreError> {
        let account = profile
            .accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| CoreError::AccountNotFound(id.to_string()))?;
        account.currency = Some(currency.trim().to_uppercase());
        Ok(())
    }

    /// Remove an account with its trail stops and P/L baseline.
    pub fn remove(&self, profile: &mut Profile, id: Uuid) -> Result<Account, CoreError> {
        let idx = profile
            .accounts
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| CoreError::AccountNotFound(id.to_string()))?;
        let removed = profile.accounts.remove(idx);
        profile.trail_stops.retain(|o| o.account_id != id);
        profile.pnl_baselines.remove(&id);
        Ok(removed)
    }

    pub fn get<'a>(&self, profile: &'a Profile, id: Uuid) -> Option<&'a Account> {
        profile.account(id)
    }

    /// Accounts in the order they were connected.
    pub fn list<'a>(&self, profile: &'a Profile) -> Vec<&'a Account> {
        profile.accounts.iter().collect()
    }

    fn validate_name(name: &str) -> Result<(), CoreError> {
        if name.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Account name must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn ensure_unique_name(
        &self,
        profile: &Profile,
        name: &str,
        environment: Environment,
        except: Option<Uuid>,
    ) -> Result<(), CoreError> {
        let taken = profile.accounts.iter().any(|a| {
            Some(a.id) != except
                && a.environment == environment
                && a.name.eq_ignore_ascii_case(name.trim())
        });
        if taken {
            return Err(CoreError::ValidationError(format!(
                "An account named '{}' already exists in {environment}",
                name.trim()
            )));
        }
        Ok(())
    }
}

impl Default for AccountService {
    fn default() -> Self {
        Self::new()
    }
}
