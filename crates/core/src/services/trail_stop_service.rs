use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::position::Position;
use crate::models::profile::Profile;
use crate::models::trail_stop::{TrailDistance, TrailStopOrder, TrailStopStatus, TrailStopUpdate};

/// Manages the dashboard's own trail stop-loss orders.
///
/// Pure business logic over `Profile::trail_stops`, no I/O. Triggering an
/// order only records it; selling is left to the user.
pub struct TrailStopService;

impl TrailStopService {
    pub fn new() -> Self {
        Self
    }

    /// Create an active order trailing `reference_price`.
    pub fn create(
        &self,
        profile: &mut Profile,
        account_id: Uuid,
        ticker: &str,
        quantity: f64,
        trail: TrailDistance,
        reference_price: f64,
    ) -> Result<Uuid, CoreError> {
        if profile.account(account_id).is_none() {
            return Err(CoreError::AccountNotFound(account_id.to_string()));
        }
        if ticker.trim().is_empty() {
            return Err(CoreError::ValidationError("Ticker must not be empty".into()));
        }
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Quantity must be positive, got {quantity}"
            )));
        }
        if !reference_price.is_finite() || reference_price <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Reference price must be positive, got {reference_price}"
            )));
        }
        Self::validate_trail(&trail, reference_price)?;

        let order = TrailStopOrder::new(account_id, ticker, quantity, trail, reference_price);
        let id = order.id;
        info!(
            account = %account_id,
            ticker = %order.ticker,
            stop = order.stop_price,
            "trail stop created"
        );
        profile.trail_stops.push(order);
        Ok(id)
    }

    /// Change the trail of an active order. The stop is recomputed from the
    /// current high water mark but never lowered.
    pub fn update_trail(
        &self,
        profile: &mut Profile,
        order_id: Uuid,
        trail: TrailDistance,
    ) -> Result<(), CoreError> {
        let order = Self::find_mut(profile, order_id)?;
        if !order.is_active() {
            return Err(CoreError::ValidationError(format!(
                "Cannot change trail of a {} order",
                order.status
            )));
        }
        Self::validate_trail(&trail, order.high_water_mark)?;

        order.trail = trail;
        order.stop_price = order.stop_price.max(trail.stop_price(order.high_water_mark));
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Set or clear the note on an order.
    pub fn set_note(
        &self,
        profile: &mut Profile,
        order_id: Uuid,
        note: Option<String>,
    ) -> Result<(), CoreError> {
        let order = Self::find_mut(profile, order_id)?;
        order.note = note;
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Cancel an active order. Cancelling twice is an error.
    pub fn cancel(&self, profile: &mut Profile, order_id: Uuid) -> Result<(), CoreError> {
        let order = Self::find_mut(profile, order_id)?;
        if !order.is_active() {
            return Err(CoreError::ValidationError(format!(
                "Order {order_id} is already {}",
                order.status
            )));
        }
        order.status = TrailStopStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Delete an order regardless of status.
    pub fn remove(&self, profile: &mut Profile, order_id: Uuid) -> Result<TrailStopOrder, CoreError> {
        let idx = profile
            .trail_stops
            .iter()
            .position(|o| o.id == order_id)
            .ok_or_else(|| CoreError::TrailStopNotFound(order_id.to_string()))?;
        Ok(profile.trail_stops.remove(idx))
    }

    pub fn get<'a>(&self, profile: &'a Profile, order_id: Uuid) -> Option<&'a TrailStopOrder> {
        profile.trail_stops.iter().find(|o| o.id == order_id)
    }

    /// All orders of an account, newest first.
    pub fn list_for_account<'a>(
        &self,
        profile: &'a Profile,
        account_id: Uuid,
    ) -> Vec<&'a TrailStopOrder> {
        let mut orders: Vec<&TrailStopOrder> = profile
            .trail_stops
            .iter()
            .filter(|o| o.account_id == account_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    pub fn active<'a>(&self, profile: &'a Profile) -> Vec<&'a TrailStopOrder> {
        profile.trail_stops.iter().filter(|o| o.is_active()).collect()
    }

    /// Feed one price into an order.
    ///
    /// - Inactive orders and non-positive prices are ignored.
    /// - A new high raises the high water mark and the stop (never lowers it).
    ///   Only `Unchanged` leaves the order untouched.
    /// - A price at or below the stop triggers the order.
    pub fn evaluate(&self, order: &mut TrailStopOrder, price: f64) -> TrailStopUpdate {
        if !order.is_active() || !price.is_finite() || price <= 0.0 {
            return TrailStopUpdate::Unchanged;
        }

        if price > order.high_water_mark {
            order.high_water_mark = price;
            order.updated_at = Utc::now();
            let candidate = order.trail.stop_price(price);
            if candidate > order.stop_price {
                order.stop_price = candidate;
                return TrailStopUpdate::Raised {
                    stop_price: candidate,
                };
            }
            return TrailStopUpdate::HighWaterMark {
                high_water_mark: price,
            };
        }

        if price <= order.stop_price {
            let now = Utc::now();
            order.status = TrailStopStatus::Triggered;
            order.triggered_at = Some(now);
            order.triggered_price = Some(price);
            order.updated_at = now;
            info!(
                order = %order.id,
                ticker = %order.ticker,
                price,
                stop = order.stop_price,
                "trail stop triggered"
            );
            return TrailStopUpdate::Triggered {
                price,
                stop_price: order.stop_price,
            };
        }

        TrailStopUpdate::Unchanged
    }

    /// Evaluate every active order of an account against the current
    /// price of its ticker. Orders whose ticker has no open position are
    /// left untouched. Returns the orders that changed.
    pub fn evaluate_positions(
        &self,
        profile: &mut Profile,
        account_id: Uuid,
        positions: &[Position],
    ) -> Vec<(Uuid, TrailStopUpdate)> {
        let mut changes = Vec::new();
        for order in profile
            .trail_stops
            .iter_mut()
            .filter(|o| o.account_id == account_id && o.is_active())
        {
            let Some(position) = positions
                .iter()
                .find(|p| p.ticker.eq_ignore_ascii_case(&order.ticker))
            else {
                continue;
            };
            let update = self.evaluate(order, position.current_price);
            if update != TrailStopUpdate::Unchanged {
                changes.push((order.id, update));
            }
        }
        changes
    }

    fn validate_trail(trail: &TrailDistance, reference_price: f64) -> Result<(), CoreError> {
        match *trail {
            TrailDistance::Percent(pct) if !pct.is_finite() || pct <= 0.0 || pct >= 100.0 => {
                Err(CoreError::ValidationError(format!(
                    "Trail percentage must be between 0 and 100, got {pct}"
                )))
            }
            TrailDistance::Amount(amount)
                if !amount.is_finite() || amount <= 0.0 || amount >= reference_price =>
            {
                Err(CoreError::ValidationError(format!(
                    "Trail amount must be positive and below the price {reference_price}, got {amount}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn find_mut(profile: &mut Profile, order_id: Uuid) -> Result<&mut TrailStopOrder, CoreError> {
        profile
            .trail_stops
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| CoreError::TrailStopNotFound(order_id.to_string()))
    }
}

impl Default for TrailStopService {
    fn default() -> Self {
        Self::new()
    }
}
