use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How far below the high water mark the stop trails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrailDistance {
    /// Percentage of the high water mark (0 < p < 100)
    Percent(f64),
    /// Absolute price distance in instrument currency
    Amount(f64),
}

impl TrailDistance {
    /// Stop price for a given high water mark. Never negative.
    pub fn stop_price(&self, high_water_mark: f64) -> f64 {
        let stop = match self {
            TrailDistance::Percent(pct) => high_water_mark * (1.0 - pct / 100.0),
            TrailDistance::Amount(amount) => high_water_mark - amount,
        };
        stop.max(0.0)
    }
}

impl std::fmt::Display for TrailDistance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrailDistance::Percent(p) => write!(f, "{p}%"),
            TrailDistance::Amount(a) => write!(f, "{a}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailStopStatus {
    Active,
    Triggered,
    Cancelled,
}

impl std::fmt::Display for TrailStopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrailStopStatus::Active => write!(f, "Active"),
            TrailStopStatus::Triggered => write!(f, "Triggered"),
            TrailStopStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A trail stop-loss order tracked by the dashboard itself.
///
/// Trading212 does not see these orders. The dashboard follows the price,
/// ratchets the stop up behind it, and flags the order once the price
/// falls through the stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailStopOrder {
    pub id: Uuid,
    pub account_id: Uuid,

    /// Instrument ticker, uppercased (e.g., "AAPL_US_EQ")
    pub ticker: String,

    /// Quantity to sell when triggered (always positive)
    pub quantity: f64,

    pub trail: TrailDistance,

    /// Highest price observed since the order was created
    pub high_water_mark: f64,

    /// Current stop level; only ever moves up
    pub stop_price: f64,

    pub status: TrailStopStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,

    /// Price that crossed the stop
    #[serde(default)]
    pub triggered_price: Option<f64>,

    #[serde(default)]
    pub note: Option<String>,
}

impl TrailStopOrder {
    pub fn new(
        account_id: Uuid,
        ticker: impl Into<String>,
        quantity: f64,
        trail: TrailDistance,
        reference_price: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            ticker: ticker.into().trim().to_uppercase(),
            quantity,
            trail,
            high_water_mark: reference_price,
            stop_price: trail.stop_price(reference_price),
            status: TrailStopStatus::Active,
            created_at: now,
            updated_at: now,
            triggered_at: None,
            triggered_price: None,
            note: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TrailStopStatus::Active
    }
}

/// Result of evaluating one order against a new price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailStopUpdate {
    /// Price moved but neither raised the stop nor crossed it
    Unchanged,
    /// New high: the stop was ratcheted up
    Raised { stop_price: f64 },
    /// New high that leaves the stop where it was (a wider trail kept an
    /// earlier, higher stop)
    HighWaterMark { high_water_mark: f64 },
    /// Price fell to or below the stop
    Triggered { price: f64, stop_price: f64 },
}
