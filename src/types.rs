use crate::constants::SourceType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One observation as received from the source, before any cleaning.
/// Dates that could not be parsed are kept as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BronzeRow {
    pub date: Option<NaiveDate>,
    pub series_id: String,
    pub value: Option<f64>,
    pub source_type: SourceType,
    pub ingested_at: DateTime<Utc>,
}

/// One week on the Friday grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverRow {
    pub week: NaiveDate,
    pub series_id: String,
    pub source_type: SourceType,
    pub value: f64,
    /// Date of the observation the value was taken from
    pub source_date: NaiveDate,
    /// True when the value was carried forward from an earlier date
    pub filled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldPriceRow {
    pub week: NaiveDate,
    pub value: f64,
    pub return_1w: Option<f64>,
    pub vol_4w: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldSupplyRow {
    pub week: NaiveDate,
    pub value: f64,
    pub supply_delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldStorageRow {
    pub week: NaiveDate,
    pub value: f64,
    pub inventory_delta: Option<f64>,
}

/// Long-format feature row as served by `/signals`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldFeature {
    pub commodity: String,
    pub week: NaiveDate,
    pub feature_name: String,
    pub feature_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub commodity: String,
    pub week: NaiveDate,
    pub regime_label: String,
    pub regime_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub commodity: String,
    pub week: NaiveDate,
    pub horizon_weeks: u32,
    pub forecast_value: f64,
}

/// Market-state label attached to a week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeLabel {
    /// Inventories drawing while price rises
    TightSupply,
    /// Inventories building while price falls
    Oversupplied,
    /// Falling price in a high-volatility window
    RiskOff,
    Balanced,
}

impl RegimeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeLabel::TightSupply => "tight_supply",
            RegimeLabel::Oversupplied => "oversupplied",
            RegimeLabel::RiskOff => "risk_off",
            RegimeLabel::Balanced => "balanced",
        }
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
