/// Series and table names shared by every pipeline stage.
///
/// The user-facing source names (used on the CLI) map onto an EIA series id
/// and one table per tier.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PRICES_SOURCE: &str = "prices";
pub const STORAGE_SOURCE: &str = "storage";
pub const SUPPLY_SOURCE: &str = "supply";

/// WTI spot price, daily ("PET" petroleum, "RWTC" WTI crude, "D" daily)
pub const WTI_SPOT_SERIES: &str = "PET.RWTC.D";
/// Weekly US crude inventory
pub const CRUDE_INVENTORY_SERIES: &str = "PET.WCESTUS1.W";
/// Weekly US crude production
pub const CRUDE_PRODUCTION_SERIES: &str = "PET.MCRFPUS2.W";

pub const GOLD_REGIMES_TABLE: &str = "gold_regimes";
pub const GOLD_FORECASTS_TABLE: &str = "gold_forecasts";

pub const DEFAULT_COMMODITY: &str = "wti";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Prices,
    Storage,
    Supply,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [SourceType::Prices, SourceType::Storage, SourceType::Supply];

    pub fn name(&self) -> &'static str {
        match self {
            SourceType::Prices => PRICES_SOURCE,
            SourceType::Storage => STORAGE_SOURCE,
            SourceType::Supply => SUPPLY_SOURCE,
        }
    }

    pub fn series_id(&self) -> &'static str {
        match self {
            SourceType::Prices => WTI_SPOT_SERIES,
            SourceType::Storage => CRUDE_INVENTORY_SERIES,
            SourceType::Supply => CRUDE_PRODUCTION_SERIES,
        }
    }

    pub fn bronze_table(&self) -> &'static str {
        match self {
            SourceType::Prices => "bronze_eia_prices",
            SourceType::Storage => "bronze_eia_storage",
            SourceType::Supply => "bronze_eia_supply",
        }
    }

    pub fn silver_table(&self) -> &'static str {
        match self {
            SourceType::Prices => "silver_eia_prices",
            SourceType::Storage => "silver_eia_storage",
            SourceType::Supply => "silver_eia_supply",
        }
    }

    pub fn gold_table(&self) -> &'static str {
        match self {
            SourceType::Prices => "gold_eia_prices",
            SourceType::Storage => "gold_eia_storage",
            SourceType::Supply => "gold_eia_supply",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            PRICES_SOURCE => Ok(SourceType::Prices),
            STORAGE_SOURCE => Ok(SourceType::Storage),
            SUPPLY_SOURCE => Ok(SourceType::Supply),
            other => Err(format!(
                "unknown source '{other}' (expected one of: {})",
                get_supported_sources().join(", ")
            )),
        }
    }
}

/// Parse a comma-separated CLI list; `None` selects every source
pub fn parse_source_list(list: Option<&str>) -> Result<Vec<SourceType>, String> {
    let Some(list) = list else {
        return Ok(SourceType::ALL.to_vec());
    };
    let mut out = Vec::new();
    for part in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let source: SourceType = part.parse()?;
        if !out.contains(&source) {
            out.push(source);
        }
    }
    if out.is_empty() {
        return Err("no sources selected".to_string());
    }
    Ok(out)
}

pub fn get_supported_sources() -> Vec<&'static str> {
    SourceType::ALL.iter().map(|s| s.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_lists() {
        assert_eq!(parse_source_list(None).unwrap(), SourceType::ALL.to_vec());
        assert_eq!(
            parse_source_list(Some("supply, prices,supply")).unwrap(),
            vec![SourceType::Supply, SourceType::Prices]
        );
        assert!(parse_source_list(Some("gold")).is_err());
        assert!(parse_source_list(Some(" , ")).is_err());
    }

    #[test]
    fn tables_follow_tier_naming() {
        assert_eq!(SourceType::Storage.bronze_table(), "bronze_eia_storage");
        assert_eq!(SourceType::Storage.silver_table(), "silver_eia_storage");
        assert_eq!(SourceType::Storage.gold_table(), "gold_eia_storage");
        assert_eq!(SourceType::Prices.series_id(), "PET.RWTC.D");
    }
}
