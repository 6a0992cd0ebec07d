use crate::constants::DEFAULT_COMMODITY;
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub eia: EiaConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EiaConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for EiaConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.eia.gov/series/".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_root: PathBuf,
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub commodity: String,
    /// Minimum seconds between two fetches of the same series
    pub min_fetch_interval_secs: i64,
    /// Drop silver weeks whose carried-forward observation is older than this
    pub max_fill_weeks: Option<u32>,
    pub forecast_horizons: Vec<u32>,
    pub forecast_window_weeks: usize,
    /// Weekly return volatility above which a falling market is `risk_off`
    pub high_vol_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commodity: DEFAULT_COMMODITY.to_string(),
            min_fetch_interval_secs: 6 * 60 * 60,
            max_fill_weeks: None,
            forecast_horizons: vec![1, 4, 8, 13],
            forecast_window_weeks: 52,
            high_vol_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

impl Config {
    /// Load `config.toml` (or `$OIL_REGIME_CONFIG`) if present, then apply
    /// environment overrides. `.env` is read first when it exists.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`Config::load`] with an explicit file taking precedence
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("OIL_REGIME_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        let mut config = Self::from_file_or_default(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Environment wins over the file. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("EIA_API_KEY") {
            self.eia.api_key = Some(key);
        }
        if let Some(url) = get("EIA_BASE_URL") {
            self.eia.base_url = url;
        }
        if let Some(root) = get("OIL_REGIME_DATA_ROOT") {
            self.storage.data_root = PathBuf::from(root);
        }
        if let Some(url) = get("DB_URL").or_else(|| get("db_url")) {
            self.storage.database_url = Some(url);
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.eia
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PipelineError::Config("EIA_API_KEY is required".to_string()))
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.storage
            .database_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Config("db_url is required for database access".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.eia.base_url, "https://api.eia.gov/series/");
        assert_eq!(c.storage.data_root, PathBuf::from("data"));
        assert_eq!(c.pipeline.commodity, "wti");
        assert_eq!(c.pipeline.forecast_horizons, vec![1, 4, 8, 13]);
        assert_eq!(c.server.port, 8000);
        assert!(c.require_api_key().is_err());
        assert!(c.require_database_url().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = Config::from_toml_str(
            r#"
            [pipeline]
            max_fill_weeks = 2
            forecast_horizons = [4]

            [storage]
            database_url = "sqlite://data/test.db"
            "#,
        )
        .unwrap();
        assert_eq!(c.pipeline.max_fill_weeks, Some(2));
        assert_eq!(c.pipeline.forecast_horizons, vec![4]);
        assert_eq!(c.pipeline.forecast_window_weeks, 52);
        assert_eq!(c.require_database_url().unwrap(), "sqlite://data/test.db");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml_str("[pipeline\nx = 1"),
            Err(PipelineError::Toml(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("EIA_API_KEY", "abc"),
            ("db_url", "sqlite::memory:"),
            ("PORT", "9001"),
            ("OIL_REGIME_DATA_ROOT", "  "),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.require_api_key().unwrap(), "abc");
        assert_eq!(c.require_database_url().unwrap(), "sqlite::memory:");
        assert_eq!(c.server.port, 9001);
        // blank values do not clobber defaults
        assert_eq!(c.storage.data_root, PathBuf::from("data"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let c = Config::from_file_or_default(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(c.server.port, 8000);
    }
}
