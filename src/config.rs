//! Configuration for the geotagging utilities.
//!
//! Settings come from three layers, later layers winning:
//!   1. built-in defaults (the values the one-off scripts hard-coded)
//!   2. an optional TOML file (`geotag.toml` in the working directory)
//!   3. environment variables, after loading `.env` via dotenv
//!
//! Only the metadata credentials are read from the environment:
//! `MINING_TOKEN` and `DATA_ENDPOINT`.

use serde::Deserialize;
use std::path::Path;

use crate::model::GeotagError;

pub const DEFAULT_CONFIG_PATH: &str = "./geotag.toml";

pub const ENV_TOKEN: &str = "MINING_TOKEN";
pub const ENV_ENDPOINT: &str = "DATA_ENDPOINT";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub metadata: MetadataConfig,
    pub geocoder: GeocoderConfig,
    pub land: LandConfig,
    pub output: OutputConfig,
    pub batch: BatchConfig,
    pub probe: ProbeConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Text dump containing `"md5":"..."` fragments.
    pub path: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { path: "data100.txt".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub endpoint: String,
    /// Empty means unauthenticated; the service will most likely refuse.
    pub token: String,
    pub timeout_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://mdi.cla.eu.momenta.works".to_string(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    /// Nominatim rejects requests without an identifying User-Agent.
    pub user_agent: String,
    pub timeout_secs: u64,
    pub cache_capacity: usize,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: format!("bag_geotag/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            cache_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LandConfig {
    /// GeoJSON export of the country-boundary shapefile.
    pub path: String,
}

impl Default for LandConfig {
    fn default() -> Self {
        Self {
            path: "./WB_countries_Admin0_10m/WB_countries_Admin0_10m.shp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub valid_log: String,
    pub invalid_log: String,
    pub log_file: String,
    pub log_level: String,
    /// `{md5}` is replaced by the bag identifier.
    pub viewer_url_template: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            valid_log: "valid_coordinates_log.csv".to_string(),
            invalid_log: "invalid_coordinates_log.csv".to_string(),
            log_file: "data_processing.log".to_string(),
            log_level: "info".to_string(),
            viewer_url_template: "https://mviz.cla.eu.momenta.works/player/v4/?bag_md5={md5}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub throttle_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { size: 100, throttle_ms: 0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub throttle_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { throttle_ms: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub bind: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8050".to_string() }
    }
}

impl Config {
    /// Parse a TOML document. Missing sections and keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Config, GeotagError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration for a run.
    ///
    /// An explicit `path` must exist. Without one, `geotag.toml` is used when
    /// present and defaults otherwise. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Config, GeotagError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| GeotagError::ConfigError(format!("{}: {}", p.display(), e)))?;
                Config::from_toml_str(&text)?
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                let text = std::fs::read_to_string(DEFAULT_CONFIG_PATH)?;
                Config::from_toml_str(&text)?
            }
            None => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `MINING_TOKEN` / `DATA_ENDPOINT` from `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.metadata.token = token;
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            self.metadata.endpoint = endpoint;
        }
    }

    fn validate(&self) -> Result<(), GeotagError> {
        if self.batch.size == 0 {
            return Err(GeotagError::ConfigError("batch.size must be at least 1".to_string()));
        }
        if self.output.valid_log == self.output.invalid_log {
            return Err(GeotagError::ConfigError(
                "output.valid_log and output.invalid_log must be different files".to_string(),
            ));
        }
        if crate::logging::LogLevel::parse(&self.output.log_level).is_none() {
            return Err(GeotagError::ConfigError(format!(
                "unknown output.log_level '{}'",
                self.output.log_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_script_conventions() {
        let config = Config::default();
        assert_eq!(config.input.path, "data100.txt");
        assert_eq!(config.batch.size, 100);
        assert_eq!(config.probe.throttle_ms, 1000);
        assert_eq!(config.geocoder.cache_capacity, 1000);
        assert_eq!(config.output.valid_log, "valid_coordinates_log.csv");
        assert_eq!(config.output.invalid_log, "invalid_coordinates_log.csv");
    }

    #[test]
    fn test_default_land_dataset_is_the_shapefile() {
        let path = Config::default().land.path;
        assert!(path.ends_with("WB_countries_Admin0_10m.shp"), "{}", path);
        assert_eq!(
            crate::land::LandFormat::of(std::path::Path::new(&path)).unwrap(),
            crate::land::LandFormat::Shapefile
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [batch]
            size = 25

            [output]
            valid_log = "land.csv"
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.batch.size, 25);
        assert_eq!(config.batch.throttle_ms, 0);
        assert_eq!(config.output.valid_log, "land.csv");
        assert_eq!(config.output.invalid_log, "invalid_coordinates_log.csv");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = Config::from_toml_str("[batch]\nsize = 0\n");
        assert!(matches!(result, Err(GeotagError::ConfigError(_))));
    }

    #[test]
    fn test_same_log_file_for_both_outputs_rejected() {
        let result = Config::from_toml_str("[output]\nvalid_log = \"a.csv\"\ninvalid_log = \"a.csv\"\n");
        assert!(result.is_err(), "one ledger for both outcomes would break dedup routing");
    }

    #[test]
    fn test_env_overrides_credentials() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ENV_TOKEN => Some("secret".to_string()),
            ENV_ENDPOINT => Some("http://localhost:9000".to_string()),
            _ => None,
        });
        assert_eq!(config.metadata.token, "secret");
        assert_eq!(config.metadata.endpoint, "http://localhost:9000");
    }

    #[test]
    fn test_empty_env_values_fall_back() {
        let mut config = Config::default();
        config.apply_env(|_| Some("  ".to_string()));
        assert_eq!(config.metadata.endpoint, MetadataConfig::default().endpoint);
    }
}
