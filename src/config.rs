use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_DIR: &str = "pandemic-atlas";
const CONFIG_FILE: &str = "config.toml";
const API_KEY_ENV: &str = "RAPIDAPI_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub map: MapSettings,
    pub timing: TimingSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub endpoint: String,
    pub host: String,
    pub key: Option<SecretString>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            endpoint: "https://covid-19-data.p.rapidapi.com".to_string(),
            host: "covid-19-data.p.rapidapi.com".to_string(),
            key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapSettings {
    /// Tile template; `{s}` is replaced by one of `subdomains`.
    pub tile_url: String,
    pub subdomains: Vec<String>,
    pub attribution: String,
    pub default_latitude: f64,
    pub default_longitude: f64,
    pub default_zoom: f64,
    pub focus_zoom: f64,
    /// Heat circle radius in meters
    pub heat_radius: f64,
}

impl Default for MapSettings {
    fn default() -> Self {
        MapSettings {
            tile_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            attribution: "© OpenStreetMap contributors".to_string(),
            default_latitude: 48.8566,
            default_longitude: 2.3522,
            default_zoom: 3.0,
            focus_zoom: 6.0,
            heat_radius: 70000.0,
        }
    }
}

/// Delays in milliseconds. A lease is how long a finished request stays
/// registered before it is forgotten; it never cuts a pending request short.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TimingSettings {
    pub request_spacing_ms: u64,
    pub world_total_lease_ms: u64,
    pub countries_lease_ms: u64,
    pub country_detail_lease_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        TimingSettings {
            // the upstream plan rejects back-to-back requests
            request_spacing_ms: 1700,
            world_total_lease_ms: 6000,
            countries_lease_ms: 6000,
            country_detail_lease_ms: 10000,
        }
    }
}

impl TimingSettings {
    pub fn request_spacing(&self) -> Duration {
        Duration::from_millis(self.request_spacing_ms)
    }

    pub fn lease_for(&self, kind: crate::data::RequestKind) -> Duration {
        use crate::data::RequestKind;

        let ms = match kind {
            RequestKind::WorldTotal => self.world_total_lease_ms,
            RequestKind::Countries => self.countries_lease_ms,
            RequestKind::CountryDetail => self.country_detail_lease_ms,
        };
        Duration::from_millis(ms)
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads settings from the user config dir, falling back to defaults
    /// when no file exists. `RAPIDAPI_KEY` takes precedence over the file.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                log::info!("No config at {}, using defaults", path.display());
                Settings::default()
            }
            None => Settings::default(),
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                settings.api.key = Some(SecretString::new(key));
            }
        }

        if settings.api.key.is_none() {
            log::warn!("No API key configured; set {} or api.key in {}", API_KEY_ENV, CONFIG_FILE);
        }

        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RequestKind;
    use secrecy::ExposeSecret;

    #[test]
    fn empty_file_yields_defaults() {
        let settings = Settings::parse("").unwrap();

        assert_eq!(settings.api.endpoint, "https://covid-19-data.p.rapidapi.com");
        assert!(settings.api.key.is_none());
        assert_eq!(settings.map.default_zoom, 3.0);
        assert_eq!(settings.map.heat_radius, 70000.0);
        assert_eq!(settings.timing.request_spacing(), Duration::from_millis(1700));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings = Settings::parse(
            r#"
            [api]
            key = "secret-key"

            [timing]
            country_detail_lease_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(settings.api.key.as_ref().unwrap().expose_secret(), "secret-key");
        assert_eq!(settings.api.host, "covid-19-data.p.rapidapi.com");
        assert_eq!(settings.timing.lease_for(RequestKind::CountryDetail), Duration::from_millis(500));
        assert_eq!(settings.timing.lease_for(RequestKind::WorldTotal), Duration::from_millis(6000));
    }

    #[test]
    fn key_is_redacted_in_debug_output() {
        let settings = Settings::parse("[api]\nkey = \"hunter2\"").unwrap();
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Settings::parse("[map]\ndefault_zoom = \"far\"").is_err());
    }
}
