//! Provider registry keys and the credentials/budget file.
//!
//! The file is a JSON document with one distinguished TravelTime entry and a
//! list of other providers identified by name:
//! ```json
//! {
//!   "traveltime": { "app-id": "...", "api-key": "...", "max-rpm": "60" },
//!   "api-providers": [
//!     { "name": "google", "enabled": true, "api-key": "...", "max-rpm": 60 },
//!     { "name": "osrm", "enabled": true, "api-endpoint": "http://localhost:5000" }
//!   ]
//! }
//! ```
//! Secrets missing from the file are looked up through a caller-supplied
//! function (normally the process environment after `.env` is loaded).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Every routing provider the tool knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    TravelTime,
    Google,
    TomTom,
    Here,
    Mapbox,
    OpenRoutes,
    Osrm,
    Valhalla,
}

impl ProviderId {
    pub const ALL: [ProviderId; 8] = [
        Self::TravelTime,
        Self::Google,
        Self::TomTom,
        Self::Here,
        Self::Mapbox,
        Self::OpenRoutes,
        Self::Osrm,
        Self::Valhalla,
    ];

    /// Identifier used in the config file and in column names.
    pub fn name(self) -> &'static str {
        match self {
            Self::TravelTime => "traveltime",
            Self::Google => "google",
            Self::TomTom => "tomtom",
            Self::Here => "here",
            Self::Mapbox => "mapbox",
            Self::OpenRoutes => "openroutes",
            Self::Osrm => "osrm",
            Self::Valhalla => "valhalla",
        }
    }

    /// Human-facing name for logs and tables.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::TravelTime => "TravelTime",
            Self::Google => "Google",
            Self::TomTom => "TomTom",
            Self::Here => "HERE",
            Self::Mapbox => "Mapbox",
            Self::OpenRoutes => "OpenRoutes",
            Self::Osrm => "OSRM",
            Self::Valhalla => "Valhalla",
        }
    }

    /// Output column holding this provider's travel time in seconds.
    pub fn travel_time_column(self) -> String {
        format!("{}_travel_time", self.name())
    }

    /// Environment variable consulted when the file omits the API key.
    fn api_key_var(self) -> Option<&'static str> {
        match self {
            Self::TravelTime => Some("TRAVELTIME_API_KEY"),
            Self::Google => Some("GOOGLE_API_KEY"),
            Self::TomTom => Some("TOMTOM_API_KEY"),
            Self::Here => Some("HERE_API_KEY"),
            Self::Mapbox => Some("MAPBOX_API_KEY"),
            Self::OpenRoutes => Some("OPENROUTES_API_KEY"),
            Self::Osrm | Self::Valhalla => None,
        }
    }

    fn requires_api_key(self) -> bool {
        self.api_key_var().is_some()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

/// Secrets for one provider. `Debug` never prints the values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: Option<String>,
    pub api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Fully resolved settings for one enabled provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub id: ProviderId,
    /// `None` means the provider has no budget and is never throttled.
    pub max_rpm: Option<u32>,
    pub credentials: Credentials,
    pub api_endpoint: Option<String>,
}

/// The active provider set, TravelTime first when enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidersConfig {
    pub providers: Vec<ProviderConfig>,
}

#[derive(Deserialize)]
struct RawConfig {
    traveltime: RawProvider,
    #[serde(rename = "api-providers", default)]
    api_providers: Vec<RawProvider>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawProvider {
    name: Option<String>,
    enabled: Option<bool>,
    app_id: Option<String>,
    api_key: Option<String>,
    max_rpm: Option<RawRpm>,
    api_endpoint: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRpm {
    Number(i64),
    Text(String),
}

impl ProvidersConfig {
    /// Reads and validates the config file at `path`.
    pub fn load(
        path: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&content, env)
    }

    /// Parses and validates a config document. Disabled providers are dropped.
    pub fn parse(json: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;

        let mut providers = Vec::new();
        if raw.traveltime.enabled.unwrap_or(true) {
            providers.push(resolve(ProviderId::TravelTime, raw.traveltime, &env)?);
        }

        for entry in raw.api_providers {
            let name = entry.name.clone().ok_or_else(|| {
                ConfigError::UnknownProvider("<missing name>".to_string())
            })?;
            let id: ProviderId = name.parse()?;
            if id == ProviderId::TravelTime {
                return Err(ConfigError::DuplicateProvider(name));
            }
            if !entry.enabled.unwrap_or(false) {
                continue;
            }
            if providers.iter().any(|p: &ProviderConfig| p.id == id) {
                return Err(ConfigError::DuplicateProvider(name));
            }
            providers.push(resolve(id, entry, &env)?);
        }

        Ok(Self { providers })
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id).collect()
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }
}

fn resolve(
    id: ProviderId,
    raw: RawProvider,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<ProviderConfig, ConfigError> {
    let max_rpm = raw.max_rpm.map(|rpm| parse_rpm(id, rpm)).transpose()?;

    let api_key = non_empty(raw.api_key).or_else(|| id.api_key_var().and_then(env));
    if id.requires_api_key() && api_key.is_none() {
        return Err(ConfigError::MissingCredential {
            provider: id.name().to_string(),
            field: "api-key",
        });
    }

    let app_id = if id == ProviderId::TravelTime {
        let app_id = non_empty(raw.app_id).or_else(|| env("TRAVELTIME_APP_ID"));
        if app_id.is_none() {
            return Err(ConfigError::MissingCredential {
                provider: id.name().to_string(),
                field: "app-id",
            });
        }
        app_id
    } else {
        None
    };

    Ok(ProviderConfig {
        id,
        max_rpm,
        credentials: Credentials { app_id, api_key },
        api_endpoint: non_empty(raw.api_endpoint),
    })
}

fn parse_rpm(id: ProviderId, raw: RawRpm) -> Result<u32, ConfigError> {
    let invalid = |value: String| ConfigError::InvalidBudget {
        provider: id.name().to_string(),
        value,
    };
    let value = match raw {
        RawRpm::Number(n) => u32::try_from(n).map_err(|_| invalid(n.to_string()))?,
        RawRpm::Text(text) => text.trim().parse::<u32>().map_err(|_| invalid(text))?,
    };
    if value == 0 {
        return Err(invalid("0".to_string()));
    }
    Ok(value)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
