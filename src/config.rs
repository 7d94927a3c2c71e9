//! Application configuration
//!
//! Loaded from a TOML file, by default `~/.config/texnouz-evse/config.toml`.
//! Every section is optional; missing values fall back to the defaults below.
//! The `[[pools]]` tables double as the static topology of the service.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::charging::EngineSettings;
use crate::domain::ports::{PoolDescriptor, StationDescriptor, TopologyProvider};
use crate::domain::reservation::default_reservation_duration;
use crate::domain::{
    AdminStatus, DomainError, EvseId, Identification, PoolId, ProviderId, StationId,
    TokenAuthStatus,
};
use crate::support::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reservations: ReservationConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub requests: RequestConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Seed entries for the authorization database
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error; `RUST_LOG` takes precedence
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Longest configurable default reservation: 30 days
pub const MAX_RESERVATION_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    pub default_duration_secs: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub period_secs: u64,
    /// How long a sweep waits for one EVSE before moving on
    pub per_evse_timeout_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            period_secs: 3,
            per_evse_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub default_timeout_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Messages a subscriber may fall behind before it starts losing them
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Address of the Prometheus scrape endpoint, e.g. "0.0.0.0:9100"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub id: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: "DE-TNZ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationKind {
    #[default]
    AuthToken,
    Remote,
    Pin,
}

impl IdentificationKind {
    fn build(self, value: &str) -> Result<Identification, DomainError> {
        match self {
            Self::AuthToken => Identification::auth_token(value),
            Self::Remote => Identification::remote(value),
            Self::Pin => Identification::pin(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub id: String,
    #[serde(default)]
    pub kind: IdentificationKind,
    /// Authorized, NotAuthorized or Blocked
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub id: String,
    #[serde(default)]
    pub admin_status: AdminStatus,
    #[serde(default)]
    pub stations: Vec<StationConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: String,
    #[serde(default)]
    pub admin_status: AdminStatus,
    #[serde(default)]
    pub evses: Vec<String>,
    #[serde(default)]
    pub whitelist_enabled: bool,
    /// Auth tokens on the station's default whitelist
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the configuration, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Check numeric settings and that every id in the topology and token
    /// seed is well-formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_RESERVATION_SECS).contains(&self.reservations.default_duration_secs) {
            return Err(ConfigError::Invalid(format!(
                "reservations.default_duration_secs must be between 1 and {}",
                MAX_RESERVATION_SECS
            )));
        }
        if self.sweeper.period_secs == 0 {
            return Err(ConfigError::Invalid("sweeper.period_secs must be positive".into()));
        }
        if self.events.capacity == 0 {
            return Err(ConfigError::Invalid("events.capacity must be positive".into()));
        }
        self.provider_id()?;
        self.token_seed()?;
        self.topology()?;
        Ok(())
    }

    pub fn provider_id(&self) -> Result<ProviderId, ConfigError> {
        ProviderId::new(&self.provider.id).map_err(invalid)
    }

    pub fn token_seed(&self) -> Result<Vec<(Identification, TokenAuthStatus)>, ConfigError> {
        self.tokens
            .iter()
            .map(|token| {
                let identification = token.kind.build(&token.id).map_err(invalid)?;
                let status = token.status.parse::<TokenAuthStatus>().map_err(invalid)?;
                Ok((identification, status))
            })
            .collect()
    }

    pub fn topology(&self) -> Result<Vec<PoolDescriptor>, ConfigError> {
        self.pools
            .iter()
            .map(|pool| {
                let stations = pool
                    .stations
                    .iter()
                    .map(|station| {
                        Ok(StationDescriptor {
                            id: StationId::new(&station.id).map_err(invalid)?,
                            admin_status: station.admin_status,
                            evses: station
                                .evses
                                .iter()
                                .map(|id| EvseId::new(id).map_err(invalid))
                                .collect::<Result<_, _>>()?,
                            whitelist_enabled: station.whitelist_enabled,
                            whitelist: station
                                .whitelist
                                .iter()
                                .map(|token| Identification::auth_token(token).map_err(invalid))
                                .collect::<Result<_, _>>()?,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Ok(PoolDescriptor {
                    id: PoolId::new(&pool.id).map_err(invalid)?,
                    admin_status: pool.admin_status,
                    stations,
                })
            })
            .collect()
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_reservation_duration: i64::try_from(self.reservations.default_duration_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or_else(default_reservation_duration),
        }
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweeper.period_secs)
    }

    pub fn per_evse_timeout(&self) -> Duration {
        Duration::from_millis(self.sweeper.per_evse_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.requests.default_timeout_secs)
    }
}

fn invalid(e: DomainError) -> ConfigError {
    ConfigError::Invalid(e.to_string())
}

#[async_trait]
impl TopologyProvider for AppConfig {
    async fn pools(&self) -> Result<Vec<PoolDescriptor>, DomainError> {
        self.topology()
            .map_err(|e| DomainError::Validation(e.to_string()))
    }
}

/// `~/.config/texnouz-evse/config.toml`, or `./texnouz-evse/config.toml` when
/// the platform has no config directory.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("texnouz-evse")
        .join("config.toml")
}
