use std::time::Duration;

use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub password: PasswordSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub version: String,
    /// Deadline applied to every request by the timeout guard
    pub request_timeout_milliseconds: u64,
    /// Upper bound for a single datastore call outside of any request
    pub store_timeout_milliseconds: u64,
    /// Period of the expired refresh-token sweep
    pub sweep_interval_seconds: u64,
}

impl ApplicationSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_milliseconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_milliseconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT signing settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 7200 for 2 hours)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

impl JwtSettings {
    /// Startup invariant: both TTLs positive, refresh outlives access
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.issuer".to_string()));
        }
        if self.access_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be positive".to_string(),
            ));
        }
        if self.refresh_token_expiry <= self.access_token_expiry {
            return Err(ConfigError::InvalidValue(
                "jwt.refresh_token_expiry must exceed jwt.access_token_expiry".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide token bucket settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct RateLimitSettings {
    pub capacity: u32,
    pub refill_interval_milliseconds: u64,
}

impl RateLimitSettings {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_milliseconds)
    }
}

/// Password hashing and policy settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    pub hash_cost: u32,
    pub min_length: usize,
    pub require_mixed_case_and_digit: bool,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            hash_cost: bcrypt::DEFAULT_COST,
            min_length: 8,
            require_mixed_case_and_digit: true,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()?;

        if self.application.request_timeout_milliseconds == 0 {
            return Err(ConfigError::InvalidValue(
                "application.request_timeout_milliseconds must be positive".to_string(),
            ));
        }
        if self.application.store_timeout_milliseconds == 0 {
            return Err(ConfigError::InvalidValue(
                "application.store_timeout_milliseconds must be positive".to_string(),
            ));
        }
        if self.application.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "application.sweep_interval_seconds must be positive".to_string(),
            ));
        }
        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.capacity must be positive".to_string(),
            ));
        }
        if self.rate_limit.refill_interval_milliseconds == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.refill_interval_milliseconds must be positive".to_string(),
            ));
        }
        if !(4..=31).contains(&self.password.hash_cost) {
            return Err(ConfigError::InvalidValue(
                "password.hash_cost must be between 4 and 31".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `configuration.yaml` (optional) and `APP__*` environment
/// variables, then check the startup invariants.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}
