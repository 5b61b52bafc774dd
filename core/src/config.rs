//! Connection settings for the fleet API client.
//!
//! # Design
//! The recognized options form a closed set (`Setting`) backed by a typed
//! record (`Configuration`). Name-based access (`get`/`set`) exists for
//! callers that carry options as loose JSON, and rejects unknown names with
//! `FleetError::UnknownOption`.
//!
//! A process-wide instance starts out as `Configuration::defaults()`. Each
//! `Client` takes a snapshot of it at construction, so later changes to the
//! process-wide values never reach clients that already exist. Mutation of
//! the process-wide instance is guarded by a lock but not ordered: callers
//! that `configure` and `reset` from several threads serialize themselves.

use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FleetError, FleetResult};
use crate::http::Options;

/// Endpoint used when `FLEETCTL_ENDPOINT` is not set.
pub const DEFAULT_FLEET_API_URL: &str = "http://127.0.0.1:49153";

/// Environment variable that overrides the default endpoint.
pub const FLEET_ENDPOINT_ENV: &str = "FLEETCTL_ENDPOINT";

pub const DEFAULT_OPEN_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

/// A recognized configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    FleetApiUrl,
    OpenTimeout,
    ReadTimeout,
    SslOptions,
    Proxy,
}

impl Setting {
    pub const ALL: [Setting; 5] = [
        Setting::FleetApiUrl,
        Setting::OpenTimeout,
        Setting::ReadTimeout,
        Setting::SslOptions,
        Setting::Proxy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Setting::FleetApiUrl => "fleet_api_url",
            Setting::OpenTimeout => "open_timeout",
            Setting::ReadTimeout => "read_timeout",
            Setting::SslOptions => "ssl_options",
            Setting::Proxy => "proxy",
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Setting {
    type Err = FleetError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Setting::ALL
            .into_iter()
            .find(|setting| setting.as_str() == name)
            .ok_or_else(|| FleetError::UnknownOption(name.to_string()))
    }
}

/// TLS settings handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslOptions {
    pub verify: bool,
}

impl Default for SslOptions {
    fn default() -> Self {
        Self { verify: false }
    }
}

/// Resolved connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub fleet_api_url: String,
    /// Connect timeout in seconds.
    pub open_timeout: u64,
    /// Response timeout in seconds.
    pub read_timeout: u64,
    pub ssl_options: SslOptions,
    pub proxy: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Configuration {
    /// The built-in defaults. The endpoint comes from `FLEETCTL_ENDPOINT`
    /// when it is set and non-empty.
    pub fn defaults() -> Self {
        Self {
            fleet_api_url: endpoint_or_default(std::env::var(FLEET_ENDPOINT_ENV).ok()),
            open_timeout: DEFAULT_OPEN_TIMEOUT_SECS,
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            ssl_options: SslOptions::default(),
            proxy: None,
        }
    }

    pub fn open_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.open_timeout)
    }

    pub fn read_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    /// Read an option by name.
    pub fn get(&self, name: &str) -> FleetResult<Value> {
        Ok(self.value(name.parse()?))
    }

    /// Write an option by name. The configuration is unchanged on error.
    pub fn set(&mut self, name: &str, value: Value) -> FleetResult<()> {
        self.set_value(name.parse()?, value)
    }

    /// Read an option as JSON.
    pub fn value(&self, setting: Setting) -> Value {
        match setting {
            Setting::FleetApiUrl => Value::String(self.fleet_api_url.clone()),
            Setting::OpenTimeout => Value::from(self.open_timeout),
            Setting::ReadTimeout => Value::from(self.read_timeout),
            Setting::SslOptions => serde_json::json!({ "verify": self.ssl_options.verify }),
            Setting::Proxy => self.proxy.clone().map(Value::String).unwrap_or(Value::Null),
        }
    }

    /// Write an option from JSON, checking its shape.
    pub fn set_value(&mut self, setting: Setting, value: Value) -> FleetResult<()> {
        let invalid = |expected| FleetError::InvalidValue {
            option: setting.as_str(),
            expected,
        };
        match setting {
            Setting::FleetApiUrl => match value {
                Value::String(url) => self.fleet_api_url = url,
                _ => return Err(invalid("a string")),
            },
            Setting::OpenTimeout => {
                self.open_timeout = value.as_u64().ok_or_else(|| invalid("a non-negative integer"))?
            }
            Setting::ReadTimeout => {
                self.read_timeout = value.as_u64().ok_or_else(|| invalid("a non-negative integer"))?
            }
            Setting::SslOptions => {
                self.ssl_options = serde_json::from_value(value)
                    .map_err(|_| invalid("an object like {\"verify\": bool}"))?
            }
            Setting::Proxy => match value {
                Value::Null => self.proxy = None,
                Value::String(proxy) => self.proxy = Some(proxy),
                _ => return Err(invalid("a string or null")),
            },
        }
        Ok(())
    }

    /// Copy of `self` with every recognized key in `overrides` applied.
    /// Unrecognized keys are skipped.
    pub fn merged(&self, overrides: &Options) -> FleetResult<Self> {
        let mut config = self.clone();
        for (name, value) in overrides {
            match name.parse::<Setting>() {
                Ok(setting) => config.set_value(setting, value.clone())?,
                Err(_) => tracing::warn!(option = %name, "ignoring unrecognized client option"),
            }
        }
        Ok(config)
    }
}

fn endpoint_or_default(endpoint: Option<String>) -> String {
    endpoint
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_FLEET_API_URL.to_string())
}

// ---------------------------------------------------------------------------
// Process-wide configuration
// ---------------------------------------------------------------------------

lazy_static::lazy_static! {
    static ref GLOBAL: RwLock<Configuration> = RwLock::new(Configuration::defaults());
}

// A panic while a guard is held leaves the lock poisoned; the
// configuration itself is still a valid value, so keep serving it.
fn read_global() -> RwLockReadGuard<'static, Configuration> {
    GLOBAL.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_global() -> RwLockWriteGuard<'static, Configuration> {
    GLOBAL.write().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot of the process-wide configuration.
pub fn current() -> Configuration {
    read_global().clone()
}

/// Read a process-wide option by name.
pub fn get(name: &str) -> FleetResult<Value> {
    read_global().get(name)
}

/// Write a process-wide option by name.
pub fn set(name: &str, value: Value) -> FleetResult<()> {
    write_global().set(name, value)
}

/// Restore the process-wide configuration to `Configuration::defaults()`.
pub fn reset() {
    *write_global() = Configuration::defaults();
    tracing::info!("process-wide fleet configuration reset to defaults");
}

/// Hand a copy of the process-wide configuration to `f` for bulk changes,
/// then store it back.
///
/// No lock is held while `f` runs, so it may call `current`, `reset` or
/// construct clients. Changes `f` makes through those free functions are
/// overwritten by the copy when it returns.
///
/// Always returns `true`; nothing checks whether `f` changed anything. A
/// panic in `f` propagates to the caller and stores nothing.
pub fn configure<F>(f: F) -> bool
where
    F: FnOnce(&mut Configuration),
{
    let mut config = current();
    f(&mut config);
    *write_global() = config;
    true
}

/// Like `configure`, for callbacks that can fail. The callback's error is
/// returned unchanged; changes it made before failing are kept.
pub fn try_configure<F, E>(f: F) -> Result<bool, E>
where
    F: FnOnce(&mut Configuration) -> Result<(), E>,
{
    let mut config = current();
    let outcome = f(&mut config);
    *write_global() = config;
    outcome.map(|()| true)
}
