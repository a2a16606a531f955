use std::env;
use std::time::Duration;

use crate::error::{invalid_input_error, Error};
use crate::session::{ArrivalPolicy, DEFAULT_ARRIVAL_RADIUS_M};

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub backend_url: String,
    pub api_prefix: String,
    pub routing_url: String,
    pub routing_api_key: Option<String>,
    pub routing_profile: String,
    pub request_timeout: Duration,
    pub arrival_radius_m: f64,
    /// Run against the in-memory backend instead of the HTTP one.
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080".into(),
            api_prefix: "api".into(),
            routing_url: "https://api.openrouteservice.org".into(),
            routing_api_key: None,
            routing_profile: "cycling-regular".into(),
            request_timeout: Duration::from_secs(10),
            arrival_radius_m: DEFAULT_ARRIVAL_RADIUS_M,
            offline: false,
        }
    }
}

impl Config {
    /// Reads `SCOOTIO_*` variables, after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let defaults = Self::default();
        let var = |key: &str| -> Result<Option<String>, Error> {
            match lookup(key) {
                Ok(value) if value.trim().is_empty() => Ok(None),
                Ok(value) => Ok(Some(value.trim().to_string())),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err.into()),
            }
        };

        let request_timeout = match var("SCOOTIO_REQUEST_TIMEOUT_SECS")? {
            Some(secs) => Duration::from_secs(secs.parse().map_err(|_| invalid_input_error())?),
            None => defaults.request_timeout,
        };

        let arrival_radius_m = match var("SCOOTIO_ARRIVAL_RADIUS_METERS")? {
            Some(meters) => meters.parse().map_err(|_| invalid_input_error())?,
            None => defaults.arrival_radius_m,
        };

        let offline = match var("SCOOTIO_OFFLINE")? {
            Some(flag) => matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            None => defaults.offline,
        };

        let config = Self {
            backend_url: var("SCOOTIO_BACKEND_URL")?.unwrap_or(defaults.backend_url),
            api_prefix: var("SCOOTIO_API_PREFIX")?.unwrap_or(defaults.api_prefix),
            routing_url: var("SCOOTIO_ROUTING_URL")?.unwrap_or(defaults.routing_url),
            routing_api_key: var("SCOOTIO_ROUTING_API_KEY")?,
            routing_profile: var("SCOOTIO_ROUTING_PROFILE")?.unwrap_or(defaults.routing_profile),
            request_timeout,
            arrival_radius_m,
            offline,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let http = |url: &str| url.starts_with("http://") || url.starts_with("https://");

        if !http(&self.backend_url) || !http(&self.routing_url) {
            tracing::warn!("backend and routing urls need an http(s) scheme");
            return Err(invalid_input_error());
        }

        if self.request_timeout.is_zero() {
            return Err(invalid_input_error());
        }

        if !self.arrival_radius_m.is_finite() || self.arrival_radius_m < 0.0 {
            return Err(invalid_input_error());
        }

        Ok(())
    }

    pub fn arrival_policy(&self) -> ArrivalPolicy {
        ArrivalPolicy::from_radius(self.arrival_radius_m)
    }

    /// `{backend_url}/{api_prefix}/{resource}` without doubled slashes.
    pub fn resource_url(&self, resource: &str) -> String {
        let base = self.backend_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');

        match prefix.is_empty() {
            true => format!("{}/{}", base, resource),
            false => format!("{}/{}/{}", base, prefix, resource),
        }
    }
}

#[test]
fn defaults_test() {
    let config = Config::from_lookup(|_| Err(env::VarError::NotPresent)).unwrap();

    assert_eq!(config, Config::default());
    assert_eq!(config.arrival_policy(), ArrivalPolicy::Within(10.0));
    assert_eq!(
        config.resource_url("markers"),
        "http://localhost:8080/api/markers"
    );
}

#[test]
fn lookup_test() {
    let config = Config::from_lookup(|key| match key {
        "SCOOTIO_BACKEND_URL" => Ok("https://scootio.example/".into()),
        "SCOOTIO_API_PREFIX" => Ok("/v2/".into()),
        "SCOOTIO_ARRIVAL_RADIUS_METERS" => Ok("0".into()),
        "SCOOTIO_REQUEST_TIMEOUT_SECS" => Ok("3".into()),
        "SCOOTIO_ROUTING_API_KEY" => Ok("secret".into()),
        "SCOOTIO_OFFLINE" => Ok("true".into()),
        _ => Err(env::VarError::NotPresent),
    })
    .unwrap();

    assert_eq!(config.resource_url("rides"), "https://scootio.example/v2/rides");
    assert_eq!(config.arrival_policy(), ArrivalPolicy::Exact);
    assert_eq!(config.request_timeout, Duration::from_secs(3));
    assert_eq!(config.routing_api_key.as_deref(), Some("secret"));
    assert!(config.offline);
}

#[test]
fn validate_test() {
    let bad_radius = Config::from_lookup(|key| match key {
        "SCOOTIO_ARRIVAL_RADIUS_METERS" => Ok("-5".into()),
        _ => Err(env::VarError::NotPresent),
    });
    assert!(bad_radius.unwrap_err().is_invalid_input_error());

    let bad_timeout = Config::from_lookup(|key| match key {
        "SCOOTIO_REQUEST_TIMEOUT_SECS" => Ok("soon".into()),
        _ => Err(env::VarError::NotPresent),
    });
    assert!(bad_timeout.is_err());

    let no_scheme = Config {
        backend_url: "localhost:8080".into(),
        ..Config::default()
    };
    assert!(no_scheme.validate().is_err());
}
