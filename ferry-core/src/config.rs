use crate::{Context, DbError, Error, Result};
use std::{env, fmt::Display, str::FromStr};
use url::Url;
use urlencoding::decode;

pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_MIN_CONNECTIONS: usize = 1;

/// Settings of one database handle: which driver, which database, how big the pool is
/// and whether statements outside transactions commit on their own.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Driver name, the scheme of the connection URL.
    pub driver: String,
    pub host: String,
    pub database: String,
    pub max_connections: usize,
    pub min_connections: usize,
    pub autocommit: bool,
    /// Remaining URL parameters, left to the driver.
    pub options: Vec<(String, String)>,
}

impl DatabaseConfig {
    pub fn new(driver: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            host: String::new(),
            database: database.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            autocommit: true,
            options: Vec::new(),
        }
    }

    pub fn max_connections(mut self, value: usize) -> Self {
        self.max_connections = value;
        self
    }

    pub fn min_connections(mut self, value: usize) -> Self {
        self.min_connections = value;
        self
    }

    pub fn autocommit(mut self, value: bool) -> Self {
        self.autocommit = value;
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parse `driver://host/database?max_connections=4&min_connections=1&autocommit=false`.
    ///
    /// Recognized parameters missing from the URL are read from `FERRY_MAX_CONNECTIONS`,
    /// `FERRY_MIN_CONNECTIONS` and `FERRY_AUTOCOMMIT`.
    pub fn from_url(url: &str) -> Result<Self> {
        let context = || format!("While decoding the connection URL `{}`", url);
        let url = Url::parse(url).with_context(context)?;
        let mut options: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut take_param = |key: &str, env_var: &str| {
            let value = options
                .iter()
                .position(|(k, _)| k == key)
                .map(|i| options.remove(i).1);
            value.or_else(|| env::var(env_var).ok())
        };
        let max_connections = take_param("max_connections", "FERRY_MAX_CONNECTIONS");
        let min_connections = take_param("min_connections", "FERRY_MIN_CONNECTIONS");
        let autocommit = take_param("autocommit", "FERRY_AUTOCOMMIT");
        let database = decode(url.path().trim_start_matches('/')).with_context(context)?;
        let mut config = Self::new(url.scheme(), database.into_owned());
        config.host = url.host_str().unwrap_or_default().to_string();
        if let Some(v) = max_connections {
            config.max_connections = parse_param("max_connections", &v)?;
        }
        if let Some(v) = min_connections {
            config.min_connections = parse_param("min_connections", &v)?;
        }
        if let Some(v) = autocommit {
            config.autocommit = parse_param("autocommit", &v)?;
        }
        config.options = options;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(DbError::Configuration(
                "max_connections must be greater than zero".into(),
            )
            .into());
        }
        if self.min_connections > self.max_connections {
            return Err(DbError::Configuration(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            ))
            .into());
        }
        Ok(())
    }
}

fn parse_param<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse::<T>().map_err(|e| {
        let error = Error::new(DbError::Configuration(format!(
            "Invalid value `{}` for `{}`: {}",
            value, key, e
        )));
        log::error!("{:#}", error);
        error
    })
}
