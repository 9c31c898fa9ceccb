//! Connection string parsing
//!
//! A DSN has the form `<driver>:<key>=<value>;<key>=<value>;...`, for example
//! `mysql:host=localhost;port=3306;dbname=shop`. Parsing is pure: no network
//! access happens here and the driver token is not checked against the set of
//! supported drivers (that is the connection manager's job).

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Typed connection parameters parsed from a DSN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    /// Lower-cased driver token (`mysql`, `pgsql`, `sqlite`, ...)
    pub driver: String,

    /// Host name or Unix socket path
    pub endpoint: Endpoint,

    /// TCP port, when given
    pub port: Option<u16>,

    /// Database name (the file path for SQLite)
    pub database: String,

    /// User name, when given
    pub username: Option<String>,

    /// Password, when given
    pub password: Option<String>,

    /// Client character set requested in the DSN
    pub charset: Option<String>,

    /// Keys the parser does not interpret
    pub extra: BTreeMap<String, String>,
}

/// Where the database server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Host(String),
    Socket(String),
}

impl Endpoint {
    /// Host name or socket path as written in the DSN
    pub fn as_str(&self) -> &str {
        match self {
            Endpoint::Host(host) => host,
            Endpoint::Socket(path) => path,
        }
    }
}

impl ConnectionSpec {
    /// Parse a DSN string
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the string is empty, has no `:`
    /// separator, has an empty driver token, a malformed segment or port, or
    /// lacks both `host` and `unix_socket`, or lacks `dbname`.
    pub fn parse(dsn: &str) -> Result<Self> {
        let dsn = dsn.trim();
        if dsn.is_empty() {
            return Err(Error::Config("empty DSN string".to_string()));
        }

        let (driver, parameters) = dsn
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("DSN has no driver prefix: {}", redact(dsn))))?;

        let driver = driver.trim().to_lowercase();
        if driver.is_empty() {
            return Err(Error::Config("DSN has an empty driver token".to_string()));
        }

        let mut pairs = BTreeMap::new();
        for segment in parameters.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                Error::Config(format!("malformed DSN segment '{}', expected key=value", segment))
            })?;
            pairs.insert(key.trim().to_lowercase(), value.trim().to_string());
        }

        let mut take = |key: &str| pairs.remove(key).filter(|value| !value.is_empty());

        let endpoint = match (take("host"), take("unix_socket")) {
            (Some(host), _) => Endpoint::Host(host),
            (None, Some(socket)) => Endpoint::Socket(socket),
            (None, None) => {
                return Err(Error::Config("missing host from DSN string".to_string()));
            }
        };

        let database = take("dbname")
            .ok_or_else(|| Error::Config("missing database name from DSN string".to_string()))?;

        let port = match take("port") {
            Some(port) => Some(
                port.parse::<u16>()
                    .map_err(|_| Error::Config(format!("invalid port in DSN: '{}'", port)))?,
            ),
            None => None,
        };

        let username = take("user");
        let password = take("password");
        let charset = take("charset");

        Ok(Self {
            driver,
            endpoint,
            port,
            database,
            username,
            password,
            charset,
            extra: pairs,
        })
    }

    /// Return a copy with explicit credentials applied over the DSN ones
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        if username.is_some() {
            self.username = username;
        }
        if password.is_some() {
            self.password = password;
        }
        self
    }

    /// Host name (or socket path) for the dump banner
    pub fn host(&self) -> &str {
        self.endpoint.as_str()
    }
}

impl fmt::Display for ConnectionSpec {
    /// Formats the spec for logs; the password is never included
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.driver)?;
        if let Some(username) = &self.username {
            write!(f, "{}@", username)?;
        }
        match &self.endpoint {
            Endpoint::Host(host) => write!(f, "{}", host)?,
            Endpoint::Socket(path) => write!(f, "unix:{}", path)?,
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "/{}", self.database)
    }
}

/// Strip an inline password from a DSN before echoing it back in an error
fn redact(dsn: &str) -> String {
    dsn.split(';')
        .map(|segment| match segment.split_once('=') {
            Some((key, _)) if key.trim().eq_ignore_ascii_case("password") => {
                format!("{}=***", key)
            }
            _ => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
