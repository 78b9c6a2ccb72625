//! Connection settings.
//!
//! Settings are given explicitly through the builder methods or resolved from a
//! named profile in the environment (after loading `.env`):
//!
//! ```text
//! APP_DB_HOST=localhost
//! APP_DB_USERNAME=postgres
//! APP_DB_PASSWORD=secret
//! APP_DB_DATABASE=app
//! APP_DB_PORT=5432
//! APP_DB_SOCKET=/var/run/postgresql
//! ```
//!
//! Missing required fields fail with [`DbError::Config`] before any connection
//! is attempted.

use crate::error::{DbError, DbResult};
use tokio_postgres::{Client, NoTls};
use tracing::error;

/// Connection settings for one database handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server host name or address.
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Server port (defaults to 5432 when unset).
    pub port: Option<u16>,
    /// Unix socket directory; takes precedence over `host`.
    pub socket: Option<String>,
}

impl ConnectionConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Resolve a named profile from the process environment.
    ///
    /// `.env` in the working directory (or a parent) is loaded first; a missing
    /// file is not an error.
    pub fn from_profile(profile: &str) -> DbResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(profile, |key| std::env::var(key).ok())
    }

    /// Resolve a named profile through an arbitrary key lookup.
    pub fn from_lookup<F>(profile: &str, lookup: F) -> DbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = profile.to_ascii_uppercase();
        let get = |field: &str| {
            lookup(&format!("{prefix}_DB_{field}")).filter(|v| !v.trim().is_empty())
        };

        let port = match get("PORT") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                DbError::Config(format!("{prefix}_DB_PORT is not a valid port ({raw:?}): {e}"))
            })?),
            None => None,
        };

        let config = Self {
            host: get("HOST"),
            username: get("USERNAME"),
            password: get("PASSWORD"),
            database: get("DATABASE"),
            port,
            socket: get("SOCKET"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every required field is present.
    pub fn validate(&self) -> DbResult<()> {
        let mut missing = Vec::new();
        if self.host.is_none() && self.socket.is_none() {
            missing.push("host or socket");
        }
        if self.username.is_none() {
            missing.push("username");
        }
        if self.database.is_none() {
            missing.push("database");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DbError::Config(format!(
                "missing required connection settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Convert into a driver configuration.
    pub fn to_pg_config(&self) -> DbResult<tokio_postgres::Config> {
        self.validate()?;
        // A socket directory is passed through `host`; the driver detects the leading '/'.
        let host = self
            .socket
            .as_deref()
            .or(self.host.as_deref())
            .ok_or_else(|| DbError::Config("missing host or socket".into()))?;
        let mut pg = tokio_postgres::Config::new();
        pg.host(host);
        if let Some(user) = &self.username {
            pg.user(user);
        }
        if let Some(password) = &self.password {
            pg.password(password);
        }
        if let Some(db) = &self.database {
            pg.dbname(db);
        }
        pg.port(self.port.unwrap_or(5432));
        Ok(pg)
    }

    /// Open one connection and spawn its driver task on the current runtime.
    pub async fn connect(&self) -> DbResult<Client> {
        let pg = self.to_pg_config()?;
        connect_with(&pg).await
    }
}

/// Connect with a driver configuration and spawn the connection task.
pub(crate) async fn connect_with(pg: &tokio_postgres::Config) -> DbResult<Client> {
    let (client, connection) = pg
        .connect(NoTls)
        .await
        .map_err(|e| DbError::Connection(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(target: "pgfluent.sql", error = %e, "connection task failed");
        }
    });
    Ok(client)
}

/// Connect from a `postgres://` URL or key/value connection string.
pub(crate) async fn connect_url(url: &str) -> DbResult<Client> {
    let pg: tokio_postgres::Config = url
        .parse()
        .map_err(|e: tokio_postgres::Error| DbError::Config(e.to_string()))?;
    connect_with(&pg).await
}
