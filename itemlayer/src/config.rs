//! Store configuration and backend selection.
//!
//! The backend is chosen from the URI scheme: `memory://` selects the in-memory store,
//! `mongodb://` and `mongodb+srv://` the MongoDB store (with the `mongodb` feature).
//!
//! | variable | field |
//! |---|---|
//! | `MONGO_URI` | [`StoreConfig::uri`] |
//! | `MONGO_DATABASE` | [`StoreConfig::database`] |
//! | `ITEMLAYER_CURSOR_BATCH_SIZE` | [`StoreConfig::cursor_batch_size`] |
//! | `ITEMLAYER_CONNECT_TIMEOUT_MS` | [`StoreConfig::connect_timeout`] |
//! | `ITEMLAYER_SERVER_SELECTION_TIMEOUT_MS` | [`StoreConfig::server_selection_timeout`] |

use std::{str::FromStr, time::Duration};
use thiserror::Error;

use itemlayer_core::{
    backend::StoreBackend,
    error::{DocumentStoreError, DocumentStoreResult},
    store::DocumentStore,
};
use itemlayer_memory::InMemoryStore;

/// Store URI variable.
pub const URI_VAR: &str = "MONGO_URI";
/// Database name variable.
pub const DATABASE_VAR: &str = "MONGO_DATABASE";
/// Cursor chunk size variable.
pub const BATCH_SIZE_VAR: &str = "ITEMLAYER_CURSOR_BATCH_SIZE";
/// Connect timeout variable, in milliseconds.
pub const CONNECT_TIMEOUT_VAR: &str = "ITEMLAYER_CONNECT_TIMEOUT_MS";
/// Server selection timeout variable, in milliseconds.
pub const SERVER_SELECTION_TIMEOUT_VAR: &str = "ITEMLAYER_SERVER_SELECTION_TIMEOUT_MS";

/// URI used when none is configured.
pub const DEFAULT_URI: &str = "memory://";
/// Database used when none is configured.
pub const DEFAULT_DATABASE: &str = "itemlayer";

/// Errors raised while reading configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable holds a value that does not parse.
    #[error("invalid value {value:?} for {var}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Raw value read.
        value: String,
    },
    /// The URI scheme selects no known backend.
    #[error("unsupported store uri {0:?}")]
    UnsupportedScheme(String),
}

impl From<ConfigError> for DocumentStoreError {
    fn from(err: ConfigError) -> Self {
        DocumentStoreError::Initialization(err.to_string())
    }
}

/// Which backend a URI selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// `memory://`
    Memory,
    /// `mongodb://` or `mongodb+srv://`
    MongoDb,
}

impl BackendKind {
    /// Picks the backend for `uri` from its scheme.
    pub fn from_uri(uri: &str) -> Result<Self, ConfigError> {
        match uri.split_once("://").map(|(scheme, _)| scheme) {
            Some("memory") => Ok(BackendKind::Memory),
            Some("mongodb" | "mongodb+srv") => Ok(BackendKind::MongoDb),
            _ => Err(ConfigError::UnsupportedScheme(uri.to_string())),
        }
    }
}

/// Connection settings of the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store URI. Its scheme selects the backend.
    pub uri: String,
    /// Database holding the collections.
    pub database: String,
    /// Documents pulled per cursor round trip. `None` keeps the backend default.
    pub cursor_batch_size: Option<u32>,
    /// Timeout for establishing a connection.
    pub connect_timeout: Option<Duration>,
    /// How long an operation waits for a reachable server.
    pub server_selection_timeout: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            cursor_batch_size: None,
            connect_timeout: None,
            server_selection_timeout: None,
        }
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var, value })
        })
        .transpose()
}

impl StoreConfig {
    /// Creates a configuration with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "loaded environment file");
        }

        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            uri: lookup(URI_VAR).unwrap_or(defaults.uri),
            database: lookup(DATABASE_VAR).unwrap_or(defaults.database),
            cursor_batch_size: parse_var::<u32>(BATCH_SIZE_VAR, lookup(BATCH_SIZE_VAR))?,
            connect_timeout: parse_var::<u64>(CONNECT_TIMEOUT_VAR, lookup(CONNECT_TIMEOUT_VAR))?
                .map(Duration::from_millis),
            server_selection_timeout: parse_var::<u64>(
                SERVER_SELECTION_TIMEOUT_VAR,
                lookup(SERVER_SELECTION_TIMEOUT_VAR),
            )?
            .map(Duration::from_millis),
        };

        if config.cursor_batch_size == Some(0) {
            return Err(ConfigError::InvalidValue { var: BATCH_SIZE_VAR, value: "0".to_string() });
        }

        BackendKind::from_uri(&config.uri)?;

        Ok(config)
    }

    /// Sets the store URI.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Sets the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the cursor chunk size.
    pub fn with_cursor_batch_size(mut self, batch_size: u32) -> Self {
        self.cursor_batch_size = Some(batch_size);
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the server selection timeout.
    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }

    /// The backend selected by the URI.
    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        BackendKind::from_uri(&self.uri)
    }
}

/// Opens the store described by `config` and checks that it is reachable.
///
/// The returned handle is meant to be created once at startup and passed to every
/// component that needs it.
pub async fn connect(config: &StoreConfig) -> DocumentStoreResult<DocumentStore<dyn StoreBackend>> {
    let kind = config.backend_kind()?;

    tracing::info!(?kind, database = %config.database, "connecting document store");

    match kind {
        BackendKind::Memory => {
            let mut builder = InMemoryStore::builder();
            if let Some(batch_size) = config.cursor_batch_size {
                builder = builder.batch_size(batch_size);
            }

            Ok(DocumentStore::open(builder).await?.into_dyn())
        }
        BackendKind::MongoDb => connect_mongodb(config).await,
    }
}

#[cfg(feature = "mongodb")]
async fn connect_mongodb(config: &StoreConfig) -> DocumentStoreResult<DocumentStore<dyn StoreBackend>> {
    let mut builder = itemlayer_mongodb::MongoDbStore::builder(&config.uri, &config.database);

    if let Some(batch_size) = config.cursor_batch_size {
        builder = builder.batch_size(batch_size);
    }
    if let Some(timeout) = config.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = config.server_selection_timeout {
        builder = builder.server_selection_timeout(timeout);
    }

    Ok(DocumentStore::open(builder).await?.into_dyn())
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongodb(_config: &StoreConfig) -> DocumentStoreResult<DocumentStore<dyn StoreBackend>> {
    Err(DocumentStoreError::Initialization(
        "mongodb support requires the `mongodb` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();

        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_select_the_memory_backend() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.backend_kind().unwrap(), BackendKind::Memory);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[
            (URI_VAR, "mongodb+srv://cluster.example.net"),
            (DATABASE_VAR, "shop"),
            (BATCH_SIZE_VAR, "25"),
            (SERVER_SELECTION_TIMEOUT_VAR, "1500"),
        ]))
        .unwrap();

        assert_eq!(config.backend_kind().unwrap(), BackendKind::MongoDb);
        assert_eq!(config.database, "shop");
        assert_eq!(config.cursor_batch_size, Some(25));
        assert_eq!(config.server_selection_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[(BATCH_SIZE_VAR, "many")])),
            Err(ConfigError::InvalidValue { var: BATCH_SIZE_VAR, value: "many".into() })
        );
        assert!(StoreConfig::from_lookup(lookup(&[(BATCH_SIZE_VAR, "0")])).is_err());
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[(URI_VAR, "postgres://db")])),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn connect_opens_a_memory_store() {
        let store = connect(&StoreConfig::new().with_cursor_batch_size(3)).await.unwrap();

        store.ping().await.unwrap();
        store.shutdown().await.unwrap();
    }
}
