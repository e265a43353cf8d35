//! Configuration management for the server.

use resync_engine::{KeyPath, TableSchema};
use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Pool size
    pub max_connections: u32,
    /// Tables served, from `RESYNC_TABLES`
    pub tables: Vec<TableSchema>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidMaxConnections)?;

        let tables = match lookup("RESYNC_TABLES") {
            Some(declarations) => parse_tables(&declarations)?,
            None => Vec::new(),
        };

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            tables,
        })
    }
}

/// Parse comma-separated table declarations.
///
/// Each declaration is `name=keypath`. A `++` before the key path marks the
/// key as auto-incremented, and `[a+b]` declares a compound key:
/// `books=++id,authors=email,loans=[book_id+member_id]`.
pub fn parse_tables(declarations: &str) -> Result<Vec<TableSchema>, ConfigError> {
    let mut tables: Vec<TableSchema> = Vec::new();

    for declaration in declarations.split(',').map(str::trim) {
        if declaration.is_empty() {
            continue;
        }
        let invalid = || ConfigError::InvalidTable(declaration.to_string());

        let (name, key_path) = declaration.split_once('=').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }

        let key_path = key_path.trim();
        let (key_path, auto_increment) = match key_path.strip_prefix("++") {
            Some(rest) => (rest, true),
            None => (key_path, false),
        };
        let key_path: KeyPath = key_path.parse().map_err(|_| invalid())?;

        if tables.iter().any(|t| t.name == name) {
            return Err(ConfigError::DuplicateTable(name.to_string()));
        }

        let mut schema = TableSchema::new(name, key_path);
        if auto_increment {
            schema = schema.auto_increment();
        }
        tables.push(schema);
    }

    Ok(tables)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid DATABASE_MAX_CONNECTIONS value")]
    InvalidMaxConnections,

    #[error("Invalid table declaration '{0}', expected name=keypath")]
    InvalidTable(String),

    #[error("Table '{0}' is declared twice")]
    DuplicateTable(String),
}
