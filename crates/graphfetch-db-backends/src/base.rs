//! Connection configuration for database backends.

use std::collections::HashMap;

/// Configuration for connecting to a PostgreSQL-compatible database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// The database name.
    pub name: String,
    /// The database host.
    pub host: String,
    /// The database port.
    pub port: u16,
    /// The database user.
    pub user: String,
    /// The database password.
    pub password: String,
    /// Additional connection options.
    pub options: HashMap<String, String>,
}

impl DatabaseConfig {
    /// Creates a configuration for a PostgreSQL database.
    pub fn postgres(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            options: HashMap::new(),
        }
    }
}
