//! Process-wide settings for the graphfetch pipeline.
//!
//! Settings are read once at startup, typically from environment variables,
//! and then passed by reference into the components that need them. The
//! `debug` flag is the development-mode switch that tightens id validation
//! and turns over-long generated function names into hard errors.

/// Runtime settings for the fetch pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Development mode. Enables strict id validation and fails loudly on
    /// generated function names that exceed the PostgreSQL identifier limit.
    pub debug: bool,
    /// Log filter directive for the tracing subscriber (e.g. "info",
    /// "graphfetch_db=debug").
    pub log_level: String,
    /// The database schema all entity tables live in.
    pub db_schema: String,
}

impl Settings {
    /// Reads settings from the environment.
    ///
    /// Recognized variables:
    ///
    /// - `GRAPHFETCH_DEBUG` - "1" or "true" enables development mode
    /// - `GRAPHFETCH_LOG_LEVEL` - tracing filter directive (default "info")
    /// - `GRAPHFETCH_DB_SCHEMA` - database schema name (default "main")
    pub fn from_env() -> Self {
        let debug = std::env::var("GRAPHFETCH_DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let log_level =
            std::env::var("GRAPHFETCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let db_schema =
            std::env::var("GRAPHFETCH_DB_SCHEMA").unwrap_or_else(|_| "main".to_string());
        Self {
            debug,
            log_level,
            db_schema,
        }
    }

    /// Returns development-mode settings (used throughout the test suites).
    pub fn development() -> Self {
        Self {
            debug: true,
            log_level: "debug".to_string(),
            db_schema: "main".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
            db_schema: "main".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(!s.debug);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.db_schema, "main");
    }

    #[test]
    fn test_development_settings() {
        let s = Settings::development();
        assert!(s.debug);
        assert_eq!(s.db_schema, "main");
    }
}
