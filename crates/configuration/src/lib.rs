use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{DatabaseSettings, LoggingSettings, ServerSettings, Settings};

/// The configuration file looked up in the working directory. It is optional.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Prefix for environment overrides, e.g. `STOCKAI__SERVER__ADDR`.
pub const ENV_PREFIX: &str = "STOCKAI";

/// Command-line overrides shared by the binaries.
#[cfg(feature = "clap")]
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: std::path::PathBuf,
}

/// Loads the application settings.
///
/// Sources, lowest precedence first: built-in defaults, `config.toml` (if it
/// exists), `STOCKAI__*` environment variables, and finally `DATABASE_URL`.
/// A `.env` file in the working directory is loaded into the environment first.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE))
}

/// Same as [`load_settings`] with an explicit configuration file path.
pub fn load_settings_from(config_file: &Path) -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();
    let vars: HashMap<String, String> = std::env::vars().collect();
    load_settings_with(config_file, &vars)
}

/// Builds settings from a file and an explicit set of environment variables.
pub fn load_settings_with(
    config_file: &Path,
    vars: &HashMap<String, String>,
) -> Result<Settings, ConfigError> {
    let database_url = vars
        .get("DATABASE_URL")
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());

    let builder = config::Config::builder()
        .set_default("server.addr", "0.0.0.0:3000")?
        .set_default("server.body_limit_bytes", 1024 * 1024)?
        .set_default("database.max_connections", 10)?
        .set_default("database.lookup_timeout_ms", 5_000)?
        .set_default("database.watchlist_timeout_ms", 3_000)?
        .set_default("logging.level", "info")?
        .add_source(config::File::from(config_file).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(vars.clone().into_iter().collect())),
        )
        .set_override_option("database.url", database_url)?
        .build()?;

    // Attempt to deserialize the entire configuration into our `Settings` struct
    let settings = builder.try_deserialize::<Settings>()?;
    validate(&settings)?;

    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.database.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be at least 1".to_string(),
        ));
    }
    if settings.database.lookup_timeout_ms == 0 || settings.database.watchlist_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "database timeouts must be greater than zero".to_string(),
        ));
    }
    if settings.server.body_limit_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "server.body_limit_bytes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
