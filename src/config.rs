use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the studyvault server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the object store holding uploaded blobs.
    pub object_store_url: String,
    /// Bucket name under which uploads are stored.
    pub object_store_bucket: String,
    /// Optional API key required by the object store.
    pub object_store_api_key: Option<String>,
    /// Base URL of the metadata document store.
    pub metadata_store_url: String,
    /// Table holding uploaded-file records keyed by `(user_id, file_id)`.
    pub file_table_name: String,
    /// Table holding user profiles keyed by `user_id`.
    pub profile_table_name: String,
    /// Optional API key required by the metadata store.
    pub metadata_store_api_key: Option<String>,
    /// Interpreter used to run the external tool scripts.
    pub tool_python_bin: String,
    /// Directory containing the tool scripts.
    pub tools_dir: PathBuf,
    /// Directory for per-request scratch files.
    pub scratch_dir: PathBuf,
    /// Secret used to verify identity webhook signatures (`whsec_<base64>`).
    pub webhook_secret: String,
    /// Number of results returned by a search query.
    pub search_result_count: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            object_store_url: load_env("OBJECT_STORE_URL")?,
            object_store_bucket: load_env("OBJECT_STORE_BUCKET")?,
            object_store_api_key: load_env_optional("OBJECT_STORE_API_KEY"),
            metadata_store_url: load_env("METADATA_STORE_URL")?,
            file_table_name: load_env("FILE_TABLE_NAME")?,
            profile_table_name: load_env("PROFILE_TABLE_NAME")?,
            metadata_store_api_key: load_env_optional("METADATA_STORE_API_KEY"),
            tool_python_bin: load_env_optional("TOOL_PYTHON_BIN")
                .unwrap_or_else(|| "python3".to_string()),
            tools_dir: PathBuf::from(load_env("TOOLS_DIR")?),
            scratch_dir: load_env_optional("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            webhook_secret: load_env("WEBHOOK_SECRET")?,
            search_result_count: load_env_optional("SEARCH_RESULT_COUNT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SEARCH_RESULT_COUNT".into()))
                })
                .transpose()?
                .unwrap_or(5),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        object_store = %config.object_store_url,
        metadata_store = %config.metadata_store_url,
        tools_dir = %config.tools_dir.display(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
