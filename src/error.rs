use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScreepsError>;

#[derive(Debug, Error)]
pub enum ScreepsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Fetch task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for ScreepsError {
    fn from(err: reqwest::Error) -> Self {
        ScreepsError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ScreepsError {
    fn from(err: serde_json::Error) -> Self {
        ScreepsError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ScreepsError {
    fn from(err: std::io::Error) -> Self {
        ScreepsError::Io(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Read { path: String, message: String },

    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("{field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid { field, message: message.into() }
    }
}
