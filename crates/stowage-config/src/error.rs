use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("environment variable {var} (credential for {registry}) is not set")]
    MissingEnv { var: String, registry: String },

    #[error("registry #{index} is invalid: {reason}")]
    InvalidRegistry { index: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
