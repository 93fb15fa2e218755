//! Server binary errors

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    ConfigInvalid(String),

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Key hashing failed: {0}")]
    KeyHash(String),

    #[error(transparent)]
    Core(#[from] bicanh_core::Error),

    #[error(transparent)]
    Net(#[from] bicanh_net::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
