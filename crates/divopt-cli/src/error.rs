use divopt_core::{HttpError, SourceError, ValidationError, WarehouseError};
use thiserror::Error;

use crate::config::ConfigError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("http client setup failed: {0}")]
    Http(#[from] HttpError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Validation(_) => 2,
            Self::Warehouse(_) => 3,
            Self::Source(_) | Self::Http(_) => 4,
            Self::Serialization(_) => 5,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_category() {
        assert_eq!(CliError::from(ConfigError::InvalidValue(String::from("x"))).exit_code(), 2);
        assert_eq!(CliError::from(WarehouseError::ReadOnly).exit_code(), 3);
        assert_eq!(CliError::from(SourceError::unavailable("down")).exit_code(), 4);
        assert_eq!(
            CliError::from(std::io::Error::new(std::io::ErrorKind::Other, "io")).exit_code(),
            10
        );
    }
}
