use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Config error: {0}")]
    Config(#[from] locator_node::config::ConfigError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Discovery(#[from] locator_discovery::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<locator_core::Error> for CliError {
    fn from(e: locator_core::Error) -> Self {
        CliError::InvalidArgument(e.to_string())
    }
}
