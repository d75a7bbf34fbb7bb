mod cli;
mod configs;
mod defaults;
mod envconfig;
mod validate;

pub use cli::CliArgs;
pub use configs::{
    AppConfig, AuthConfig, DatabaseConfig, GeneralConfig, LimiterConfig, LoggingConfig,
    MailConfig, StorageConfig, StorageType,
};
pub use envconfig::EnvConfig;
