use clap::Parser;

use super::{defaults, LimiterConfig};

/// Command-line overrides; everything else comes from the environment.
#[derive(Debug, Parser)]
#[command(name = "filevault", version, about = "Multi-tenant file management backend")]
pub struct CliArgs {
    /// Rate limiter maximum sustained requests per second
    #[arg(long = "limiter-rps", default_value_t = defaults::DEFAULT_LIMITER_RPS)]
    pub limiter_rps: f64,

    /// Rate limiter maximum burst
    #[arg(long = "limiter-burst", default_value_t = defaults::DEFAULT_LIMITER_BURST)]
    pub limiter_burst: u32,

    /// Enable the per-IP rate limiter
    #[arg(long = "limiter-enabled", default_value_t = true, action = clap::ArgAction::Set)]
    pub limiter_enabled: bool,
}

impl CliArgs {
    pub fn limiter(&self) -> LimiterConfig {
        LimiterConfig {
            rps: self.limiter_rps,
            burst: self.limiter_burst,
            enabled: self.limiter_enabled,
        }
    }
}
