pub const DEFAULT_RUST_LOG: &str = "info";

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;
pub const DEFAULT_DB_MIN_IDLE: u32 = 25;
pub const DEFAULT_DB_MAX_LIFETIME_SECS: u64 = 30 * 60;

/// 200 MiB upload ceiling unless MAX_UPLOAD_SIZE overrides it.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 200 * 1024 * 1024;

pub const DEFAULT_LIMITER_RPS: f64 = 2.0;
pub const DEFAULT_LIMITER_BURST: u32 = 4;

pub const DEFAULT_SMTP_PORT: u16 = 587;
