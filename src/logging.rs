use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{GeneralConfig, LoggingConfig};

/// Installs the subscriber and the panic hook. Production environments emit
/// JSON lines for log shipping; everything else stays human-readable.
pub fn init_tracing(logging: &LoggingConfig, general: &GeneralConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.rust_log));
    let builder = fmt().with_env_filter(filter).with_target(false);

    if general.environment == "production" {
        builder.json().init();
    } else {
        builder.init();
    }

    set_panic_hook(general.version.clone());
}

fn set_panic_hook(version: String) {
    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        tracing::error!(
            panic = %panic_message(info),
            location = %info
                .location()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown".to_string()),
            version = %version,
            backtrace = %Backtrace::capture(),
            "panic"
        );
    }));
}

fn panic_message<'a>(info: &'a PanicHookInfo<'a>) -> &'a str {
    let payload = info.payload();
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
