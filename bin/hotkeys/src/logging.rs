use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Initializes the logging subsystem for `tracing`.
///
/// The `HOTKEYS_LOG_LEVEL` environment variable holds the filtering directives, defaulting to `INFO`. If
/// `HOTKEYS_LOG_FORMAT_JSON` is set to `true` or `1`, logs are formatted as JSON. Otherwise, a compact, colored format
/// is used.
///
/// Logs are always written to standard error, leaving standard output for emissions.
pub fn initialize_logging() {
    let is_json = std::env::var("HOTKEYS_LOG_FORMAT_JSON")
        .map(|s| s.trim().to_lowercase())
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false);

    let level_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("HOTKEYS_LOG_LEVEL")
        .from_env_lossy();

    if is_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(level_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(level_filter)
            .with_ansi(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
