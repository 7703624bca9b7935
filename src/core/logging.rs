//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable, e.g.
/// `RUST_LOG=terrastream::atlas=trace` to follow slot traffic.
///
/// # Example
/// ```
/// terrastream::core::logging::init();
/// log::info!("Terrain streaming started");
/// ```
pub fn init() {
    // try_init: a second call (tests, embedding hosts) keeps the first logger
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
