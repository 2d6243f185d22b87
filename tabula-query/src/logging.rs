//! Logging setup for Tabula.
//!
//! The core only emits `tracing` events. A subscriber is installed by
//! [`init`] when the `tracing-subscriber` feature is enabled and one of the
//! environment variables below asks for output.
//!
//! # Environment Variables
//!
//! - `TABULA_DEBUG=true|1|yes` - Enable debug logging
//! - `TABULA_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `TABULA_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! ```rust,no_run
//! use tabula_query::logging;
//!
//! logging::init();
//! ```
//!
//! Events inside the crate use structured fields:
//!
//! ```rust,ignore
//! debug!(sql = %sql, params = params.len(), "executing statement");
//! warn!(model = %entity, "rolling back save");
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "TABULA_DEBUG";
const LEVEL_VAR: &str = "TABULA_LOG_LEVEL";
const FORMAT_VAR: &str = "TABULA_LOG_FORMAT";

fn truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn resolve_level(requested: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "warn" };
    match requested.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

fn resolve_format(requested: Option<&str>) -> &'static str {
    match requested.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}

/// Check if debug logging is enabled via `TABULA_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_VAR).map(|v| truthy(&v)).unwrap_or(false)
}

/// The configured log level. Defaults to "debug" when `TABULA_DEBUG` is set,
/// otherwise "warn".
pub fn get_log_level() -> &'static str {
    resolve_level(env::var(LEVEL_VAR).ok().as_deref(), is_debug_enabled())
}

/// The configured log format, "json" unless `TABULA_LOG_FORMAT` says otherwise.
pub fn get_log_format() -> &'static str {
    resolve_format(env::var(FORMAT_VAR).ok().as_deref())
}

/// Initialize the Tabula logging system.
///
/// Call once at startup. Subsequent calls are no-ops, and nothing is installed
/// unless `TABULA_DEBUG` or `TABULA_LOG_LEVEL` is set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var(LEVEL_VAR).is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "tabula={},tabula_query={},tabula_sqlite={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            // try_init so an application-installed subscriber wins
            let installed = match get_log_format() {
                "json" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level = level, format = get_log_format(), "Tabula logging initialized");
            }
        }
    });
}

/// Initialize logging with a specific level.
///
/// # Safety
///
/// This function modifies environment variables, which is unsafe in
/// multi-threaded programs. Call it early, before spawning threads.
pub fn init_with_level(level: &str) {
    // SAFETY: documented as a startup-only call.
    unsafe {
        env::set_var(LEVEL_VAR, level);
    }
    init();
}

/// Equivalent to setting `TABULA_DEBUG=true` and calling [`init`].
///
/// # Safety
///
/// Same constraints as [`init_with_level`].
pub fn init_debug() {
    // SAFETY: documented as a startup-only call.
    unsafe {
        env::set_var(DEBUG_VAR, "true");
    }
    init();
}
