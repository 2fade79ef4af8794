//! Observability infrastructure for veld.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors for consistent observability
//! across all veld components.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `veld_merge=debug`)
///
/// # Example
///
/// ```rust
/// use veld_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for merge operations with standard fields.
///
/// # Example
///
/// ```rust
/// use veld_core::observability::merge_span;
///
/// let span = merge_span("merge_snapshot", "gemeente-aarschot");
/// let _guard = span.enter();
/// // ... do merge operation
/// ```
#[must_use]
pub fn merge_span(operation: &str, authority: &str) -> Span {
    tracing::info_span!(
        "merge",
        op = operation,
        authority = authority,
    )
}

/// Creates a span for batch runner invocations.
#[must_use]
pub fn runner_span(operation: &str) -> Span {
    tracing::info_span!("runner", op = operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        // Should not panic (uses Once internally)
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn merge_span_carries_fields() {
        let span = merge_span("merge_snapshot", "gemeente-aarschot");
        let _guard = span.enter();
        tracing::info!("test message in span");
    }
}
