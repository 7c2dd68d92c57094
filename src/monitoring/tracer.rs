/*!
 * Structured Tracing
 * Subscriber setup and refresh-session spans using the tracing crate
 *
 * Features:
 * - EnvFilter driven verbosity (RUST_LOG)
 * - JSON-formatted logs for structured parsing
 * - Per-session spans with trace IDs for correlating refresh work
 */

use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

use crate::core::types::SessionId;

/// Refresh sessions slower than this are reported at warn level
const SLOW_REFRESH: Duration = Duration::from_secs(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - VFS_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("VFS_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        // JSON output for production/parsing
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        // Human-readable output for development
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Generate a unique trace ID for log correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one refresh session
pub struct RefreshSpan {
    span: tracing::Span,
    start: Instant,
    session: SessionId,
    trace_id: String,
}

impl RefreshSpan {
    pub fn new(session: SessionId, recursive: bool, asynchronous: bool, roots: usize) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::INFO,
            "refresh_session",
            id = session,
            trace_id = %trace_id,
            recursive,
            asynchronous,
            roots,
            events = tracing::field::Empty,
            cancelled = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            session,
            trace_id,
        }
    }

    /// Trace ID of this session
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Record the number of events applied
    pub fn record_events(&self, count: usize) {
        self.span.record("events", count);
    }

    /// Record whether the session was cancelled
    pub fn record_cancelled(&self, cancelled: bool) {
        self.span.record("cancelled", cancelled);
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// The underlying span, for handing to worker threads
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Drop for RefreshSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_ms", duration.as_millis() as u64);

        if duration > SLOW_REFRESH {
            warn!(
                session = self.session,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow refresh session"
            );
        } else {
            debug!(
                session = self.session,
                duration_us = duration.as_micros() as u64,
                "refresh session completed"
            );
        }
    }
}

/// Create a span for a refresh session
pub fn span_refresh(session: SessionId, recursive: bool, asynchronous: bool, roots: usize) -> RefreshSpan {
    RefreshSpan::new(session, recursive, asynchronous, roots)
}
