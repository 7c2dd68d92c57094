/*!
 * Monitoring
 * Structured tracing setup and spans
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_refresh, RefreshSpan};
