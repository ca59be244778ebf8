//! Span helpers for long-running operations.

use std::future::Future;
use std::time::Instant;

use tracing::Instrument;

use crate::observability::metrics;

/// Run `future` inside an `operation` span and record its duration.
pub async fn traced<F, T>(operation: &'static str, future: F) -> T
where
    F: Future<Output = T>,
{
    let span = tracing::info_span!("operation", name = operation);
    let start = Instant::now();
    let output = future.instrument(span).await;
    metrics::record_operation_duration(operation, start);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_traced_passes_output_through() {
        let value = traced("unit", async { 41 + 1 }).await;
        assert_eq!(value, 42);

        let result: Result<(), &str> = traced("unit", async { Err("boom") }).await;
        assert_eq!(result, Err("boom"));
    }
}
