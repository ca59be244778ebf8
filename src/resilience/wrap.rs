//! Higher-order wrapper binding an operation to a breaker.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerError};

/// An operation that always runs through its breaker.
pub struct Protected<F> {
    breaker: Arc<CircuitBreaker>,
    operation: F,
}

/// Bind `operation` to `breaker`; each [`Protected::call`] goes through the breaker.
pub fn with_circuit_breaker<F>(breaker: Arc<CircuitBreaker>, operation: F) -> Protected<F> {
    Protected { breaker, operation }
}

impl<F> Protected<F> {
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl<F, Fut, T, E> Protected<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    pub async fn call(&self) -> Result<T, CircuitBreakerError<E>> {
        self.breaker.execute(&self.operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_wrapped_operation_shares_breaker() {
        let breaker = Arc::new(CircuitBreaker::new(
            "crm-api",
            CircuitBreakerConfig {
                failure_threshold: 2,
                ..Default::default()
            },
        ));
        let calls = Arc::new(AtomicU32::new(0));

        let fetch = {
            let calls = calls.clone();
            with_circuit_breaker(breaker.clone(), move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("503 from upstream")
                }
            })
        };

        assert!(!fetch.call().await.unwrap_err().is_open());
        assert!(!fetch.call().await.unwrap_err().is_open());
        assert!(fetch.call().await.unwrap_err().is_open());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(Arc::ptr_eq(fetch.breaker(), &breaker));
    }
}
