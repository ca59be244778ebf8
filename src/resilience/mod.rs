//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → registry.rs (breaker for the dependency name)
//!     → circuit_breaker.rs (fail fast when open, count failures otherwise)
//!     → wrap.rs (optional: bind an operation to its breaker once)
//! ```
//!
//! # Design Decisions
//! - Breakers never retry; they only add a fast-fail mode
//! - "Circuit open" is a distinct error kind from the operation's own errors
//! - The registry is injected, not global

pub mod circuit_breaker;
pub mod registry;
pub mod wrap;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats, CircuitState};
pub use registry::CircuitBreakerRegistry;
pub use wrap::{with_circuit_breaker, Protected};
