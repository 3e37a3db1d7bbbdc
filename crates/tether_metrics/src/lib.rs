//! Tether Metrics - bridge bookkeeping counters
//!
//! Named counters for proxy and handle lifecycle events that completely
//! vanish in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tether_metrics::Counter;
//!
//! let mut counter = Counter::new();
//! counter.increment("proxies_created", 1);
//! assert_eq!(counter.get("proxies_created"), 1);
//! ```

#[cfg(feature = "metrics")]
mod counter;

#[cfg(feature = "metrics")]
pub use counter::Counter;

/// Execute code only when metrics are enabled
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

// ============================================================================
// No-op stub when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default, Clone)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _by: usize) {}
    pub fn get(&self, _name: &str) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
    pub fn snapshot(&self) -> Vec<(&'static str, usize)> { Vec::new() }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_compiles_without_metrics() {
        // Ensure the stub compiles when metrics feature is disabled
        let mut counter = super::Counter::new();
        counter.increment("x", 1);
        let _ = counter.get("x");
    }
}
