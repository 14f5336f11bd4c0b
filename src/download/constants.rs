//! Constants for the rendering pool.

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of pages rendered at once.
pub const DEFAULT_CONCURRENCY: usize = 10;
