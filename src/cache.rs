//! Time-triggered caching: refresh results, prefetch strategies, and the supplier engine.

pub mod prefetch;
pub mod refresh;
pub mod supplier;
