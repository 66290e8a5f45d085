//! # CSim
//!
//! CSim is a library for simulating a set-associative, least-recently-used
//! hardware cache against a recorded memory trace
//!
//! It provides the cache model itself, a simulator which replays fixed-width
//! trace records through the model, and the IO utilities for loading and
//! validating trace files
//!
//! While designed to accommodate high performance, it prioritises being easy
//! to maintain and reason about; the per-access path is O(1) throughout

/// Contains the cache model: the per-set LRU state and the cache which routes
/// addresses to sets
pub mod cache;

/// Contains the cache geometry definition, its JSON input format, and the
/// construction-time validation rules
pub mod config;

/// Contains the simulator which replays trace records through a cache, and
/// the trace record parsers
pub mod simulator;

/// Contains utilities for loading and validating trace files
pub mod io;

#[cfg(test)]
mod test;
