//! Property-based tests

pub mod coalesce_proptest;
pub mod processor_proptest;
