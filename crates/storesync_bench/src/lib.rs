//! Benchmark support for StoreSync.
//!
//! Builds deterministic batches and stores of a chosen size for the
//! criterion benches under `benches/`.

pub mod utils;
