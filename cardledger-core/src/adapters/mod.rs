//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the Repository port
//! - In-process maps for the Repository port (tests, embedding)
//! - `rand` generators for the RandomSource port

pub mod duckdb;
pub mod memory;
pub mod random;
