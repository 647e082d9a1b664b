//! Integration test crate for the royalty engine.
//!
//! This crate has no library code. It only contains integration tests
//! that run calculations end to end over the SQLite store.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p folio-integration-tests
//! ```
