//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented member store contracts.
//! - Isolate SQLite query details from lineage traversal and aggregation.
//!
//! # Invariants
//! - Repository writes must enforce `Member::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod member_repo;
