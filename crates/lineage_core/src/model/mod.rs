//! Domain model for the spiritual lineage forest.
//!
//! # Responsibility
//! - Define the persisted `Member` record and its validation rules.
//! - Define the per-request read models served to lineage views.
//!
//! # Invariants
//! - Every member is identified by a stable string id.
//! - Deletion is represented by soft-delete tombstones, not hard delete.
//! - Read models are rebuilt per request and never persisted.

pub mod lineage;
pub mod member;
