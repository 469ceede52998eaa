//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate member store calls into lineage use-cases.
//! - Keep HTTP/CLI layers decoupled from storage details.

pub mod forest;
pub mod leader_service;
pub mod lineage_service;
pub mod member_service;
