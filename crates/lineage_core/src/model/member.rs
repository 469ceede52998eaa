//! Member domain model.
//!
//! # Responsibility
//! - Define the canonical member record owned by the member store.
//! - Provide validation and lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - `id` is stable and never reused for another member.
//! - `spiritual_parent_id` never points at the member itself.
//! - `is_deleted` is the source of truth for tombstone state.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Stable member identifier.
///
/// Imported ids are kept verbatim, so this is text rather than `Uuid`.
pub type MemberId = String;

/// Validation failures for member writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberValidationError {
    /// Id is blank after trim.
    BlankId,
    /// Full name is blank after trim.
    BlankFullName,
    /// Email is present but not shaped like an address.
    InvalidEmail(String),
    /// Member names itself as spiritual parent.
    SelfParent(MemberId),
}

impl Display for MemberValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId => write!(f, "member id must not be blank"),
            Self::BlankFullName => write!(f, "member full name must not be blank"),
            Self::InvalidEmail(value) => write!(f, "invalid member email `{value}`"),
            Self::SelfParent(id) => write!(f, "member {id} cannot be its own spiritual parent"),
        }
    }
}

impl Error for MemberValidationError {}

/// Canonical member record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub church: String,
    pub membership_category: String,
    pub age_group: String,
    /// `None` means the member is a lineage root.
    pub spiritual_parent_id: Option<MemberId>,
    /// Soft delete tombstone.
    #[serde(default)]
    pub is_deleted: bool,
    /// Epoch ms.
    #[serde(default)]
    pub created_at: i64,
    /// Epoch ms.
    #[serde(default)]
    pub updated_at: i64,
}

impl Member {
    /// Creates a root member with a generated id and empty display attributes.
    pub fn new(full_name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), full_name)
    }

    /// Creates a root member with a caller-provided id.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(id: impl Into<MemberId>, full_name: impl Into<String>) -> Self {
        let now = now_epoch_ms();
        Self {
            id: id.into(),
            full_name: full_name.into(),
            email: None,
            phone: None,
            church: String::new(),
            membership_category: String::new(),
            age_group: String::new(),
            spiritual_parent_id: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style parent assignment, mostly for fixtures and imports.
    pub fn with_parent(mut self, parent_id: impl Into<MemberId>) -> Self {
        self.spiritual_parent_id = Some(parent_id.into());
        self
    }

    /// Checks write-side invariants.
    pub fn validate(&self) -> Result<(), MemberValidationError> {
        if self.id.trim().is_empty() {
            return Err(MemberValidationError::BlankId);
        }
        if self.full_name.trim().is_empty() {
            return Err(MemberValidationError::BlankFullName);
        }
        if let Some(email) = self.email.as_deref() {
            if !EMAIL_RE.is_match(email) {
                return Err(MemberValidationError::InvalidEmail(email.to_string()));
            }
        }
        if self.spiritual_parent_id.as_deref() == Some(self.id.as_str()) {
            return Err(MemberValidationError::SelfParent(self.id.clone()));
        }
        Ok(())
    }

    /// Marks this member as softly deleted.
    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
    }

    /// Returns whether this member should be visible in lineage views.
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Write request for creating or importing one member.
///
/// Field names follow the JSON import format (`camelCase`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewMember {
    /// Generated when absent.
    pub id: Option<MemberId>,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub church: String,
    pub membership_category: String,
    pub age_group: String,
    pub spiritual_parent_id: Option<MemberId>,
}

impl NewMember {
    pub fn named(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ..Self::default()
        }
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
