//! Member write use-cases: create, parent assignment, removal and import.
//!
//! # Responsibility
//! - Validate member input above the repository layer.
//! - Keep the parent relation a forest on every write.
//!
//! # Invariants
//! - Parent must exist and be active when assigned.
//! - Assignments that would make a member its own ancestor are rejected.
//! - Removal is a soft delete; children become orphaned roots.

use crate::logging::field_value;
use crate::model::lineage::ErrorCode;
use crate::model::member::{Member, MemberId, MemberValidationError, NewMember};
use crate::repo::member_repo::{MemberRepoError, MemberRepository};
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from member write operations.
#[derive(Debug)]
pub enum MemberServiceError {
    /// Input failed member validation.
    InvalidMember(MemberValidationError),
    /// Target member does not exist.
    MemberNotFound(MemberId),
    /// Requested parent does not exist.
    ParentNotFound(MemberId),
    /// Supplied id is already taken.
    DuplicateId(MemberId),
    /// Assignment would create a parent loop.
    CycleDetected {
        member_id: MemberId,
        parent_id: MemberId,
    },
    /// Repository-level failure.
    Repo(MemberRepoError),
}

impl MemberServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidMember(_) | Self::DuplicateId(_) => ErrorCode::InvalidArgument,
            Self::MemberNotFound(_) | Self::ParentNotFound(_) => ErrorCode::NotFound,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::Repo(_) => ErrorCode::UpstreamUnavailable,
        }
    }
}

impl Display for MemberServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMember(err) => write!(f, "{err}"),
            Self::MemberNotFound(id) => write!(f, "member not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "spiritual parent not found: {id}"),
            Self::DuplicateId(id) => write!(f, "member id already exists: {id}"),
            Self::CycleDetected {
                member_id,
                parent_id,
            } => write!(
                f,
                "assignment would create cycle: member {member_id} under parent {parent_id}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MemberServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidMember(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MemberRepoError> for MemberServiceError {
    fn from(value: MemberRepoError) -> Self {
        match value {
            MemberRepoError::NotFound(id) => Self::MemberNotFound(id),
            MemberRepoError::DuplicateId(id) => Self::DuplicateId(id),
            MemberRepoError::Validation(err) => Self::InvalidMember(err),
            other => Self::Repo(other),
        }
    }
}

impl From<MemberValidationError> for MemberServiceError {
    fn from(value: MemberValidationError) -> Self {
        Self::InvalidMember(value)
    }
}

/// One import row that could not be fully applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRejection {
    /// 0-based position in the input.
    pub row: usize,
    pub id: Option<MemberId>,
    pub reason: String,
}

/// Outcome of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub created: Vec<MemberId>,
    /// Rows whose parent link was applied.
    pub linked: usize,
    pub rejected: Vec<ImportRejection>,
}

/// Member write service facade.
pub struct MemberService<R: MemberRepository> {
    repo: R,
}

impl<R: MemberRepository> MemberService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Loads one active member.
    pub fn get_member(&self, id: &str) -> Result<Member, MemberServiceError> {
        self.repo
            .get_member(id, false)?
            .ok_or_else(|| MemberServiceError::MemberNotFound(id.to_string()))
    }

    /// Creates one member, linking it to its parent when one is given.
    pub fn create_member(&self, input: NewMember) -> Result<Member, MemberServiceError> {
        let parent_id = normalize_id(input.spiritual_parent_id.clone());
        if let Some(parent_id) = parent_id.as_deref() {
            self.ensure_active(parent_id, MemberServiceError::ParentNotFound)?;
        }

        let mut member = build_member(input)?;
        member.spiritual_parent_id = parent_id;
        member.validate()?;
        self.repo.create_member(&member)?;
        info!(
            "event=member_create module=service status=ok member_id={} has_parent={}",
            field_value(&member.id),
            member.spiritual_parent_id.is_some()
        );
        Ok(member)
    }

    /// Points `member_id` at `parent_id`, or makes it a root when `None`.
    pub fn assign_spiritual_parent(
        &self,
        member_id: &str,
        parent_id: Option<&str>,
    ) -> Result<(), MemberServiceError> {
        self.ensure_active(member_id, MemberServiceError::MemberNotFound)?;

        if let Some(parent_id) = parent_id {
            if parent_id == member_id {
                return Err(MemberServiceError::CycleDetected {
                    member_id: member_id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }
            self.ensure_active(parent_id, MemberServiceError::ParentNotFound)?;
            if self.would_create_cycle(member_id, parent_id)? {
                return Err(MemberServiceError::CycleDetected {
                    member_id: member_id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }
        }

        self.repo.set_spiritual_parent(member_id, parent_id)?;
        info!(
            "event=member_assign_parent module=service status=ok member_id={} parent_id={}",
            field_value(member_id),
            field_value(parent_id.unwrap_or("none"))
        );
        Ok(())
    }

    /// Soft-deletes one member.
    pub fn remove_member(&self, member_id: &str) -> Result<(), MemberServiceError> {
        self.repo.soft_delete_member(member_id)?;
        info!(
            "event=member_remove module=service status=ok member_id={}",
            field_value(member_id)
        );
        Ok(())
    }

    /// Imports members in two phases so rows may reference parents that
    /// appear later in the input.
    ///
    /// Row-level failures are collected in the report; only repository
    /// failures abort the import.
    pub fn import_members(&self, rows: Vec<NewMember>) -> Result<ImportReport, MemberServiceError> {
        let mut report = ImportReport::default();
        let mut links = Vec::new();

        for (row, input) in rows.into_iter().enumerate() {
            let parent_id = normalize_id(input.spiritual_parent_id.clone());
            let member = match build_member(input).and_then(|member| {
                member.validate()?;
                Ok(member)
            }) {
                Ok(member) => member,
                Err(err) => {
                    report.rejected.push(ImportRejection {
                        row,
                        id: None,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            match self.repo.create_member(&member) {
                Ok(id) => {
                    if let Some(parent_id) = parent_id {
                        links.push((row, id.clone(), parent_id));
                    }
                    report.created.push(id);
                }
                Err(err) => {
                    let err = MemberServiceError::from(err);
                    if matches!(err, MemberServiceError::Repo(_)) {
                        return Err(err);
                    }
                    report.rejected.push(ImportRejection {
                        row,
                        id: Some(member.id),
                        reason: err.to_string(),
                    });
                }
            }
        }

        for (row, member_id, parent_id) in links {
            match self.assign_spiritual_parent(&member_id, Some(&parent_id)) {
                Ok(()) => report.linked += 1,
                Err(MemberServiceError::Repo(err)) => return Err(MemberServiceError::Repo(err)),
                Err(err) => report.rejected.push(ImportRejection {
                    row,
                    id: Some(member_id),
                    reason: err.to_string(),
                }),
            }
        }

        if report.rejected.is_empty() {
            info!(
                "event=member_import module=service status=ok created={} linked={}",
                report.created.len(),
                report.linked
            );
        } else {
            warn!(
                "event=member_import module=service status=partial created={} linked={} rejected={}",
                report.created.len(),
                report.linked,
                report.rejected.len()
            );
        }
        Ok(report)
    }

    fn ensure_active(
        &self,
        id: &str,
        missing: fn(MemberId) -> MemberServiceError,
    ) -> Result<(), MemberServiceError> {
        match self.repo.get_member(id, false)? {
            Some(_) => Ok(()),
            None => Err(missing(id.to_string())),
        }
    }

    fn would_create_cycle(
        &self,
        member_id: &str,
        candidate_parent_id: &str,
    ) -> Result<bool, MemberServiceError> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent_id.to_string());
        while let Some(current) = cursor {
            if current == member_id {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                return Ok(true);
            }
            // A missing or deleted ancestor ends the chain.
            cursor = self
                .repo
                .get_member(&current, false)?
                .and_then(|member| member.spiritual_parent_id);
        }
        Ok(false)
    }
}

fn build_member(input: NewMember) -> Result<Member, MemberServiceError> {
    let full_name = input.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(MemberValidationError::BlankFullName.into());
    }
    let mut member = match normalize_id(input.id) {
        Some(id) => Member::with_id(id, full_name),
        None => Member::new(full_name),
    };
    member.email = normalize_optional(input.email);
    member.phone = normalize_optional(input.phone);
    member.church = input.church.trim().to_string();
    member.membership_category = input.membership_category.trim().to_string();
    member.age_group = input.age_group.trim().to_string();
    Ok(member)
}

fn normalize_id(value: Option<String>) -> Option<MemberId> {
    normalize_optional(value)
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
