//! Reconciliation services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the sighting reconciliation flow:
//!   lookup, linking decision, consolidation.
//! - Define the error taxonomy surfaced to the transport collaborator.
//!
//! # Invariants
//! - Services hold no cross-request state; every operation takes an explicit
//!   store handle bound to the caller's transaction.
//! - Errors are classified so callers can retry transient faults and must
//!   never retry integrity faults.

use crate::model::contact::ContactId;
use crate::model::sighting::SightingError;
use crate::repo::contact_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod consolidator;
pub mod identity_service;
pub mod linker;
pub mod lookup;

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Persisted-graph violations that should be unreachable given the merge
/// ordering, detected defensively and never silently repaired.
#[derive(Debug)]
pub enum IntegrityViolation {
    /// A persisted row failed single-row shape validation.
    CorruptRecord(String),
    /// A secondary points at a row that does not exist or is deleted.
    DanglingLink {
        secondary_id: ContactId,
        linked_primary_id: ContactId,
    },
    /// A secondary points at a row that is itself secondary.
    LinkToSecondary {
        secondary_id: ContactId,
        linked_primary_id: ContactId,
    },
    /// Lookup produced matches but no primary anchors the group.
    GroupWithoutPrimary { sample_id: ContactId },
    /// A row expected to be primary at this point is not.
    NotAPrimary(ContactId),
}

impl Display for IntegrityViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CorruptRecord(message) => write!(f, "corrupt contact record: {message}"),
            Self::DanglingLink {
                secondary_id,
                linked_primary_id,
            } => write!(
                f,
                "secondary {secondary_id} links to missing contact {linked_primary_id}"
            ),
            Self::LinkToSecondary {
                secondary_id,
                linked_primary_id,
            } => write!(
                f,
                "secondary {secondary_id} links to secondary {linked_primary_id}"
            ),
            Self::GroupWithoutPrimary { sample_id } => {
                write!(f, "matched group around contact {sample_id} has no primary")
            }
            Self::NotAPrimary(id) => write!(f, "contact {id} is not a primary"),
        }
    }
}

impl Error for IntegrityViolation {}

/// Faults that abort the transaction with zero mutation applied and are safe
/// to retry as a whole sighting.
#[derive(Debug)]
pub enum TransientFault {
    /// The store reported lock/contention; another writer won.
    StoreContended(RepoError),
    /// A primary selected by this transaction vanished before mutation.
    PrimaryVanished(ContactId),
}

impl Display for TransientFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreContended(err) => write!(f, "store contended: {err}"),
            Self::PrimaryVanished(id) => {
                write!(f, "primary contact {id} vanished mid-transaction")
            }
        }
    }
}

impl Error for TransientFault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreContended(err) => Some(err),
            Self::PrimaryVanished(_) => None,
        }
    }
}

/// Typed result surface of one reconciliation, mapped by the transport layer
/// to its own status vocabulary.
#[derive(Debug)]
pub enum IdentityError {
    /// Client-side fault: rejected before any store access.
    Input(SightingError),
    /// Transaction aborted with no visible effect; retry the sighting.
    Retryable(TransientFault),
    /// Persisted graph violated an invariant; reconciliation failed closed.
    Integrity(IntegrityViolation),
    /// Terminal store fault that is neither transient nor an invariant break.
    Store(RepoError),
}

impl IdentityError {
    /// Returns whether the caller may retry the whole sighting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Stable lowercase tag used in log events.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Retryable(_) => "retryable",
            Self::Integrity(_) => "integrity",
            Self::Store(_) => "store",
        }
    }
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input(err) => write!(f, "{err}"),
            Self::Retryable(fault) => write!(f, "{fault}"),
            Self::Integrity(violation) => write!(f, "{violation}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IdentityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Input(err) => Some(err),
            Self::Retryable(fault) => Some(fault),
            Self::Integrity(violation) => Some(violation),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<SightingError> for IdentityError {
    fn from(value: SightingError) -> Self {
        Self::Input(value)
    }
}

impl From<RepoError> for IdentityError {
    fn from(value: RepoError) -> Self {
        if value.is_transient() {
            return Self::Retryable(TransientFault::StoreContended(value));
        }
        match value {
            RepoError::Validation(err) => {
                Self::Integrity(IntegrityViolation::CorruptRecord(err.to_string()))
            }
            RepoError::InvalidData(message) => {
                Self::Integrity(IntegrityViolation::CorruptRecord(message))
            }
            other => Self::Store(other),
        }
    }
}

impl From<rusqlite::Error> for IdentityError {
    fn from(value: rusqlite::Error) -> Self {
        RepoError::from(crate::db::DbError::Sqlite(value)).into()
    }
}
