//! Contact domain model.
//!
//! # Responsibility
//! - Define the canonical record persisted for every observed contact pair.
//! - Provide self-consistency checks for the primary/secondary link shape.
//!
//! # Invariants
//! - `id` is store-assigned, immutable, and issued in creation order.
//! - A primary row never carries `linked_primary_id`; a secondary row always
//!   does, and only toward a primary (links are flattened, never chained).
//! - `created_at` never changes after creation and is the ordering key for
//!   primacy decisions, with `id` as tie-breaker.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable store-assigned identifier for a contact row.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type ContactId = i64;

/// Link precedence of a contact row within its identity group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// Canonical, oldest record of an identity group.
    Primary,
    /// Additional observed fact, linked directly to its primary.
    Secondary,
}

/// Canonical persisted record of one observed `(email, phone)` fact.
///
/// A contact is created once and mutated only when a merge demotes a primary
/// or re-points a secondary onto the surviving primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Stable store-assigned id, monotonically increasing in creation order.
    pub id: ContactId,
    /// Case-normalized email address, when observed.
    pub email: Option<String>,
    /// Digit-normalized phone number (`+` prefix), when observed.
    pub phone: Option<String>,
    /// Whether this row anchors its identity group or links into one.
    pub precedence: Precedence,
    /// Present iff `precedence == Secondary`; always the id of a primary row.
    pub linked_primary_id: Option<ContactId>,
    /// Unix epoch milliseconds, fixed at creation.
    pub created_at: i64,
    /// Unix epoch milliseconds, refreshed on demotion/re-pointing.
    pub updated_at: i64,
    /// Soft-delete tombstone; a set value excludes the row from all lookups.
    pub deleted_at: Option<i64>,
}

/// Self-consistency violations detectable on a single contact row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    /// Neither email nor phone is set on a non-deleted row.
    MissingContactField(ContactId),
    /// A primary row carries a linked primary id.
    PrimaryWithLink(ContactId),
    /// A secondary row carries no linked primary id.
    SecondaryWithoutLink(ContactId),
    /// A secondary row points at itself.
    SelfLink(ContactId),
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContactField(id) => {
                write!(f, "contact {id} has neither email nor phone")
            }
            Self::PrimaryWithLink(id) => {
                write!(f, "primary contact {id} carries a linked primary id")
            }
            Self::SecondaryWithoutLink(id) => {
                write!(f, "secondary contact {id} has no linked primary id")
            }
            Self::SelfLink(id) => write!(f, "contact {id} links to itself"),
        }
    }
}

impl Error for ContactValidationError {}

impl Contact {
    /// Returns whether this row anchors its identity group.
    pub fn is_primary(&self) -> bool {
        self.precedence == Precedence::Primary
    }

    /// Returns whether this row links into another row's identity group.
    pub fn is_secondary(&self) -> bool {
        self.precedence == Precedence::Secondary
    }

    /// Returns whether this row should be considered visible/active.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Ordering key for primacy decisions: oldest `created_at` wins, ties
    /// broken by ascending `id` (ids are issued in creation order).
    pub fn primacy_key(&self) -> (i64, ContactId) {
        (self.created_at, self.id)
    }

    /// Checks single-row shape invariants.
    ///
    /// Cross-row invariants (the link target existing and being primary) need
    /// store access and are enforced during lookup expansion instead.
    pub fn validate(&self) -> Result<(), ContactValidationError> {
        if self.email.is_none() && self.phone.is_none() {
            return Err(ContactValidationError::MissingContactField(self.id));
        }

        match (self.precedence, self.linked_primary_id) {
            (Precedence::Primary, Some(_)) => Err(ContactValidationError::PrimaryWithLink(self.id)),
            (Precedence::Secondary, None) => {
                Err(ContactValidationError::SecondaryWithoutLink(self.id))
            }
            (Precedence::Secondary, Some(linked)) if linked == self.id => {
                Err(ContactValidationError::SelfLink(self.id))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Contact, ContactValidationError, Precedence};

    fn primary(id: i64, created_at: i64) -> Contact {
        Contact {
            id,
            email: Some(format!("user{id}@example.com")),
            phone: None,
            precedence: Precedence::Primary,
            linked_primary_id: None,
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    #[test]
    fn primacy_key_prefers_older_then_lower_id() {
        let older = primary(7, 100);
        let newer = primary(3, 200);
        assert!(older.primacy_key() < newer.primacy_key());

        let tied_low = primary(3, 100);
        let tied_high = primary(7, 100);
        assert!(tied_low.primacy_key() < tied_high.primacy_key());
    }

    #[test]
    fn validate_rejects_malformed_link_shapes() {
        let mut contact = primary(1, 100);
        contact.linked_primary_id = Some(2);
        assert_eq!(
            contact.validate(),
            Err(ContactValidationError::PrimaryWithLink(1))
        );

        let mut contact = primary(1, 100);
        contact.precedence = Precedence::Secondary;
        assert_eq!(
            contact.validate(),
            Err(ContactValidationError::SecondaryWithoutLink(1))
        );

        let mut contact = primary(1, 100);
        contact.precedence = Precedence::Secondary;
        contact.linked_primary_id = Some(1);
        assert_eq!(contact.validate(), Err(ContactValidationError::SelfLink(1)));

        let mut contact = primary(1, 100);
        contact.email = None;
        assert_eq!(
            contact.validate(),
            Err(ContactValidationError::MissingContactField(1))
        );
    }
}
