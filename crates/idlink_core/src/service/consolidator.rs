//! Consolidated identity view.
//!
//! # Responsibility
//! - Build the externally visible summary of one identity group: ordered,
//!   deduplicated emails/phones and the list of secondary ids.
//!
//! # Invariants
//! - Read-only; re-reads the group from the current transaction snapshot so
//!   mutations committed by the same request are visible.
//! - The primary's own values always come first; secondaries follow in
//!   `(created_at, id)` ascending order; no value appears twice.
//! - For a fixed store state, repeated calls return identical output.

use crate::model::contact::{Contact, ContactId};
use crate::repo::contact_repo::ContactRepository;
use crate::service::{IdentityError, IdentityResult, IntegrityViolation, TransientFault};
use serde::{Deserialize, Serialize};

/// Unified view of one identity returned to the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    /// Id of the group's surviving primary.
    pub primary_id: ContactId,
    /// All known emails, primary's first, deduplicated.
    pub emails: Vec<String>,
    /// All known phones, primary's first, deduplicated.
    pub phones: Vec<String>,
    /// Active secondary ids in creation order.
    pub secondary_ids: Vec<ContactId>,
}

/// Builds the consolidated view of the group anchored by `primary`.
///
/// The primary is re-fetched by id rather than trusted from the caller, so
/// the summary reflects exactly what the enclosing transaction would commit.
pub fn consolidate<R: ContactRepository>(
    repo: &R,
    primary: &Contact,
) -> IdentityResult<IdentitySummary> {
    let current = repo
        .get_contact(primary.id, false)?
        .ok_or(IdentityError::Retryable(TransientFault::PrimaryVanished(
            primary.id,
        )))?;
    if !current.is_primary() {
        return Err(IdentityError::Integrity(IntegrityViolation::NotAPrimary(
            current.id,
        )));
    }

    let secondaries = repo.list_secondaries(current.id)?;

    let mut emails = Vec::new();
    let mut phones = Vec::new();
    let mut secondary_ids = Vec::with_capacity(secondaries.len());

    push_unique(&mut emails, current.email.as_deref());
    push_unique(&mut phones, current.phone.as_deref());

    for secondary in &secondaries {
        secondary_ids.push(secondary.id);
        push_unique(&mut emails, secondary.email.as_deref());
        push_unique(&mut phones, secondary.phone.as_deref());
    }

    Ok(IdentitySummary {
        primary_id: current.id,
        emails,
        phones,
        secondary_ids,
    })
}

/// Appends a value unless absent or already present, preserving first-seen
/// order.
fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !values.iter().any(|existing| existing == value) {
            values.push(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::push_unique;

    #[test]
    fn push_unique_preserves_first_seen_order() {
        let mut values = Vec::new();
        push_unique(&mut values, Some("a@example.com"));
        push_unique(&mut values, None);
        push_unique(&mut values, Some("b@example.com"));
        push_unique(&mut values, Some("a@example.com"));

        assert_eq!(values, vec!["a@example.com", "b@example.com"]);
    }
}
