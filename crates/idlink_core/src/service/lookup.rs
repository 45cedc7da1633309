//! Identity group lookup.
//!
//! # Responsibility
//! - Find every active contact sharing the sighting's email or phone.
//! - Expand matches to their full connected identity group(s): a matched
//!   secondary pulls in its primary, a primary pulls in all its secondaries.
//!
//! # Invariants
//! - Read-only: no mutation, no side effects beyond log events.
//! - The returned set is deduplicated by id and ordered by
//!   `(created_at, id)` ascending.
//! - A sighting may touch more than one group (email in one, phone in
//!   another); all touched groups are returned in full.

use crate::model::contact::{Contact, ContactId};
use crate::model::sighting::Sighting;
use crate::repo::contact_repo::ContactRepository;
use crate::service::{IdentityError, IdentityResult, IntegrityViolation};
use log::debug;
use std::collections::BTreeMap;

/// Returns the union of all identity groups touched by the sighting.
///
/// An empty sighting side never matches; with both sides empty the result is
/// the empty set (re-checked here so no caller mistake turns into a scan).
pub fn find_group<R: ContactRepository>(
    repo: &R,
    sighting: &Sighting,
) -> IdentityResult<Vec<Contact>> {
    let matched = repo.find_by_email_or_phone(sighting.email(), sighting.phone())?;
    let direct_matches = matched.len();

    let mut group: BTreeMap<ContactId, Contact> = BTreeMap::new();
    for contact in matched {
        let primary = resolve_group_primary(repo, &contact)?;
        if group.contains_key(&primary.id) {
            // This component was already expanded via an earlier match.
            continue;
        }

        for secondary in repo.list_secondaries(primary.id)? {
            group.insert(secondary.id, secondary);
        }
        group.insert(primary.id, primary);
    }

    let mut contacts: Vec<Contact> = group.into_values().collect();
    contacts.sort_by_key(Contact::primacy_key);

    debug!(
        "event=find_group module=lookup status=ok direct_matches={} group_size={}",
        direct_matches,
        contacts.len()
    );

    Ok(contacts)
}

/// Resolves the primary anchoring the matched record's group, failing closed
/// on dangling or chained links.
fn resolve_group_primary<R: ContactRepository>(
    repo: &R,
    contact: &Contact,
) -> IdentityResult<Contact> {
    if contact.is_primary() {
        return Ok(contact.clone());
    }

    let linked_primary_id = contact.linked_primary_id.ok_or_else(|| {
        IdentityError::Integrity(IntegrityViolation::CorruptRecord(format!(
            "secondary contact {} has no linked primary id",
            contact.id
        )))
    })?;

    let primary = repo.get_contact(linked_primary_id, false)?.ok_or(
        IdentityError::Integrity(IntegrityViolation::DanglingLink {
            secondary_id: contact.id,
            linked_primary_id,
        }),
    )?;

    if !primary.is_primary() {
        return Err(IdentityError::Integrity(
            IntegrityViolation::LinkToSecondary {
                secondary_id: contact.id,
                linked_primary_id,
            },
        ));
    }

    Ok(primary)
}
