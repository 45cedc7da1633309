//! Linking decision engine.
//!
//! # Responsibility
//! - Classify a matched identity group against one sighting and apply the
//!   creation/merge state machine, returning the surviving primary.
//!
//! # Invariants
//! - Must run inside the caller's transaction; every mutation here commits
//!   or rolls back as one unit with the lookup that preceded it.
//! - Merge order is fixed: a loser's secondaries are re-pointed to the
//!   winner before the loser itself is demoted, so no secondary ever points
//!   at a secondary, even transiently.
//! - The winner of a merge is the oldest primary by `(created_at, id)`.
//! - The "does the sighting add anything" check reads the group exactly once
//!   from the current transaction snapshot, after any merge completed.

use crate::model::contact::{Contact, ContactId};
use crate::model::sighting::Sighting;
use crate::repo::contact_repo::{ContactRepository, RepoError};
use crate::service::{IdentityError, IdentityResult, IntegrityViolation, TransientFault};
use log::debug;
use std::collections::BTreeSet;

/// Reconciles one sighting against its matched identity group(s).
///
/// `matched` must be the full connected expansion produced by
/// [`crate::service::lookup::find_group`] on the same transaction snapshot.
pub fn reconcile<R: ContactRepository>(
    repo: &R,
    sighting: &Sighting,
    matched: &[Contact],
) -> IdentityResult<Contact> {
    // S0: nothing matched, the sighting is a brand-new identity.
    if matched.is_empty() {
        let created = repo.create_primary(sighting.email(), sighting.phone())?;
        debug!(
            "event=reconcile module=linker state=new_identity primary_id={}",
            created.id
        );
        return Ok(created);
    }

    // S1: some record already holds exactly this pair; nothing to write.
    if let Some(existing) = matched
        .iter()
        .find(|contact| matches_sighting_exactly(contact, sighting))
    {
        let primary = resolve_primary_of(repo, matched, existing)?;
        debug!(
            "event=reconcile module=linker state=exact_duplicate contact_id={} primary_id={}",
            existing.id, primary.id
        );
        return Ok(primary);
    }

    let mut primaries: Vec<&Contact> = matched.iter().filter(|c| c.is_primary()).collect();
    primaries.sort_by_key(|contact| contact.primacy_key());

    // Lookup expansion always pulls a primary in; a group without one means
    // the stored graph is broken. Fail closed.
    let Some(winner) = primaries.first().copied() else {
        return Err(IdentityError::Integrity(
            IntegrityViolation::GroupWithoutPrimary {
                sample_id: matched[0].id,
            },
        ));
    };

    // S3: more than one distinct primary was touched; flatten the newer
    // groups onto the oldest before considering the sighting itself.
    if primaries.len() > 1 {
        merge_groups(repo, winner, &primaries[1..])?;
    }
    let primary = winner.clone();

    // S2 (and the tail of S3): attach the sighting as a new secondary iff it
    // contributes an email or phone the group does not already know.
    attach_if_new_information(repo, sighting, &primary)?;

    Ok(primary)
}

/// Flattens every losing primary (and its secondaries) onto the winner.
///
/// Losers are processed in ascending `(created_at, id)` order; for each, the
/// existing secondaries are re-pointed first, then the loser is demoted.
fn merge_groups<R: ContactRepository>(
    repo: &R,
    winner: &Contact,
    losers: &[&Contact],
) -> IdentityResult<()> {
    for loser in losers {
        let repointed = repo.repoint_secondaries(loser.id, winner.id)?;
        demote_or_retry(repo, loser.id, winner.id)?;
        debug!(
            "event=merge module=linker status=ok winner_id={} loser_id={} repointed={}",
            winner.id, loser.id, repointed
        );
    }
    Ok(())
}

/// Demotes one loser; a zero-row update means the primary this transaction
/// selected was deleted or demoted underneath it, which is a retryable
/// condition rather than corruption.
fn demote_or_retry<R: ContactRepository>(
    repo: &R,
    loser_id: ContactId,
    winner_id: ContactId,
) -> IdentityResult<()> {
    match repo.demote_primary(loser_id, winner_id) {
        Ok(()) => Ok(()),
        Err(RepoError::NotFound(id)) => Err(IdentityError::Retryable(
            TransientFault::PrimaryVanished(id),
        )),
        Err(other) => Err(other.into()),
    }
}

/// Creates a secondary carrying the full sighting pair when the sighting
/// contributes a value the group has not seen.
///
/// The group's known values are read exactly once from the current
/// transaction snapshot, so a merge completed moments earlier is visible.
fn attach_if_new_information<R: ContactRepository>(
    repo: &R,
    sighting: &Sighting,
    primary: &Contact,
) -> IdentityResult<()> {
    // Guard against creating a secondary that duplicates the primary's own
    // pair; exact full-record duplicates were already handled as S1.
    if sighting.email() == primary.email.as_deref() && sighting.phone() == primary.phone.as_deref()
    {
        return Ok(());
    }

    let known = group_knowledge(repo, primary)?;
    let new_email = sighting
        .email()
        .is_some_and(|value| !known.emails.contains(value));
    let new_phone = sighting
        .phone()
        .is_some_and(|value| !known.phones.contains(value));

    if !new_email && !new_phone {
        debug!(
            "event=reconcile module=linker state=known_information primary_id={}",
            primary.id
        );
        return Ok(());
    }

    match repo.create_secondary(primary.id, sighting.email(), sighting.phone()) {
        Ok(created) => {
            debug!(
                "event=reconcile module=linker state=new_information primary_id={} secondary_id={} new_email={} new_phone={}",
                primary.id, created.id, new_email, new_phone
            );
            Ok(())
        }
        // The primary vanished or lost primacy under us: concurrent writer.
        Err(RepoError::NotFound(id)) | Err(RepoError::LinkTargetNotPrimary(id)) => Err(
            IdentityError::Retryable(TransientFault::PrimaryVanished(id)),
        ),
        Err(other) => Err(other.into()),
    }
}

/// Union of every email and phone known across one primary's group.
struct GroupKnowledge {
    emails: BTreeSet<String>,
    phones: BTreeSet<String>,
}

fn group_knowledge<R: ContactRepository>(
    repo: &R,
    primary: &Contact,
) -> IdentityResult<GroupKnowledge> {
    let mut knowledge = GroupKnowledge {
        emails: BTreeSet::new(),
        phones: BTreeSet::new(),
    };

    knowledge.emails.extend(primary.email.iter().cloned());
    knowledge.phones.extend(primary.phone.iter().cloned());

    for secondary in repo.list_secondaries(primary.id)? {
        knowledge.emails.extend(secondary.email.into_iter());
        knowledge.phones.extend(secondary.phone.into_iter());
    }

    Ok(knowledge)
}

/// Exact-duplicate check; an absent sighting field is a wildcard against
/// the record's corresponding field.
fn matches_sighting_exactly(contact: &Contact, sighting: &Sighting) -> bool {
    let email_matches = sighting
        .email()
        .map_or(true, |value| contact.email.as_deref() == Some(value));
    let phone_matches = sighting
        .phone()
        .map_or(true, |value| contact.phone.as_deref() == Some(value));
    email_matches && phone_matches
}

/// Resolves the primary of a record found in the matched set, preferring the
/// already-fetched snapshot and falling back to the store defensively.
fn resolve_primary_of<R: ContactRepository>(
    repo: &R,
    matched: &[Contact],
    record: &Contact,
) -> IdentityResult<Contact> {
    if record.is_primary() {
        return Ok(record.clone());
    }

    let linked_primary_id = record.linked_primary_id.ok_or_else(|| {
        IdentityError::Integrity(IntegrityViolation::CorruptRecord(format!(
            "secondary contact {} has no linked primary id",
            record.id
        )))
    })?;

    let primary = match matched.iter().find(|c| c.id == linked_primary_id) {
        Some(primary) => primary.clone(),
        None => repo.get_contact(linked_primary_id, false)?.ok_or(
            IdentityError::Integrity(IntegrityViolation::DanglingLink {
                secondary_id: record.id,
                linked_primary_id,
            }),
        )?,
    };

    if !primary.is_primary() {
        return Err(IdentityError::Integrity(
            IntegrityViolation::LinkToSecondary {
                secondary_id: record.id,
                linked_primary_id,
            },
        ));
    }

    Ok(primary)
}

#[cfg(test)]
mod tests {
    use super::matches_sighting_exactly;
    use crate::model::contact::{Contact, Precedence};
    use crate::model::sighting::Sighting;

    fn record(email: Option<&str>, phone: Option<&str>) -> Contact {
        Contact {
            id: 1,
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            precedence: Precedence::Primary,
            linked_primary_id: None,
            created_at: 100,
            updated_at: 100,
            deleted_at: None,
        }
    }

    #[test]
    fn absent_sighting_field_is_a_wildcard() {
        let contact = record(Some("a@example.com"), Some("+1234567890"));

        let email_only = Sighting::new(Some("a@example.com"), None).unwrap();
        assert!(matches_sighting_exactly(&contact, &email_only));

        let phone_only = Sighting::new(None, Some("+1234567890")).unwrap();
        assert!(matches_sighting_exactly(&contact, &phone_only));
    }

    #[test]
    fn present_sighting_field_must_match_record_field() {
        let contact = record(Some("a@example.com"), None);

        let full = Sighting::new(Some("a@example.com"), Some("+1234567890")).unwrap();
        assert!(!matches_sighting_exactly(&contact, &full));

        let other = Sighting::new(Some("b@example.com"), None).unwrap();
        assert!(!matches_sighting_exactly(&contact, &other));
    }
}
