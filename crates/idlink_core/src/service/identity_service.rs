//! Sighting reconciliation entry point.
//!
//! # Responsibility
//! - Run one sighting through lookup, linking, and consolidation inside a
//!   single atomic store transaction.
//! - Classify failures for the transport collaborator and emit metadata-only
//!   log events.
//!
//! # Invariants
//! - The transaction either fully commits (all graph invariants hold) or
//!   fully rolls back with no partial mutation visible.
//! - The write lock is taken up front (`IMMEDIATE`), so concurrent sightings
//!   on the same rows serialize at the store; the loser surfaces as a
//!   retryable fault.
//! - No email or phone value ever reaches the log stream.

use crate::model::sighting::Sighting;
use crate::repo::contact_repo::SqliteContactRepository;
use crate::service::consolidator::{self, IdentitySummary};
use crate::service::{linker, lookup, IdentityResult};
use log::{debug, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::time::Instant;

/// Reconciles one sighting and returns the consolidated identity.
///
/// The connection must come from [`crate::db::open_db`] (or the in-memory
/// variant) so migrations are applied; the repository re-checks readiness
/// before the first query.
///
/// # Errors
/// - [`crate::service::IdentityError::Retryable`] when the transaction was
///   aborted with zero mutation and the whole sighting is safe to replay.
/// - [`crate::service::IdentityError::Integrity`] when the persisted graph
///   violated an invariant; nothing was mutated or repaired.
pub fn identify(conn: &mut Connection, sighting: &Sighting) -> IdentityResult<IdentitySummary> {
    let started_at = Instant::now();
    debug!(
        "event=identify module=service status=start has_email={} has_phone={}",
        sighting.email().is_some(),
        sighting.phone().is_some()
    );

    match identify_in_transaction(conn, sighting) {
        Ok(summary) => {
            info!(
                "event=identify module=service status=ok primary_id={} emails={} phones={} secondaries={} duration_ms={}",
                summary.primary_id,
                summary.emails.len(),
                summary.phones.len(),
                summary.secondary_ids.len(),
                started_at.elapsed().as_millis()
            );
            Ok(summary)
        }
        Err(err) => {
            warn!(
                "event=identify module=service status=error error_code={} duration_ms={} error={}",
                err.error_code(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn identify_in_transaction(
    conn: &mut Connection,
    sighting: &Sighting,
) -> IdentityResult<IdentitySummary> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let summary = {
        let repo = SqliteContactRepository::try_new(&tx)?;
        let matched = lookup::find_group(&repo, sighting)?;
        let primary = linker::reconcile(&repo, sighting, &matched)?;
        consolidator::consolidate(&repo, &primary)?
    };

    // Dropping the transaction on any error path above rolls it back, so a
    // failed reconciliation leaves no partial mutation behind.
    tx.commit()?;

    Ok(summary)
}
