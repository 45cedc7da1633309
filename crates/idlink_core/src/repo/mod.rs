//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the contact-store data access contract used by reconciliation.
//! - Isolate SQLite query details from the linking/consolidation services.
//!
//! # Invariants
//! - Repository writes enforce the contact pair and link-shape constraints
//!   before SQL mutations.
//! - Repository reads reject invalid persisted state instead of masking it.
//! - All queries filter soft-deleted rows unless explicitly told otherwise.

pub mod contact_repo;
