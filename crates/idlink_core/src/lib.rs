//! Core domain logic for contact identity reconciliation.
//! This crate is the single source of truth for linking invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LoggingInitError};
pub use model::contact::{Contact, ContactId, ContactValidationError, Precedence};
pub use model::sighting::{Sighting, SightingError};
pub use repo::contact_repo::{
    ContactRepository, RepoError, RepoResult, SqliteContactRepository,
};
pub use service::consolidator::IdentitySummary;
pub use service::identity_service::identify;
pub use service::{IdentityError, IdentityResult, IntegrityViolation, TransientFault};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
