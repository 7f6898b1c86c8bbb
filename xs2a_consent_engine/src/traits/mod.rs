//! # Backend contracts
//!
//! This module defines the behaviour that a storage backend must provide in order to support the consent engine.
//! The engine never talks to a database directly. Each API is generic over a backend that implements the traits it
//! needs.
//!
//! * [`ConsentDatabase`] is the highest level of behaviour. It holds every operation that touches more than one
//!   record and therefore has to be atomic: committing an authorisation step together with its consent or payment
//!   status, rejecting unconfirmed consents, forced finalisation and the checksum check-and-set.
//! * [`ConsentManagement`], [`PaymentManagement`] and [`AuthorisationManagement`] are plain record access.
//! * [`ConsentUsageManagement`] keeps the monotonically growing usage counters.
//! * [`ConsentActionLog`] is the append-only audit log of consent checks.
//! * [`ChecksumManagement`] reads stored consent digests.
//! * [`AspspConsentDataManagement`] stores the opaque blob the bank keeps alongside a consent or payment.
mod aspsp_data_management;
mod authorisation_management;
mod checksum_management;
mod consent_action_log;
mod consent_database;
mod consent_management;
mod consent_usage_management;
mod data_objects;
mod payment_management;

pub use aspsp_data_management::AspspConsentDataManagement;
pub use authorisation_management::AuthorisationManagement;
pub use checksum_management::ChecksumManagement;
pub use consent_action_log::ConsentActionLog;
pub use consent_database::{ConsentDatabase, ConsentDatabaseError};
pub use consent_management::ConsentManagement;
pub use consent_usage_management::ConsentUsageManagement;
pub use data_objects::{
    AuthorisationCommit,
    BusinessObjectUpdate,
    CommitResult,
    ConsentStatusChange,
    PaymentStatusChange,
};
pub use payment_management::PaymentManagement;
