//! XS2A Consent Engine
//!
//! The consent engine is the heart of a PSD2 access-to-account (XS2A) interface. It drives consent and payment
//! authorisations through strong customer authentication (SCA), decides when consents must be forcibly ended, and
//! protects consent parameters from being changed after the PSU has approved them.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`traits`] and the SQLite backend). The engine never talks to a database directly. Each API is
//!    generic over a backend implementing the traits it needs. The data types shared with the backends live in
//!    [`db_types`].
//! 2. The bank connector interface ([`spi`]). Every bank-side decision goes through these traits.
//! 3. The public API ([`mod@xs2a_api`]): the SCA state machine, the consent lifecycle and checksum engines.
//!
//! Consent, SCA and payment status changes are published as events (see [`events`]), so that notification services
//! can hook into them without touching the engine.
pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod spi;
pub mod traits;
mod xs2a_api;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::AspspProfile;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{ConsentDatabase, ConsentDatabaseError};
pub use xs2a_api::{
    action_recorder::ConsentActionRecorder,
    ais_processor::AisAuthorisationProcessor,
    authorisation_flow_api::AuthorisationFlowApi,
    authorisation_processor::AuthorisationProcessor,
    checksum_api::ChecksumApi,
    consent_api::{ConsentApi, ConsentUsageRequest},
    errors,
    expiration_api::{ConsentExpirationApi, RevocationSource},
    pis_processor::PaymentAuthorisationProcessor,
    processor_objects,
    sca_strategy,
    usage_api::UsageCounter,
};
