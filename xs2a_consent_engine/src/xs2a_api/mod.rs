//! # XS2A consent engine public API
//!
//! The `xs2a_api` module exposes the programmatic API of the consent engine. Every API is generic over a storage
//! backend that implements [`ConsentDatabase`](crate::traits::ConsentDatabase).
//!
//! * [`authorisation_flow_api`] creates authorisations, advances them with PSU input and applies bank callbacks.
//!   It is parameterised with an [`AuthorisationProcessor`](authorisation_processor::AuthorisationProcessor): one
//!   for AIS consents, one for payment initiation and one for payment cancellation.
//! * [`consent_api`] is the consent read/write path, wrapped in lazy expiry and checksum protection.
//! * [`expiration_api`] applies forced status transitions: confirmation timeouts, date expiry, used-up one-off
//!   consents and revocation.
//! * [`checksum_api`], [`usage_api`] and [`action_recorder`] are the supporting engines.
//!
//! # API usage
//!
//! ```rust,ignore
//! use xs2a_consent_engine::{AisAuthorisationProcessor, AspspProfile, AuthorisationFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let profile = AspspProfile::from_env_or_default();
//! let resolver = ScaApproachStrategyResolver::from_profile(&profile);
//! let api = AuthorisationFlowApi::new(db, AisAuthorisationProcessor::new(my_spi), resolver, profile, producers);
//! let response = api.update_authorisation(request).await?;
//! ```
pub mod action_recorder;
pub mod ais_processor;
pub mod authorisation_flow_api;
pub mod authorisation_processor;
pub mod checksum_api;
pub mod consent_api;
pub mod errors;
pub mod expiration_api;
pub mod pis_processor;
pub mod processor_objects;
pub mod sca_strategy;
pub mod usage_api;
