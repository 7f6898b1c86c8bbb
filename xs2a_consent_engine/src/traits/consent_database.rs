use chrono::NaiveDate;
use thiserror::Error;

use crate::{
    db_types::{
        AccountAccess,
        AuthorisationId,
        ChecksumType,
        Consent,
        ConsentId,
        ConsentStatus,
        Payment,
        PaymentId,
        ScaStatus,
    },
    traits::{
        data_objects::{AuthorisationCommit, CommitResult},
        AspspConsentDataManagement,
        AuthorisationManagement,
        ChecksumManagement,
        ConsentActionLog,
        ConsentManagement,
        ConsentUsageManagement,
        PaymentManagement,
    },
};

#[derive(Debug, Clone, Error)]
pub enum ConsentDatabaseError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Consent {0} does not exist")]
    ConsentNotFound(ConsentId),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("Authorisation {0} does not exist")]
    AuthorisationNotFound(AuthorisationId),
    #[error("Authorisation {id} was modified by another request. Expected it to be in status {expected}")]
    ConcurrentModification { id: AuthorisationId, expected: ScaStatus },
    #[error("{0} is finalised and its status cannot change")]
    AlreadyFinalised(String),
    #[error("The {0} checksum is sealed and the field cannot change")]
    ProtectedFieldSealed(ChecksumType),
    #[error("Could not serialize or deserialize a stored value. {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for ConsentDatabaseError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for ConsentDatabaseError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// The highest level of behaviour for consent engine backends.
///
/// Every method here touches more than one record and must run in a single atomic transaction.
#[allow(async_fn_in_trait)]
pub trait ConsentDatabase:
    Clone
    + ConsentManagement
    + PaymentManagement
    + AuthorisationManagement
    + ConsentUsageManagement
    + ConsentActionLog
    + ChecksumManagement
    + AspspConsentDataManagement
{
    /// The URL of the database
    fn url(&self) -> &str;

    /// Applies the result of a single authorisation step.
    ///
    /// * The authorisation is updated only if it is still in `commit.expected_status`. Otherwise
    ///   [`ConsentDatabaseError::ConcurrentModification`] is returned and nothing changes.
    /// * A consent or payment status change is rejected with [`ConsentDatabaseError::AlreadyFinalised`] if the
    ///   business object has already reached a finalised status.
    /// * The multilevel SCA flag is only ever raised, and only written if it is not already set.
    /// * If requested, and the consent is now `valid`, older non-finalised recurring consents of the same TPP, PSUs
    ///   and consent type are terminated by the TPP.
    async fn commit_authorisation_update(&self, commit: AuthorisationCommit)
        -> Result<CommitResult, ConsentDatabaseError>;

    /// Rejects a consent whose confirmation window has passed. The consent moves to `rejected`, every
    /// non-finalised authorisation moves to `failed`, and the last action date is set to `today`.
    ///
    /// Consents that are already confirmed or finalised are returned untouched.
    async fn reject_unconfirmed_consent(
        &self,
        consent_id: &ConsentId,
        today: NaiveDate,
    ) -> Result<Consent, ConsentDatabaseError>;

    /// Forces a consent into a finalised status (expiry or revocation). Non-finalised authorisations fail.
    ///
    /// Returns the consent untouched if it is already in `status`. A consent in a different finalised status
    /// cannot be changed and [`ConsentDatabaseError::AlreadyFinalised`] is returned.
    async fn finalise_consent(
        &self,
        consent_id: &ConsentId,
        status: ConsentStatus,
        today: NaiveDate,
    ) -> Result<Consent, ConsentDatabaseError>;

    /// Rejects a payment that is still `RCVD` after its confirmation window. Its open authorisations fail.
    /// Payments in any other status are returned untouched.
    async fn reject_unconfirmed_payment(&self, payment_id: &PaymentId) -> Result<Payment, ConsentDatabaseError>;

    /// Stores `digest` for the given checksum type, unless the field has become write-once.
    ///
    /// A digest may be written while the consent is neither finalised nor valid, or if no digest has been stored
    /// for that type yet. Returns whether the digest was written. The check and the write are atomic.
    async fn store_checksum_if_updatable(
        &self,
        consent_id: &ConsentId,
        checksum_type: ChecksumType,
        digest: &[u8],
    ) -> Result<bool, ConsentDatabaseError>;

    /// Replaces the access the bank granted, together with its `ASPSP_ACCOUNT_ACCESSES` digest.
    ///
    /// Writing an access whose digest matches the stored one is a no-op. A different access is only written while
    /// the digest is still updatable, otherwise [`ConsentDatabaseError::ProtectedFieldSealed`] is returned. Finalised
    /// consents give [`ConsentDatabaseError::AlreadyFinalised`]. The check, the access and the digest are written
    /// atomically.
    async fn update_protected_aspsp_access(
        &self,
        consent_id: &ConsentId,
        access: &AccountAccess,
        digest: &[u8],
    ) -> Result<Consent, ConsentDatabaseError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), ConsentDatabaseError> {
        Ok(())
    }
}
