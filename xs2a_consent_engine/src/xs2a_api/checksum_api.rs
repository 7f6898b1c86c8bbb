//! Tamper protection for consent parameters.
//!
//! Each protected field of a consent has its own digest. Digests may be rewritten freely while the PSU is still
//! authorising the consent. Once the consent is valid (or finalised) a stored digest can no longer change, so any
//! later attempt to alter the field is detected.
use std::fmt::Debug;

use log::*;
use serde::Serialize;

use crate::{
    db_types::{AccountAccess, ChecksumType, Consent, ConsentId},
    helpers::calculate_checksum,
    traits::{ConsentDatabase, ConsentDatabaseError},
    xs2a_api::errors::ChecksumError,
};

pub struct ChecksumApi<B> {
    db: B,
}

impl<B> Debug for ChecksumApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChecksumApi")
    }
}

impl<B> ChecksumApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The digest of the consent field protected by `checksum_type`.
    pub fn checksum_value(consent: &Consent, checksum_type: ChecksumType) -> Result<Vec<u8>, ChecksumError> {
        let digest = match checksum_type {
            ChecksumType::AccountAccess => calculate_checksum(&consent.tpp_access)?,
            ChecksumType::AspspAccountAccess => calculate_checksum(&consent.aspsp_access)?,
            ChecksumType::FrequencyPerDay => calculate_checksum(&consent.frequency_per_day)?,
            ChecksumType::ValidUntil => calculate_checksum(&consent.valid_until)?,
            ChecksumType::RecurringIndicator => calculate_checksum(&consent.recurring_indicator)?,
            ChecksumType::CombinedServiceIndicator => calculate_checksum(&consent.combined_service_indicator)?,
        };
        Ok(digest)
    }
}

impl<B> ChecksumApi<B>
where B: ConsentDatabase
{
    /// Stores the digest of `value` for the given field. Returns `false`, and leaves the stored digest alone, if the
    /// field has become write-once.
    pub async fn update_checksum<T: Serialize + ?Sized>(
        &self,
        consent: &Consent,
        checksum_type: ChecksumType,
        value: &T,
    ) -> Result<bool, ChecksumError> {
        let digest = calculate_checksum(value)?;
        let written = self.db.store_checksum_if_updatable(&consent.consent_id, checksum_type, &digest).await?;
        if written {
            trace!("🧮️ {checksum_type} checksum stored for consent [{}]", consent.consent_id);
        } else {
            debug!("🧮️ {checksum_type} checksum for consent [{}] is sealed. Not updated.", consent.consent_id);
        }
        Ok(written)
    }

    /// Stores digests for every protected field that is still updatable. Returns the fields that were written.
    pub async fn update_checksums(&self, consent: &Consent) -> Result<Vec<ChecksumType>, ChecksumError> {
        let mut written = Vec::with_capacity(ChecksumType::ALL.len());
        for checksum_type in ChecksumType::ALL {
            let digest = Self::checksum_value(consent, checksum_type)?;
            if self.db.store_checksum_if_updatable(&consent.consent_id, checksum_type, &digest).await? {
                written.push(checksum_type);
            }
        }
        trace!("🧮️ {} checksums refreshed for consent [{}]", written.len(), consent.consent_id);
        Ok(written)
    }

    /// Checks the current consent fields against their stored digests. Fields without a digest are not checked.
    pub async fn verify_consent(&self, consent: &Consent) -> Result<(), ChecksumError> {
        for stored in self.db.fetch_checksums(&consent.consent_id).await? {
            let current = Self::checksum_value(consent, stored.checksum_type)?;
            if current != stored.digest {
                warn!(
                    "🧮️ {} of consent [{}] no longer matches its checksum",
                    stored.checksum_type, consent.consent_id
                );
                return Err(ChecksumError::VerificationFailed(stored.checksum_type));
            }
        }
        Ok(())
    }

    /// Replaces the bank-granted access of a consent and reseals it in one step. Once the consent is valid, only
    /// the access that is already sealed may be written.
    pub async fn replace_aspsp_access(
        &self,
        consent_id: &ConsentId,
        access: &AccountAccess,
    ) -> Result<Consent, ChecksumError> {
        let digest = calculate_checksum(access)?;
        match self.db.update_protected_aspsp_access(consent_id, access, &digest).await {
            Ok(consent) => Ok(consent),
            Err(ConsentDatabaseError::ProtectedFieldSealed(checksum_type)) => {
                warn!("🧮️ Refusing to change {checksum_type} of consent [{consent_id}]");
                Err(ChecksumError::VerificationFailed(checksum_type))
            },
            Err(e) => Err(e.into()),
        }
    }
}
