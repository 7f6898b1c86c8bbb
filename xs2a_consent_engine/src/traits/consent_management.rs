use chrono::NaiveDate;

use crate::{
    db_types::{AccountAccess, Consent, ConsentId, NewConsent, TppId},
    traits::ConsentDatabaseError,
};

#[allow(async_fn_in_trait)]
pub trait ConsentManagement {
    /// Stores a new consent in `received` status and returns the stored record.
    async fn insert_consent(&self, consent: NewConsent) -> Result<Consent, ConsentDatabaseError>;

    async fn fetch_consent(&self, consent_id: &ConsentId) -> Result<Option<Consent>, ConsentDatabaseError>;

    /// All consents held by the TPP, oldest first.
    async fn fetch_consents_for_tpp(&self, tpp_id: &TppId) -> Result<Vec<Consent>, ConsentDatabaseError>;

    /// Replaces the access the bank has granted on the consent.
    async fn update_aspsp_access(
        &self,
        consent_id: &ConsentId,
        access: &AccountAccess,
    ) -> Result<Consent, ConsentDatabaseError>;

    async fn update_last_action_date(&self, consent_id: &ConsentId, date: NaiveDate)
        -> Result<(), ConsentDatabaseError>;
}
