//! `ConsentApi` wraps every consent read and write in the freshness and integrity checks: lazy expiry before the
//! consent is looked at, checksum sealing after it is written, and the checksum guard before protected fields change.
//!
//! Reads, usage accounting and revocation of one consent are serialised on the consent id, so the daily frequency
//! limit and the one-off maximum hold for concurrent requests.
use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    config::AspspProfile,
    db_types::{
        AccountAccess,
        AccountAccessType,
        ActionStatus,
        AisConsentRequestType,
        Consent,
        ConsentAction,
        ConsentId,
        ConsentStatus,
        NewConsent,
        TppId,
    },
    events::EventProducers,
    helpers::KeyedLocks,
    traits::ConsentDatabase,
    xs2a_api::{
        action_recorder::ConsentActionRecorder,
        checksum_api::ChecksumApi,
        errors::ConsentApiError,
        expiration_api::{ConsentExpirationApi, RevocationSource},
        usage_api::UsageCounter,
    },
};

/// A TPP reading a resource under a consent.
#[derive(Debug, Clone)]
pub struct ConsentUsageRequest {
    pub consent_id: ConsentId,
    pub tpp_id: TppId,
    /// The account (or card account) being read
    pub resource_id: String,
    pub access_type: AccountAccessType,
}

impl ConsentUsageRequest {
    pub fn new(consent_id: ConsentId, tpp_id: TppId, resource_id: &str, access_type: AccountAccessType) -> Self {
        Self { consent_id, tpp_id, resource_id: resource_id.to_string(), access_type }
    }
}

pub struct ConsentApi<B> {
    db: B,
    profile: AspspProfile,
    expiration: ConsentExpirationApi<B>,
    checksums: ChecksumApi<B>,
    usage: UsageCounter<B>,
    recorder: ConsentActionRecorder<B>,
    locks: KeyedLocks,
}

impl<B> Debug for ConsentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConsentApi")
    }
}

impl<B> ConsentApi<B>
where B: ConsentDatabase
{
    pub fn new(db: B, profile: AspspProfile, producers: EventProducers) -> Self {
        Self {
            expiration: ConsentExpirationApi::new(db.clone(), producers),
            checksums: ChecksumApi::new(db.clone()),
            usage: UsageCounter::new(db.clone()),
            recorder: ConsentActionRecorder::new(db.clone()),
            db,
            profile,
            locks: KeyedLocks::new(),
        }
    }

    /// Shares a lock registry with other APIs working on the same database.
    pub fn with_locks(mut self, locks: KeyedLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn expiration(&self) -> &ConsentExpirationApi<B> {
        &self.expiration
    }

    pub fn checksums(&self) -> &ChecksumApi<B> {
        &self.checksums
    }

    pub fn usage(&self) -> &UsageCounter<B> {
        &self.usage
    }

    /// Stores a new consent and seals its protected fields.
    pub async fn create_consent(&self, consent: NewConsent) -> Result<Consent, ConsentApiError> {
        let consent = self.db.insert_consent(consent).await?;
        self.checksums.update_checksums(&consent).await?;
        info!("📒️ Consent [{}] created for TPP {}", consent.consent_id, consent.tpp_id);
        Ok(consent)
    }

    /// Fetches a consent, applying confirmation and date expiry first.
    pub async fn fetch_consent(&self, consent_id: &ConsentId) -> Result<Consent, ConsentApiError> {
        let consent = self
            .db
            .fetch_consent(consent_id)
            .await?
            .ok_or_else(|| ConsentApiError::ConsentNotFound(consent_id.clone()))?;
        Ok(self.expiration.refresh_consent(consent, &self.profile).await?)
    }

    /// Replaces the access the bank granted. Once the consent is valid, the granted access can no longer change.
    pub async fn update_aspsp_account_access(
        &self,
        consent_id: &ConsentId,
        access: AccountAccess,
    ) -> Result<Consent, ConsentApiError> {
        let _guard = self.locks.lock(consent_id.as_str()).await;
        let consent = self.fetch_consent(consent_id).await?;
        if consent.status.is_finalised() {
            return Err(ConsentApiError::InvalidStatus { id: consent_id.clone(), status: consent.status });
        }
        let consent = self.checksums.replace_aspsp_access(consent_id, &access).await?;
        debug!("📒️ Bank-granted access of consent [{consent_id}] updated");
        Ok(consent)
    }

    /// Checks and records one read of a resource under a consent.
    ///
    /// Every outcome is written to the action log. A successful read stamps the last action date and may use up a
    /// one-off consent, in which case the returned consent is already expired.
    pub async fn use_consent(&self, request: ConsentUsageRequest) -> Result<Consent, ConsentApiError> {
        let ConsentUsageRequest { consent_id, tpp_id, resource_id, access_type } = request;
        let _guard = self.locks.lock(consent_id.as_str()).await;
        let consent = match self.db.fetch_consent(&consent_id).await? {
            Some(c) if c.tpp_id == tpp_id => c,
            Some(_) => {
                warn!("📒️ TPP {tpp_id} tried to use consent [{consent_id}], which belongs to another TPP");
                self.recorder.record_consent_action(&consent_id, ActionStatus::ConsentNotFound, &tpp_id).await;
                return Err(ConsentApiError::TppMismatch(consent_id));
            },
            None => {
                self.recorder.record_consent_action(&consent_id, ActionStatus::ConsentNotFound, &tpp_id).await;
                return Err(ConsentApiError::ConsentNotFound(consent_id));
            },
        };
        let consent = self.expiration.refresh_consent(consent, &self.profile).await?;
        if consent.status != ConsentStatus::Valid {
            self.recorder.record_consent_action(&consent_id, ActionStatus::ConsentInvalidStatus, &tpp_id).await;
            return Err(ConsentApiError::InvalidStatus { id: consent_id, status: consent.status });
        }
        if let Err(e) = self.checksums.verify_consent(&consent).await {
            self.recorder.record_consent_action(&consent_id, ActionStatus::Failure, &tpp_id).await;
            return Err(e.into());
        }
        let granted = consent.aspsp_access.grants(access_type, &resource_id) ||
            (consent.request_type == AisConsentRequestType::AllAvailableAccounts &&
                access_type == AccountAccessType::Accounts);
        if !granted {
            self.recorder.record_consent_action(&consent_id, ActionStatus::BadPayload, &tpp_id).await;
            return Err(ConsentApiError::AccessNotGranted { id: consent_id, resource_id });
        }
        let today = Utc::now().date_naive();
        if let Err(e) = self.usage.check_frequency(&consent, &resource_id, today).await {
            self.recorder.record_consent_action(&consent_id, ActionStatus::ConsentLimitExceeded, &tpp_id).await;
            return Err(e);
        }
        self.usage.record_usage(&consent_id, &resource_id, today).await?;
        self.db.update_last_action_date(&consent_id, today).await?;
        self.recorder.record_consent_action(&consent_id, ActionStatus::Success, &tpp_id).await;
        let mut consent = consent;
        consent.last_action_date = Some(today);
        Ok(self.expiration.expire_if_one_off_exhausted(consent).await?)
    }

    /// Records the number of transactions the bank returned for a resource. One-off consents allow one detail read
    /// per transaction.
    pub async fn record_number_of_transactions(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
        number_of_transactions: i64,
    ) -> Result<(), ConsentApiError> {
        Ok(self.usage.save_number_of_transactions(consent_id, resource_id, number_of_transactions).await?)
    }

    pub async fn revoke_by_psu(&self, consent_id: &ConsentId) -> Result<Consent, ConsentApiError> {
        let _guard = self.locks.lock(consent_id.as_str()).await;
        Ok(self.expiration.revoke_consent(consent_id, RevocationSource::Psu).await?)
    }

    pub async fn terminate_by_tpp(&self, consent_id: &ConsentId, tpp_id: &TppId) -> Result<Consent, ConsentApiError> {
        let _guard = self.locks.lock(consent_id.as_str()).await;
        let consent = self
            .db
            .fetch_consent(consent_id)
            .await?
            .ok_or_else(|| ConsentApiError::ConsentNotFound(consent_id.clone()))?;
        if &consent.tpp_id != tpp_id {
            return Err(ConsentApiError::TppMismatch(consent_id.clone()));
        }
        Ok(self.expiration.revoke_consent(consent_id, RevocationSource::Tpp).await?)
    }

    pub async fn fetch_actions(&self, consent_id: &ConsentId) -> Result<Vec<ConsentAction>, ConsentApiError> {
        Ok(self.recorder.fetch_actions(consent_id).await?)
    }
}
