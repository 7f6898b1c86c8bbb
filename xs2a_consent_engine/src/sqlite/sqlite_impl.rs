//! `SqliteDatabase` is the SQLite implementation of the consent engine backend traits.
use std::fmt::Debug;

use chrono::NaiveDate;
use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{
    aspsp_data,
    authorisations,
    checksums,
    consent_actions,
    consents,
    db_url,
    new_pool,
    payments,
    usage,
};
use crate::{
    db_types::{
        AccountAccess,
        ActionStatus,
        Authorisation,
        AuthorisationId,
        AuthorisationType,
        ChecksumType,
        ChecksumValue,
        Consent,
        ConsentAction,
        ConsentId,
        ConsentStatus,
        NewAuthorisation,
        NewConsent,
        NewPayment,
        Payment,
        PaymentId,
        TppId,
        TransactionStatus,
    },
    helpers::is_checksum_updatable,
    traits::{
        AspspConsentDataManagement,
        AuthorisationCommit,
        AuthorisationManagement,
        BusinessObjectUpdate,
        ChecksumManagement,
        CommitResult,
        ConsentActionLog,
        ConsentDatabase,
        ConsentDatabaseError,
        ConsentManagement,
        ConsentStatusChange,
        ConsentUsageManagement,
        PaymentManagement,
        PaymentStatusChange,
    },
};

const CONSENT_AUTHORISATIONS: [AuthorisationType; 1] = [AuthorisationType::Consent];
const PAYMENT_AUTHORISATIONS: [AuthorisationType; 1] = [AuthorisationType::PisCreation];

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the `XS2A_DATABASE_URL` environment variable (or the default).
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies the consent part of an authorisation commit. Returns the status changes that resulted.
    async fn apply_consent_update(
        consent_id: &ConsentId,
        status: Option<ConsentStatus>,
        multilevel_sca_required: Option<bool>,
        terminate_superseded: bool,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<ConsentStatusChange>, ConsentDatabaseError> {
        let mut consent = consents::fetch_consent(consent_id, &mut *conn)
            .await?
            .ok_or_else(|| ConsentDatabaseError::ConsentNotFound(consent_id.clone()))?;
        let mut changes = Vec::new();
        if let Some(new_status) = status.filter(|s| *s != consent.status) {
            if consent.status.is_finalised() {
                return Err(ConsentDatabaseError::AlreadyFinalised(format!("Consent {consent_id}")));
            }
            let old_status = consent.status;
            consent = consents::update_status(consent_id, new_status, &mut *conn).await?;
            changes.push(ConsentStatusChange { consent: consent.clone(), old_status });
        }
        if multilevel_sca_required == Some(true) && consents::set_multilevel_sca_required(consent_id, &mut *conn).await? {
            debug!("🗃️ Consent [{consent_id}] now requires multilevel SCA");
            consent.multilevel_sca_required = true;
            if let Some(change) = changes.first_mut() {
                change.consent.multilevel_sca_required = true;
            }
        }
        if terminate_superseded && consent.status == ConsentStatus::Valid && consent.recurring_indicator {
            let superseded = consents::fetch_superseded_consents(&consent, &mut *conn).await?;
            for old in superseded {
                let updated = consents::update_status(&old.consent_id, ConsentStatus::TerminatedByTpp, &mut *conn).await?;
                authorisations::fail_open_authorisations(old.consent_id.as_str(), &CONSENT_AUTHORISATIONS, &mut *conn)
                    .await?;
                info!("🗃️ Consent [{}] superseded by [{consent_id}] and terminated", old.consent_id);
                changes.push(ConsentStatusChange { consent: updated, old_status: old.status });
            }
        }
        Ok(changes)
    }

    async fn apply_payment_update(
        payment_id: &PaymentId,
        status: Option<TransactionStatus>,
        multilevel_sca_required: Option<bool>,
        conn: &mut SqliteConnection,
    ) -> Result<Option<PaymentStatusChange>, ConsentDatabaseError> {
        let payment = payments::fetch_payment(payment_id, &mut *conn)
            .await?
            .ok_or_else(|| ConsentDatabaseError::PaymentNotFound(payment_id.clone()))?;
        let mut change = None;
        if let Some(new_status) = status.filter(|s| *s != payment.transaction_status) {
            if payment.transaction_status.is_finalised() {
                return Err(ConsentDatabaseError::AlreadyFinalised(format!("Payment {payment_id}")));
            }
            let updated = payments::update_status(payment_id, new_status, &mut *conn).await?;
            change = Some(PaymentStatusChange { payment: updated, old_status: payment.transaction_status });
        }
        if multilevel_sca_required == Some(true) && payments::set_multilevel_sca_required(payment_id, &mut *conn).await? {
            debug!("🗃️ Payment [{payment_id}] now requires multilevel SCA");
            if let Some(change) = change.as_mut() {
                change.payment.multilevel_sca_required = true;
            }
        }
        Ok(change)
    }
}

impl ConsentDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn commit_authorisation_update(
        &self,
        commit: AuthorisationCommit,
    ) -> Result<CommitResult, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let authorisation = authorisations::update_if_status(
            &commit.authorisation_id,
            commit.expected_status,
            commit.new_status,
            commit.sca_approach,
            commit.authentication_method_id.as_deref(),
            commit.psu_data.as_ref(),
            &mut tx,
        )
        .await?;
        let authorisation = match authorisation {
            Some(a) => a,
            None => {
                let exists = authorisations::fetch_authorisation(&commit.authorisation_id, &mut tx).await?.is_some();
                return if exists {
                    warn!(
                        "🗃️ Authorisation [{}] is no longer in status {}. Rolling back.",
                        commit.authorisation_id, commit.expected_status
                    );
                    Err(ConsentDatabaseError::ConcurrentModification {
                        id: commit.authorisation_id,
                        expected: commit.expected_status,
                    })
                } else {
                    Err(ConsentDatabaseError::AuthorisationNotFound(commit.authorisation_id))
                };
            },
        };
        let mut consent_changes = Vec::new();
        let mut payment_change = None;
        match commit.business_update {
            Some(BusinessObjectUpdate::Consent {
                consent_id,
                status,
                multilevel_sca_required,
                terminate_superseded,
            }) => {
                consent_changes = Self::apply_consent_update(
                    &consent_id,
                    status,
                    multilevel_sca_required,
                    terminate_superseded,
                    &mut tx,
                )
                .await?;
            },
            Some(BusinessObjectUpdate::Payment { payment_id, status, multilevel_sca_required }) => {
                payment_change =
                    Self::apply_payment_update(&payment_id, status, multilevel_sca_required, &mut tx).await?;
            },
            None => {},
        }
        tx.commit().await?;
        debug!(
            "🗃️ Authorisation [{}] committed: {} -> {}",
            authorisation.authorisation_id, commit.expected_status, authorisation.sca_status
        );
        Ok(CommitResult { authorisation, old_sca_status: commit.expected_status, consent_changes, payment_change })
    }

    async fn reject_unconfirmed_consent(
        &self,
        consent_id: &ConsentId,
        today: NaiveDate,
    ) -> Result<Consent, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let consent = consents::fetch_consent(consent_id, &mut tx)
            .await?
            .ok_or_else(|| ConsentDatabaseError::ConsentNotFound(consent_id.clone()))?;
        if !consent.is_not_confirmed() {
            trace!("🗃️ Consent [{consent_id}] is {}. Nothing to reject.", consent.status);
            return Ok(consent);
        }
        consents::update_status(consent_id, ConsentStatus::Rejected, &mut tx).await?;
        consents::update_last_action_date(consent_id, today, &mut tx).await?;
        authorisations::fail_open_authorisations(consent_id.as_str(), &CONSENT_AUTHORISATIONS, &mut tx).await?;
        let consent = consents::fetch_consent(consent_id, &mut tx)
            .await?
            .ok_or_else(|| ConsentDatabaseError::ConsentNotFound(consent_id.clone()))?;
        tx.commit().await?;
        info!("🗃️ Consent [{consent_id}] was not confirmed in time and has been rejected");
        Ok(consent)
    }

    async fn finalise_consent(
        &self,
        consent_id: &ConsentId,
        status: ConsentStatus,
        today: NaiveDate,
    ) -> Result<Consent, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let consent = consents::fetch_consent(consent_id, &mut tx)
            .await?
            .ok_or_else(|| ConsentDatabaseError::ConsentNotFound(consent_id.clone()))?;
        if consent.status == status {
            return Ok(consent);
        }
        if consent.status.is_finalised() {
            return Err(ConsentDatabaseError::AlreadyFinalised(format!("Consent {consent_id}")));
        }
        consents::update_status(consent_id, status, &mut tx).await?;
        consents::update_last_action_date(consent_id, today, &mut tx).await?;
        authorisations::fail_open_authorisations(consent_id.as_str(), &CONSENT_AUTHORISATIONS, &mut tx).await?;
        let consent = consents::fetch_consent(consent_id, &mut tx)
            .await?
            .ok_or_else(|| ConsentDatabaseError::ConsentNotFound(consent_id.clone()))?;
        tx.commit().await?;
        info!("🗃️ Consent [{consent_id}] is now {status}");
        Ok(consent)
    }

    async fn reject_unconfirmed_payment(&self, payment_id: &PaymentId) -> Result<Payment, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::fetch_payment(payment_id, &mut tx)
            .await?
            .ok_or_else(|| ConsentDatabaseError::PaymentNotFound(payment_id.clone()))?;
        if payment.transaction_status != TransactionStatus::Rcvd {
            return Ok(payment);
        }
        let payment = payments::update_status(payment_id, TransactionStatus::Rjct, &mut tx).await?;
        authorisations::fail_open_authorisations(payment_id.as_str(), &PAYMENT_AUTHORISATIONS, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Payment [{payment_id}] was not confirmed in time and has been rejected");
        Ok(payment)
    }

    async fn store_checksum_if_updatable(
        &self,
        consent_id: &ConsentId,
        checksum_type: ChecksumType,
        digest: &[u8],
    ) -> Result<bool, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let consent = consents::fetch_consent(consent_id, &mut tx)
            .await?
            .ok_or_else(|| ConsentDatabaseError::ConsentNotFound(consent_id.clone()))?;
        let existing = checksums::fetch_checksum(consent_id, checksum_type, &mut tx).await?;
        if !is_checksum_updatable(consent.status, existing.as_ref().map(|c| c.digest.as_slice())) {
            trace!("🗃️ {checksum_type} checksum for consent [{consent_id}] is write-once now");
            return Ok(false);
        }
        checksums::upsert_checksum(consent_id, checksum_type, digest, &mut tx).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn update_protected_aspsp_access(
        &self,
        consent_id: &ConsentId,
        access: &AccountAccess,
        digest: &[u8],
    ) -> Result<Consent, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let consent = consents::fetch_consent(consent_id, &mut tx)
            .await?
            .ok_or_else(|| ConsentDatabaseError::ConsentNotFound(consent_id.clone()))?;
        if consent.status.is_finalised() {
            return Err(ConsentDatabaseError::AlreadyFinalised(format!("Consent {consent_id}")));
        }
        let existing = checksums::fetch_checksum(consent_id, ChecksumType::AspspAccountAccess, &mut tx).await?;
        let stored = existing.as_ref().map(|c| c.digest.as_slice());
        if stored == Some(digest) {
            trace!("🗃️ Granted access of consent [{consent_id}] is unchanged");
            return Ok(consent);
        }
        if !is_checksum_updatable(consent.status, stored) {
            warn!("🗃️ Granted access of consent [{consent_id}] is sealed in status {}", consent.status);
            return Err(ConsentDatabaseError::ProtectedFieldSealed(ChecksumType::AspspAccountAccess));
        }
        let consent = consents::update_aspsp_access(consent_id, access, &mut tx).await?;
        checksums::upsert_checksum(consent_id, ChecksumType::AspspAccountAccess, digest, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Granted access of consent [{consent_id}] replaced");
        Ok(consent)
    }

    async fn close(&mut self) -> Result<(), ConsentDatabaseError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ConsentManagement for SqliteDatabase {
    async fn insert_consent(&self, consent: NewConsent) -> Result<Consent, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let consent = consents::insert_consent(consent, &mut tx).await?;
        tx.commit().await?;
        Ok(consent)
    }

    async fn fetch_consent(&self, consent_id: &ConsentId) -> Result<Option<Consent>, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(consents::fetch_consent(consent_id, &mut conn).await?)
    }

    async fn fetch_consents_for_tpp(&self, tpp_id: &TppId) -> Result<Vec<Consent>, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(consents::fetch_consents_for_tpp(tpp_id, &mut conn).await?)
    }

    async fn update_aspsp_access(
        &self,
        consent_id: &ConsentId,
        access: &AccountAccess,
    ) -> Result<Consent, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let consent = consents::update_aspsp_access(consent_id, access, &mut tx).await?;
        tx.commit().await?;
        Ok(consent)
    }

    async fn update_last_action_date(
        &self,
        consent_id: &ConsentId,
        date: NaiveDate,
    ) -> Result<(), ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        consents::update_last_action_date(consent_id, date, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl PaymentManagement for SqliteDatabase {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::insert_payment(payment, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<Option<Payment>, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment(payment_id, &mut conn).await?)
    }
}

impl AuthorisationManagement for SqliteDatabase {
    async fn insert_authorisation(
        &self,
        authorisation: NewAuthorisation,
    ) -> Result<Authorisation, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let authorisation = authorisations::insert_authorisation(authorisation, &mut tx).await?;
        tx.commit().await?;
        Ok(authorisation)
    }

    async fn fetch_authorisation(
        &self,
        authorisation_id: &AuthorisationId,
    ) -> Result<Option<Authorisation>, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(authorisations::fetch_authorisation(authorisation_id, &mut conn).await?)
    }

    async fn fetch_authorisations_for_parent(
        &self,
        parent_id: &str,
        authorisation_type: AuthorisationType,
    ) -> Result<Vec<Authorisation>, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(authorisations::fetch_authorisations_for_parent(parent_id, authorisation_type, &mut conn).await?)
    }
}

impl ConsentUsageManagement for SqliteDatabase {
    async fn record_usage(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<i64, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let count = usage::record_usage(consent_id, resource_id, date, &mut tx).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn usage_count(&self, consent_id: &ConsentId, resource_id: &str) -> Result<i64, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(usage::usage_count(consent_id, resource_id, &mut conn).await?)
    }

    async fn usage_count_on(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<i64, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(usage::usage_count_on(consent_id, resource_id, date, &mut conn).await?)
    }

    async fn save_number_of_transactions(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
        number_of_transactions: i64,
    ) -> Result<(), ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        usage::save_number_of_transactions(consent_id, resource_id, number_of_transactions, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn number_of_transactions(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
    ) -> Result<i64, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(usage::number_of_transactions(consent_id, resource_id, &mut conn).await?)
    }
}

impl ConsentActionLog for SqliteDatabase {
    async fn insert_consent_action(
        &self,
        consent_id: &ConsentId,
        tpp_id: &TppId,
        status: ActionStatus,
    ) -> Result<ConsentAction, ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let action = consent_actions::insert_consent_action(consent_id, tpp_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(action)
    }

    async fn fetch_consent_actions(&self, consent_id: &ConsentId) -> Result<Vec<ConsentAction>, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(consent_actions::fetch_consent_actions(consent_id, &mut conn).await?)
    }
}

impl ChecksumManagement for SqliteDatabase {
    async fn fetch_checksum(
        &self,
        consent_id: &ConsentId,
        checksum_type: ChecksumType,
    ) -> Result<Option<ChecksumValue>, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(checksums::fetch_checksum(consent_id, checksum_type, &mut conn).await?)
    }

    async fn fetch_checksums(&self, consent_id: &ConsentId) -> Result<Vec<ChecksumValue>, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(checksums::fetch_checksums(consent_id, &mut conn).await?)
    }
}

impl AspspConsentDataManagement for SqliteDatabase {
    async fn fetch_aspsp_consent_data(&self, parent_id: &str) -> Result<Option<Vec<u8>>, ConsentDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(aspsp_data::fetch_aspsp_consent_data(parent_id, &mut conn).await?)
    }

    async fn save_aspsp_consent_data(&self, parent_id: &str, data: &[u8]) -> Result<(), ConsentDatabaseError> {
        let mut tx = self.pool.begin().await?;
        aspsp_data::save_aspsp_consent_data(parent_id, data, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
