//! Forced consent and payment status transitions.
//!
//! Nothing here runs on a schedule. Every check is applied lazily, at the moment a consent or payment is about to be
//! used or authorised, and every transition is idempotent: applying it to an object that has already been moved on
//! returns the object unchanged.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    config::AspspProfile,
    db_types::{
        AccountAccess,
        AccountAccessType,
        AisConsentRequestType,
        Consent,
        ConsentId,
        ConsentStatus,
        Payment,
        TransactionStatus,
    },
    events::{ConsentStatusChangedEvent, EventProducers, PaymentStatusChangedEvent},
    traits::ConsentDatabase,
    xs2a_api::errors::ExpirationError,
};

/// Who asked for a consent to be withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationSource {
    Psu,
    Tpp,
}

impl RevocationSource {
    pub fn target_status(&self) -> ConsentStatus {
        match self {
            RevocationSource::Psu => ConsentStatus::RevokedByPsu,
            RevocationSource::Tpp => ConsentStatus::TerminatedByTpp,
        }
    }
}

pub struct ConsentExpirationApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for ConsentExpirationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConsentExpirationApi")
    }
}

impl<B> ConsentExpirationApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// True if the consent is still waiting for PSU confirmation and its confirmation window (measured from
    /// creation) has passed. A window too large to represent never passes.
    pub fn is_confirmation_expired(consent: &Consent, profile: &AspspProfile, now: DateTime<Utc>) -> bool {
        consent.is_not_confirmed() &&
            window_has_passed(consent.created_at, profile.not_confirmed_consent_expiration_time, now)
    }

    pub fn is_payment_confirmation_expired(payment: &Payment, profile: &AspspProfile, now: DateTime<Utc>) -> bool {
        payment.transaction_status == TransactionStatus::Rcvd &&
            window_has_passed(payment.created_at, profile.not_confirmed_payment_expiration_time, now)
    }

    /// The number of reads a one-off consent allows for a single resource.
    ///
    /// Account details add one call if the resource is granted for account access. Balances add one call.
    /// Transactions add the transaction list plus one call per transaction detail.
    pub fn max_requests_for_resource(access: &AccountAccess, resource_id: &str, number_of_transactions: i64) -> i64 {
        let mut max = 0;
        if access.grants(AccountAccessType::Accounts, resource_id) {
            max += 1;
        }
        if access.grants(AccountAccessType::Balances, resource_id) {
            max += 1;
        }
        if access.grants(AccountAccessType::Transactions, resource_id) {
            max += 1 + number_of_transactions.max(0);
        }
        max
    }
}

/// A window whose end cannot be represented never passes.
fn window_has_passed(start: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    start.checked_add_signed(window).is_some_and(|deadline| deadline < now)
}

impl<B> ConsentExpirationApi<B>
where B: ConsentDatabase
{
    /// Rejects the consent if it was not confirmed in time. Its open authorisations fail and the last action date is
    /// stamped.
    pub async fn check_and_update_on_confirmation_expiration(
        &self,
        consent: Consent,
        profile: &AspspProfile,
    ) -> Result<Consent, ExpirationError> {
        if !Self::is_confirmation_expired(&consent, profile, Utc::now()) {
            return Ok(consent);
        }
        info!(
            "⏳️ Consent [{}] was not confirmed within {}s of creation. Rejecting it.",
            consent.consent_id,
            profile.not_confirmed_consent_expiration_time.num_seconds()
        );
        let today = Utc::now().date_naive();
        let rejected = self.db.reject_unconfirmed_consent(&consent.consent_id, today).await?;
        self.notify(rejected, consent.status).await
    }

    /// Expires the consent once its `valid_until` date has passed.
    pub async fn check_and_update_on_expiration(&self, consent: Consent) -> Result<Consent, ExpirationError> {
        let today = Utc::now().date_naive();
        if consent.status.is_finalised() || !consent.is_expired_by_date(today) {
            return Ok(consent);
        }
        info!("⏳️ Consent [{}] was valid until {}. Expiring it.", consent.consent_id, consent.valid_until);
        let expired = self.db.finalise_consent(&consent.consent_id, ConsentStatus::Expired, today).await?;
        self.notify(expired, consent.status).await
    }

    /// Applies both lazy expiry checks, in order.
    pub async fn refresh_consent(&self, consent: Consent, profile: &AspspProfile) -> Result<Consent, ExpirationError> {
        let consent = self.check_and_update_on_confirmation_expiration(consent, profile).await?;
        self.check_and_update_on_expiration(consent).await
    }

    /// Decides whether a one-off consent has used up every read it allows.
    ///
    /// * Recurring consents are never one-off.
    /// * `allAvailableAccounts` consents are used up after their single qualifying call.
    /// * A bank-offered consent whose accounts the PSU has not chosen yet is never used up.
    /// * Otherwise the consent is used up only if every resource the bank granted has reached its maximum.
    pub async fn is_one_off_consent_expired(&self, consent: &Consent) -> Result<bool, ExpirationError> {
        if !consent.is_one_off() {
            return Ok(false);
        }
        match consent.request_type {
            AisConsentRequestType::AllAvailableAccounts => return Ok(true),
            AisConsentRequestType::BankOffered if consent.aspsp_access.is_empty() => return Ok(false),
            _ => {},
        }
        let resources = consent.aspsp_access.resource_ids();
        if resources.is_empty() {
            return Ok(false);
        }
        for resource_id in &resources {
            let transactions = self.db.number_of_transactions(&consent.consent_id, resource_id).await?;
            let max = Self::max_requests_for_resource(&consent.aspsp_access, resource_id, transactions);
            let used = self.db.usage_count(&consent.consent_id, resource_id).await?;
            trace!("⏳️ Consent [{}] has used {used} of {max} reads for {resource_id}", consent.consent_id);
            if used < max {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn expire_if_one_off_exhausted(&self, consent: Consent) -> Result<Consent, ExpirationError> {
        if consent.status.is_finalised() || !self.is_one_off_consent_expired(&consent).await? {
            return Ok(consent);
        }
        info!("⏳️ One-off consent [{}] has been used up. Expiring it.", consent.consent_id);
        let today = Utc::now().date_naive();
        let expired = self.db.finalise_consent(&consent.consent_id, ConsentStatus::Expired, today).await?;
        self.notify(expired, consent.status).await
    }

    /// Withdraws a consent. Its open authorisations fail and the last action date is stamped.
    ///
    /// Revoking a consent twice from the same source is a no-op. A consent that already ended in another way cannot
    /// be revoked.
    pub async fn revoke_consent(
        &self,
        consent_id: &ConsentId,
        source: RevocationSource,
    ) -> Result<Consent, ExpirationError> {
        let consent = self
            .db
            .fetch_consent(consent_id)
            .await?
            .ok_or_else(|| ExpirationError::ConsentNotFound(consent_id.clone()))?;
        let status = source.target_status();
        if consent.status.is_finalised() && consent.status != status {
            debug!("⏳️ Consent [{consent_id}] is already {}. It cannot be revoked.", consent.status);
            return Err(ExpirationError::AlreadyFinalised { id: consent_id.clone(), status: consent.status });
        }
        let today = Utc::now().date_naive();
        let revoked = self.db.finalise_consent(consent_id, status, today).await?;
        info!("⏳️ Consent [{consent_id}] revoked ({source:?}). Status is now {}", revoked.status);
        self.notify(revoked, consent.status).await
    }

    /// Rejects a payment that has not been confirmed in time.
    pub async fn check_and_update_payment_on_confirmation_expiration(
        &self,
        payment: Payment,
        profile: &AspspProfile,
    ) -> Result<Payment, ExpirationError> {
        if !Self::is_payment_confirmation_expired(&payment, profile, Utc::now()) {
            return Ok(payment);
        }
        info!("⏳️ Payment [{}] was not confirmed in time. Rejecting it.", payment.payment_id);
        let rejected = self.db.reject_unconfirmed_payment(&payment.payment_id).await?;
        if rejected.transaction_status != payment.transaction_status {
            let event = PaymentStatusChangedEvent::new(rejected.clone(), payment.transaction_status);
            self.producers.publish_payment_status_changed(event).await;
        }
        Ok(rejected)
    }

    async fn notify(&self, consent: Consent, old_status: ConsentStatus) -> Result<Consent, ExpirationError> {
        if consent.status != old_status {
            let event = ConsentStatusChangedEvent::new(consent.clone(), old_status);
            self.producers.publish_consent_status_changed(event).await;
        }
        Ok(consent)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::AccountReference;

    fn access(accounts: &[&str], balances: &[&str], transactions: &[&str]) -> AccountAccess {
        let refs = |ids: &[&str]| ids.iter().map(|id| AccountReference::with_resource_id(*id)).collect();
        AccountAccess {
            accounts: refs(accounts),
            balances: refs(balances),
            transactions: refs(transactions),
            ..Default::default()
        }
    }

    #[test]
    fn one_off_request_limits() {
        type Api = ConsentExpirationApi<()>;
        assert_eq!(Api::max_requests_for_resource(&access(&["A"], &[], &[]), "A", 0), 1);
        assert_eq!(Api::max_requests_for_resource(&access(&["A"], &["A"], &[]), "A", 0), 2);
        assert_eq!(Api::max_requests_for_resource(&access(&["A"], &[], &["A"]), "A", 3), 5);
        assert_eq!(Api::max_requests_for_resource(&access(&["A"], &["A"], &["A"]), "A", 3), 6);
        assert_eq!(Api::max_requests_for_resource(&access(&["A", "B"], &["A"], &[]), "B", 0), 1);
        // No account details call for resources only granted for balances or transactions
        assert_eq!(Api::max_requests_for_resource(&access(&[], &["A"], &[]), "A", 0), 1);
        assert_eq!(Api::max_requests_for_resource(&access(&[], &[], &["A"]), "A", 3), 4);
        assert_eq!(Api::max_requests_for_resource(&access(&["B"], &["A"], &["A"]), "A", 2), 4);
    }

    #[test]
    fn oversized_windows_never_pass() {
        let now = Utc::now();
        let created = now - Duration::days(2);
        assert!(window_has_passed(created, Duration::days(1), now));
        assert!(!window_has_passed(created, Duration::days(3), now));
        assert!(!window_has_passed(created, Duration::milliseconds(i64::MAX / 2), now));
    }

    #[test]
    fn revocation_targets() {
        assert_eq!(RevocationSource::Psu.target_status(), ConsentStatus::RevokedByPsu);
        assert_eq!(RevocationSource::Tpp.target_status(), ConsentStatus::TerminatedByTpp);
    }
}
