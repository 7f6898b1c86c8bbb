use std::fmt::Debug;

use chrono::NaiveDate;
use log::*;

use crate::{
    db_types::{Consent, ConsentId},
    traits::{ConsentDatabase, ConsentDatabaseError},
    xs2a_api::errors::ConsentApiError,
};

/// Per-resource usage accounting for consents.
pub struct UsageCounter<B> {
    db: B,
}

impl<B> Debug for UsageCounter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UsageCounter")
    }
}

impl<B> UsageCounter<B>
where B: ConsentDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Counts one use of the resource on `date` and returns that day's total.
    pub async fn record_usage(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<i64, ConsentDatabaseError> {
        let count = self.db.record_usage(consent_id, resource_id, date).await?;
        trace!("📒️ Consent [{consent_id}] used for {resource_id}: {count} time(s) on {date}");
        Ok(count)
    }

    pub async fn usage_count(&self, consent_id: &ConsentId, resource_id: &str) -> Result<i64, ConsentDatabaseError> {
        self.db.usage_count(consent_id, resource_id).await
    }

    /// Recurring consents may be used at most `frequency_per_day` times per resource and day.
    pub async fn check_frequency(
        &self,
        consent: &Consent,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<(), ConsentApiError> {
        if consent.is_one_off() {
            return Ok(());
        }
        let used = self.db.usage_count_on(&consent.consent_id, resource_id, date).await?;
        if used >= consent.frequency_per_day {
            info!(
                "📒️ Consent [{}] has reached its daily limit of {} for {resource_id}",
                consent.consent_id, consent.frequency_per_day
            );
            return Err(ConsentApiError::AccessExceeded {
                id: consent.consent_id.clone(),
                resource_id: resource_id.to_string(),
                limit: consent.frequency_per_day,
            });
        }
        Ok(())
    }

    pub async fn save_number_of_transactions(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
        number_of_transactions: i64,
    ) -> Result<(), ConsentDatabaseError> {
        self.db.save_number_of_transactions(consent_id, resource_id, number_of_transactions).await
    }

    pub async fn number_of_transactions(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
    ) -> Result<i64, ConsentDatabaseError> {
        self.db.number_of_transactions(consent_id, resource_id).await
    }
}
