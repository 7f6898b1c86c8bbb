use chrono::NaiveDate;

use crate::{db_types::ConsentId, traits::ConsentDatabaseError};

/// Usage counters per consent, resource and day. Counters only ever grow.
#[allow(async_fn_in_trait)]
pub trait ConsentUsageManagement {
    /// Increments the usage counter for the given day and returns the new count for that day.
    async fn record_usage(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<i64, ConsentDatabaseError>;

    /// Total usage of the resource under this consent, over all days.
    async fn usage_count(&self, consent_id: &ConsentId, resource_id: &str) -> Result<i64, ConsentDatabaseError>;

    async fn usage_count_on(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<i64, ConsentDatabaseError>;

    /// Records how many transactions the bank reported for the resource. The latest value wins.
    async fn save_number_of_transactions(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
        number_of_transactions: i64,
    ) -> Result<(), ConsentDatabaseError>;

    /// Zero if nothing has been recorded yet.
    async fn number_of_transactions(
        &self,
        consent_id: &ConsentId,
        resource_id: &str,
    ) -> Result<i64, ConsentDatabaseError>;
}
