use crate::traits::ConsentDatabaseError;

/// Storage for the opaque data blob that the bank keeps alongside a consent or payment. The engine never
/// interprets the contents.
#[allow(async_fn_in_trait)]
pub trait AspspConsentDataManagement {
    async fn fetch_aspsp_consent_data(&self, parent_id: &str) -> Result<Option<Vec<u8>>, ConsentDatabaseError>;

    async fn save_aspsp_consent_data(&self, parent_id: &str, data: &[u8]) -> Result<(), ConsentDatabaseError>;
}
