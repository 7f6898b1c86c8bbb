use crate::{
    db_types::{ChecksumType, ChecksumValue, ConsentId},
    traits::ConsentDatabaseError,
};

#[allow(async_fn_in_trait)]
pub trait ChecksumManagement {
    async fn fetch_checksum(
        &self,
        consent_id: &ConsentId,
        checksum_type: ChecksumType,
    ) -> Result<Option<ChecksumValue>, ConsentDatabaseError>;

    async fn fetch_checksums(&self, consent_id: &ConsentId) -> Result<Vec<ChecksumValue>, ConsentDatabaseError>;
}
