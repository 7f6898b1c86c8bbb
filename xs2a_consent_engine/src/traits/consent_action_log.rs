use crate::{
    db_types::{ActionStatus, ConsentAction, ConsentId, TppId},
    traits::ConsentDatabaseError,
};

#[allow(async_fn_in_trait)]
pub trait ConsentActionLog {
    async fn insert_consent_action(
        &self,
        consent_id: &ConsentId,
        tpp_id: &TppId,
        status: ActionStatus,
    ) -> Result<ConsentAction, ConsentDatabaseError>;

    async fn fetch_consent_actions(&self, consent_id: &ConsentId) -> Result<Vec<ConsentAction>, ConsentDatabaseError>;
}
