use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{ActionStatus, ConsentAction, ConsentId, TppId},
    traits::{ConsentDatabase, ConsentDatabaseError},
};

/// Append-only log of consent checks. Recording is best effort: a failure is logged and never reaches the caller.
pub struct ConsentActionRecorder<B> {
    db: B,
}

impl<B> Debug for ConsentActionRecorder<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConsentActionRecorder")
    }
}

impl<B> ConsentActionRecorder<B>
where B: ConsentDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn record_consent_action(&self, consent_id: &ConsentId, status: ActionStatus, tpp_id: &TppId) {
        match self.db.insert_consent_action(consent_id, tpp_id, status).await {
            Ok(action) => trace!("📒️ Recorded {status} for consent [{consent_id}] (#{})", action.id),
            Err(e) => error!("📒️ Could not record {status} for consent [{consent_id}] by {tpp_id}. {e}"),
        }
    }

    pub async fn fetch_actions(&self, consent_id: &ConsentId) -> Result<Vec<ConsentAction>, ConsentDatabaseError> {
        self.db.fetch_consent_actions(consent_id).await
    }
}
