use crate::{
    db_types::{Authorisation, AuthorisationId, AuthorisationType, NewAuthorisation},
    traits::ConsentDatabaseError,
};

#[allow(async_fn_in_trait)]
pub trait AuthorisationManagement {
    /// Stores a new authorisation in `received` status.
    async fn insert_authorisation(&self, authorisation: NewAuthorisation)
        -> Result<Authorisation, ConsentDatabaseError>;

    async fn fetch_authorisation(
        &self,
        authorisation_id: &AuthorisationId,
    ) -> Result<Option<Authorisation>, ConsentDatabaseError>;

    /// Every authorisation of the given type that belongs to `parent_id`, oldest first.
    async fn fetch_authorisations_for_parent(
        &self,
        parent_id: &str,
        authorisation_type: AuthorisationType,
    ) -> Result<Vec<Authorisation>, ConsentDatabaseError>;
}
