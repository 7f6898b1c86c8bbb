use crate::{
    db_types::{NewPayment, Payment, PaymentId},
    traits::ConsentDatabaseError,
};

#[allow(async_fn_in_trait)]
pub trait PaymentManagement {
    /// Stores a new payment in `RCVD` status and returns the stored record.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, ConsentDatabaseError>;

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<Option<Payment>, ConsentDatabaseError>;
}
