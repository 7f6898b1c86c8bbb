use log::*;

use crate::{
    config::AspspProfile,
    db_types::{AuthorisationType, Payment, PaymentId, ScaStatus, TransactionStatus},
    spi::{call_with_timeout, PaymentExecutionSpi, ScaSpi, ScaVerification},
    traits::{BusinessObjectUpdate, ConsentDatabase, ConsentDatabaseError},
    xs2a_api::{
        authorisation_processor::AuthorisationProcessor,
        errors::{ErrorHolder, ExpirationError, MessageErrorCode},
        expiration_api::ConsentExpirationApi,
        processor_objects::{ProcessorResponse, ScaContext, ScaStatusCallback},
    },
};

/// Drives SCA for payment initiation or for payment cancellation. The two only differ in what happens once the PSU
/// has authorised: the payment is executed, or it is cancelled.
pub struct PaymentAuthorisationProcessor<S> {
    spi: S,
    authorisation_type: AuthorisationType,
}

impl<S> PaymentAuthorisationProcessor<S> {
    pub fn initiation(spi: S) -> Self {
        Self { spi, authorisation_type: AuthorisationType::PisCreation }
    }

    pub fn cancellation(spi: S) -> Self {
        Self { spi, authorisation_type: AuthorisationType::PisCancellation }
    }

    pub fn is_cancellation(&self) -> bool {
        self.authorisation_type == AuthorisationType::PisCancellation
    }
}

fn record_transaction_status(payment: &Payment, status: TransactionStatus, response: &mut ProcessorResponse) {
    if status == TransactionStatus::Patc && !payment.multilevel_sca_required {
        debug!("🔐️ Payment [{}] requires multilevel SCA", payment.payment_id);
        response.multilevel_sca_required = Some(true);
    }
    if status != payment.transaction_status {
        response.transaction_status = Some(status);
    }
}

impl<S> PaymentAuthorisationProcessor<S>
where S: ScaSpi<Payment> + PaymentExecutionSpi
{
    async fn complete_payment(
        &self,
        ctx: &mut ScaContext<Payment>,
        response: &mut ProcessorResponse,
    ) -> Result<(), ErrorHolder> {
        let spi_ctx = ctx.spi_context();
        let result = if self.is_cancellation() {
            call_with_timeout(ctx.spi_timeout, self.spi.cancel_payment(&spi_ctx, &ctx.object, &mut ctx.aspsp_data))
                .await
        } else {
            call_with_timeout(ctx.spi_timeout, self.spi.execute_payment(&spi_ctx, &ctx.object, &mut ctx.aspsp_data))
                .await
        };
        match result {
            Ok(status) => {
                info!("🔐️ Payment [{}] completed by the bank with status {status}", ctx.object.payment_id);
                record_transaction_status(&ctx.object, status, response);
                Ok(())
            },
            Err(e) => {
                warn!("🔐️ The bank could not complete payment [{}]. {e}", ctx.object.payment_id);
                Err(ErrorHolder::from(&e))
            },
        }
    }
}

impl<S> AuthorisationProcessor for PaymentAuthorisationProcessor<S>
where S: ScaSpi<Payment> + PaymentExecutionSpi
{
    type Object = Payment;
    type Spi = S;

    fn authorisation_type(&self) -> AuthorisationType {
        self.authorisation_type
    }

    fn unknown_object_code(&self) -> MessageErrorCode {
        MessageErrorCode::PaymentUnknown
    }

    fn spi(&self) -> &S {
        &self.spi
    }

    async fn load_object<B: ConsentDatabase>(
        &self,
        db: &B,
        parent_id: &str,
    ) -> Result<Option<Payment>, ConsentDatabaseError> {
        db.fetch_payment(&PaymentId::from(parent_id)).await
    }

    async fn refresh_business_object<B: ConsentDatabase>(
        &self,
        expiration: &ConsentExpirationApi<B>,
        payment: Payment,
        profile: &AspspProfile,
    ) -> Result<Payment, ExpirationError> {
        if self.is_cancellation() {
            return Ok(payment);
        }
        expiration.check_and_update_payment_on_confirmation_expiration(payment, profile).await
    }

    /// A payment still waiting for further authorisers (`PATC`) is only flagged. Otherwise the payment is executed
    /// or cancelled at the bank.
    async fn apply_verification(
        &self,
        ctx: &mut ScaContext<Payment>,
        verification: &ScaVerification,
        response: &mut ProcessorResponse,
    ) -> Result<(), ErrorHolder> {
        if !self.is_cancellation() && verification.transaction_status == Some(TransactionStatus::Patc) {
            record_transaction_status(&ctx.object, TransactionStatus::Patc, response);
            return Ok(());
        }
        self.complete_payment(ctx, response).await
    }

    async fn complete_exempted(
        &self,
        ctx: &mut ScaContext<Payment>,
        response: &mut ProcessorResponse,
    ) -> Result<(), ErrorHolder> {
        self.complete_payment(ctx, response).await
    }

    fn apply_callback(&self, payment: &Payment, callback: &ScaStatusCallback, response: &mut ProcessorResponse) {
        let status = callback.transaction_status.or(match callback.sca_status {
            ScaStatus::Finalised if self.is_cancellation() => Some(TransactionStatus::Canc),
            ScaStatus::Failed if !self.is_cancellation() => Some(TransactionStatus::Rjct),
            _ => None,
        });
        if let Some(status) = status {
            record_transaction_status(payment, status, response);
        }
    }

    fn business_update(&self, payment: &Payment, response: &ProcessorResponse) -> Option<BusinessObjectUpdate> {
        response.has_business_update().then(|| BusinessObjectUpdate::Payment {
            payment_id: payment.payment_id.clone(),
            status: response.transaction_status,
            multilevel_sca_required: response.multilevel_sca_required,
        })
    }
}
