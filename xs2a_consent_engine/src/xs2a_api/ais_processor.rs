use log::*;

use crate::{
    config::AspspProfile,
    db_types::{AuthorisationType, Consent, ConsentId, ConsentStatus, ScaStatus},
    spi::{ScaSpi, ScaVerification},
    traits::{BusinessObjectUpdate, ConsentDatabase, ConsentDatabaseError},
    xs2a_api::{
        authorisation_processor::AuthorisationProcessor,
        errors::{ErrorHolder, ExpirationError, MessageErrorCode},
        expiration_api::ConsentExpirationApi,
        processor_objects::{ProcessorResponse, ScaContext, ScaStatusCallback},
    },
};

/// Drives SCA for account information consents.
pub struct AisAuthorisationProcessor<S> {
    spi: S,
}

impl<S> AisAuthorisationProcessor<S> {
    pub fn new(spi: S) -> Self {
        Self { spi }
    }
}

/// Records a new consent status on the response, raising the multilevel flag the first time the consent is only
/// partially authorised.
fn record_consent_status(consent: &Consent, status: ConsentStatus, response: &mut ProcessorResponse) {
    if status == ConsentStatus::PartiallyAuthorised && !consent.multilevel_sca_required {
        debug!("🔐️ Consent [{}] requires multilevel SCA", consent.consent_id);
        response.multilevel_sca_required = Some(true);
    }
    if status != consent.status {
        response.consent_status = Some(status);
    }
    if status == ConsentStatus::Valid {
        response.terminate_superseded = true;
    }
}

impl<S> AuthorisationProcessor for AisAuthorisationProcessor<S>
where S: ScaSpi<Consent>
{
    type Object = Consent;
    type Spi = S;

    fn authorisation_type(&self) -> AuthorisationType {
        AuthorisationType::Consent
    }

    fn unknown_object_code(&self) -> MessageErrorCode {
        MessageErrorCode::ConsentUnknown
    }

    fn spi(&self) -> &S {
        &self.spi
    }

    async fn load_object<B: ConsentDatabase>(
        &self,
        db: &B,
        parent_id: &str,
    ) -> Result<Option<Consent>, ConsentDatabaseError> {
        db.fetch_consent(&ConsentId::from(parent_id)).await
    }

    async fn refresh_business_object<B: ConsentDatabase>(
        &self,
        expiration: &ConsentExpirationApi<B>,
        consent: Consent,
        profile: &AspspProfile,
    ) -> Result<Consent, ExpirationError> {
        expiration.refresh_consent(consent, profile).await
    }

    async fn apply_verification(
        &self,
        ctx: &mut ScaContext<Consent>,
        verification: &ScaVerification,
        response: &mut ProcessorResponse,
    ) -> Result<(), ErrorHolder> {
        let status = verification.consent_status.unwrap_or(ConsentStatus::Valid);
        record_consent_status(&ctx.object, status, response);
        Ok(())
    }

    async fn complete_exempted(
        &self,
        ctx: &mut ScaContext<Consent>,
        response: &mut ProcessorResponse,
    ) -> Result<(), ErrorHolder> {
        record_consent_status(&ctx.object, ConsentStatus::Valid, response);
        Ok(())
    }

    fn apply_callback(&self, consent: &Consent, callback: &ScaStatusCallback, response: &mut ProcessorResponse) {
        let status = callback.consent_status.or(match callback.sca_status {
            ScaStatus::Finalised | ScaStatus::Exempted => Some(ConsentStatus::Valid),
            ScaStatus::Failed => Some(ConsentStatus::Rejected),
            _ => None,
        });
        if let Some(status) = status {
            record_consent_status(consent, status, response);
        }
    }

    fn business_update(&self, consent: &Consent, response: &ProcessorResponse) -> Option<BusinessObjectUpdate> {
        response.has_business_update().then(|| BusinessObjectUpdate::Consent {
            consent_id: consent.consent_id.clone(),
            status: response.consent_status,
            multilevel_sca_required: response.multilevel_sca_required,
            terminate_superseded: response.terminate_superseded,
        })
    }
}
