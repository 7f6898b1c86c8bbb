#![allow(dead_code)]
use xs2a_consent_engine::{
    db_types::{
        AccountAccess,
        Authorisation,
        AuthorisationType,
        Consent,
        ConsentStatus,
        NewConsent,
        Payment,
        ScaApproach,
        ScaStatus,
    },
    processor_objects::{CreateAuthorisationRequest, ScaStatusCallback, UpdateAuthorisationRequest},
    test_utils::fixtures::{one_off_consent, psu, recurring_consent, single_payment, TestEngine},
    traits::PaymentManagement,
};

pub const PSU: &str = "PSU-Alice";

pub async fn create_consent(engine: &TestEngine, consent: NewConsent) -> Consent {
    engine.consents.create_consent(consent).await.expect("Error creating consent")
}

pub async fn create_recurring(engine: &TestEngine, access: AccountAccess) -> Consent {
    create_consent(engine, recurring_consent(PSU, access)).await
}

pub async fn create_one_off(engine: &TestEngine, access: AccountAccess) -> Consent {
    create_consent(engine, one_off_consent(PSU, access)).await
}

pub async fn create_payment(engine: &TestEngine) -> Payment {
    engine.db.insert_payment(single_payment(PSU)).await.expect("Error creating payment")
}

pub async fn open_consent_authorisation(engine: &TestEngine, consent: &Consent, approach: ScaApproach) -> Authorisation {
    let request = CreateAuthorisationRequest::new(consent.consent_id.as_str(), AuthorisationType::Consent)
        .with_psu(psu(PSU))
        .with_approach(approach);
    engine.ais.create_authorisation(request).await.expect("Error creating consent authorisation")
}

pub async fn open_payment_authorisation(
    engine: &TestEngine,
    payment: &Payment,
    authorisation_type: AuthorisationType,
) -> Authorisation {
    let request = CreateAuthorisationRequest::new(payment.payment_id.as_str(), authorisation_type)
        .with_psu(psu(PSU))
        .with_approach(ScaApproach::Embedded);
    let flow = match authorisation_type {
        AuthorisationType::PisCancellation => &engine.cancellation,
        _ => &engine.pis,
    };
    flow.create_authorisation(request).await.expect("Error creating payment authorisation")
}

/// A PSU input request addressed at the authorisation's own parent.
pub fn update_for(authorisation: &Authorisation) -> UpdateAuthorisationRequest {
    UpdateAuthorisationRequest::new(
        authorisation.authorisation_id.clone(),
        &authorisation.parent_id,
        authorisation.authorisation_type,
    )
}

/// Makes a consent valid through a redirect authorisation that the bank finalises.
pub async fn make_valid(engine: &TestEngine, consent: &Consent) -> Consent {
    let authorisation = open_consent_authorisation(engine, consent, ScaApproach::Redirect).await;
    let callback = ScaStatusCallback::new(authorisation.authorisation_id, ScaStatus::Finalised);
    let response = engine.ais.apply_bank_callback(callback).await.expect("Error applying bank callback");
    assert!(response.error.is_none(), "Callback failed: {:?}", response.error);
    let consent = engine.consents.fetch_consent(&consent.consent_id).await.expect("Error fetching consent");
    assert_eq!(consent.status, ConsentStatus::Valid);
    consent
}

pub async fn fetch_consent(engine: &TestEngine, consent: &Consent) -> Consent {
    engine.consents.fetch_consent(&consent.consent_id).await.expect("Error fetching consent")
}
