use std::{sync::Arc, time::Duration};

use xs2a_consent_engine::{
    db_types::{
        AuthorisationId,
        AuthorisationType,
        ConsentStatus,
        NewAuthorisation,
        ScaApproach,
        ScaStatus,
    },
    errors::{MessageErrorCode, ProcessorError},
    events::EventProducers,
    processor_objects::{CreateAuthorisationRequest, ProcessorResponse, ScaStatusCallback, UpdateAuthorisationRequest},
    sca_strategy::{EmbeddedStrategy, ScaApproachStrategyResolver},
    spi::{AuthenticationMethod, PsuAuthorisationOutcome, ScaVerification, SpiError},
    test_utils::{
        fixtures::{access, psu, recurring_consent, TestEngine},
        mock_spi::VALID_OTP,
    },
    traits::{AspspConsentDataManagement, AuthorisationManagement},
    AspspProfile,
};

use crate::support::*;

mod support;

fn error_code(response: &ProcessorResponse) -> Option<MessageErrorCode> {
    response.error.as_ref().map(|e| e.code)
}

#[tokio::test]
async fn embedded_flow_finalises_and_validates_consent() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &["DE0001"], &[])).await;
    assert_eq!(consent.status, ConsentStatus::Received);
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    assert_eq!(auth.sca_status, ScaStatus::Received);

    let response = engine
        .ais
        .update_authorisation(update_for(&auth).with_psu(psu(PSU)).with_password("correct horse"))
        .await
        .unwrap();
    assert!(response.error.is_none());
    assert_eq!(response.sca_status, ScaStatus::PsuAuthenticated);
    assert_eq!(response.available_sca_methods.len(), 2);

    let response =
        engine.ais.update_authorisation(update_for(&auth).with_authentication_method("sms")).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::ScaMethodSelected);
    assert_eq!(response.authentication_method_id.as_deref(), Some("sms"));
    assert!(response.challenge_data.is_some());

    let response = engine.ais.update_authorisation(update_for(&auth).with_sca_code(VALID_OTP)).await.unwrap();
    assert!(response.error.is_none());
    assert_eq!(response.sca_status, ScaStatus::Finalised);
    assert_eq!(response.consent_status, Some(ConsentStatus::Valid));

    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::Finalised);
    let consent = fetch_consent(&engine, &consent).await;
    assert_eq!(consent.status, ConsentStatus::Valid);
    let stored = engine.db.fetch_authorisation(&auth.authorisation_id).await.unwrap().unwrap();
    assert_eq!(stored.authentication_method_id.as_deref(), Some("sms"));
    assert_eq!(stored.psu_data, Some(psu(PSU)));
    engine.teardown().await;
}

#[tokio::test]
async fn psu_can_be_identified_before_authenticating() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;

    let response = engine.ais.update_authorisation(update_for(&auth).with_psu(psu(PSU))).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::PsuIdentified);
    assert_eq!(engine.spi.call_count("authorise_psu"), 0);

    let response = engine.ais.update_authorisation(update_for(&auth)).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::FormatError));
    assert_eq!(response.sca_status, ScaStatus::PsuIdentified);

    let response = engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::PsuAuthenticated);
    engine.teardown().await;
}

#[tokio::test]
async fn finalised_authorisations_accept_nothing_more() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    engine.ais.update_authorisation(update_for(&auth).with_authentication_method("sms")).await.unwrap();
    engine.ais.update_authorisation(update_for(&auth).with_sca_code(VALID_OTP)).await.unwrap();
    let calls = engine.spi.calls().len();

    let response = engine.ais.update_authorisation(update_for(&auth).with_sca_code(VALID_OTP)).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::StatusInvalid));
    assert_eq!(response.sca_status, ScaStatus::Finalised);
    assert_eq!(engine.spi.calls().len(), calls, "the bank must not be called for a finalised authorisation");

    let callback = ScaStatusCallback::new(auth.authorisation_id.clone(), ScaStatus::Failed);
    let response = engine.ais.apply_bank_callback(callback).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::StatusInvalid));
    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::Finalised);
    engine.teardown().await;
}

#[tokio::test]
async fn wrong_code_leaves_status_unchanged() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    engine.ais.update_authorisation(update_for(&auth).with_authentication_method("sms")).await.unwrap();

    let response = engine.ais.update_authorisation(update_for(&auth).with_sca_code("000000")).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::ScaInvalid));
    assert_eq!(response.sca_status, ScaStatus::ScaMethodSelected);
    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::ScaMethodSelected);
    assert_eq!(fetch_consent(&engine, &consent).await.status, ConsentStatus::Received);

    let response = engine.ais.update_authorisation(update_for(&auth).with_sca_code(VALID_OTP)).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Finalised);
    engine.teardown().await;
}

#[tokio::test]
async fn invalid_credentials_fail_the_authorisation() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    engine.spi.set_psu_outcome(PsuAuthorisationOutcome::Failed);
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;

    let response = engine.ais.update_authorisation(update_for(&auth).with_password("wrong")).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Failed);
    assert_eq!(error_code(&response), Some(MessageErrorCode::PsuCredentialsInvalid));
    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::Failed);
    assert_eq!(fetch_consent(&engine, &consent).await.status, ConsentStatus::Received);
    engine.teardown().await;
}

#[tokio::test]
async fn single_method_is_selected_automatically() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    engine.spi.set_methods(vec![AuthenticationMethod::new("chip-tan", "chipTAN")]);
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;

    let response = engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::ScaMethodSelected);
    assert_eq!(response.authentication_method_id.as_deref(), Some("chip-tan"));
    assert_eq!(engine.spi.call_count("request_authorisation_code"), 1);
    engine.teardown().await;
}

#[tokio::test]
async fn no_methods_means_exempted() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    engine.spi.set_methods(vec![]);
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;

    let response = engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Exempted);
    assert_eq!(fetch_consent(&engine, &consent).await.status, ConsentStatus::Valid);
    engine.teardown().await;
}

#[tokio::test]
async fn bank_exemption_skips_method_selection() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    engine.spi.set_psu_outcome(PsuAuthorisationOutcome::Exempted);
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;

    let response = engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Exempted);
    assert_eq!(engine.spi.call_count("request_available_sca_methods"), 0);
    engine.teardown().await;
}

#[tokio::test]
async fn decoupled_method_switches_the_approach() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();

    let response =
        engine.ais.update_authorisation(update_for(&auth).with_authentication_method("push")).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Started);
    assert_eq!(response.sca_approach, ScaApproach::Decoupled);
    assert!(response.psu_message.is_some());
    let stored = engine.db.fetch_authorisation(&auth.authorisation_id).await.unwrap().unwrap();
    assert_eq!(stored.sca_approach, ScaApproach::Decoupled);

    // Polling while the PSU confirms on their device changes nothing
    let response = engine.ais.update_authorisation(update_for(&auth)).await.unwrap();
    assert!(response.error.is_none());
    assert_eq!(response.sca_status, ScaStatus::Started);

    let response = engine
        .ais
        .apply_bank_callback(ScaStatusCallback::new(auth.authorisation_id.clone(), ScaStatus::Finalised))
        .await
        .unwrap();
    assert_eq!(response.sca_status, ScaStatus::Finalised);
    assert_eq!(fetch_consent(&engine, &consent).await.status, ConsentStatus::Valid);
    engine.teardown().await;
}

#[tokio::test]
async fn redirect_approach_rejects_psu_input() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Redirect).await;

    let response = engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::ServiceInvalid));
    assert_eq!(response.sca_status, ScaStatus::Received);
    assert!(engine.spi.calls().is_empty());

    let callback = ScaStatusCallback::new(auth.authorisation_id.clone(), ScaStatus::Failed);
    let response = engine.ais.apply_bank_callback(callback).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Failed);
    assert_eq!(fetch_consent(&engine, &consent).await.status, ConsentStatus::Rejected);
    engine.teardown().await;
}

#[tokio::test]
async fn callbacks_only_move_forward() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Redirect).await;
    let id = auth.authorisation_id.clone();

    let response = engine.ais.apply_bank_callback(ScaStatusCallback::new(id.clone(), ScaStatus::Started)).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Started);
    // Repeating the same notification is harmless
    let response = engine.ais.apply_bank_callback(ScaStatusCallback::new(id.clone(), ScaStatus::Started)).await.unwrap();
    assert!(response.error.is_none());
    assert_eq!(response.sca_status, ScaStatus::Started);

    let response =
        engine.ais.apply_bank_callback(ScaStatusCallback::new(id.clone(), ScaStatus::PsuIdentified)).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::StatusInvalid));
    assert_eq!(engine.ais.sca_status(&id).await.unwrap(), ScaStatus::Started);
    engine.teardown().await;
}

#[tokio::test]
async fn unregistered_approach_is_a_configuration_fault() {
    let resolver = ScaApproachStrategyResolver::empty().with_strategy(Arc::new(EmbeddedStrategy));
    let engine = TestEngine::with_resolver(AspspProfile::default(), resolver, EventProducers::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;

    let request = CreateAuthorisationRequest::new(
        consent.consent_id.as_str(),
        AuthorisationType::Consent,
    )
    .with_approach(ScaApproach::Redirect);
    let err = engine.ais.create_authorisation(request).await.unwrap_err();
    assert!(matches!(err, ProcessorError::StrategyNotRegistered(_)), "{err}");

    // An authorisation stored with an approach that has since been unregistered
    let stored = NewAuthorisation::new(
        consent.consent_id.as_str(),
        AuthorisationType::Consent,
        ScaApproach::Decoupled,
        chrono::Duration::hours(1),
    );
    let auth = engine.db.insert_authorisation(stored).await.unwrap();
    let err = engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap_err();
    assert!(matches!(err, ProcessorError::StrategyNotRegistered(_)), "{err}");
    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::Received);
    engine.teardown().await;
}

#[tokio::test]
async fn slow_bank_times_out_without_changing_status() {
    let profile = AspspProfile::default().with_spi_timeout(Duration::from_millis(50));
    let engine = TestEngine::new(profile).await;
    engine.spi.set_delay(Some(Duration::from_millis(500)));
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;

    let response = engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::RequestTimeout));
    assert_eq!(response.sca_status, ScaStatus::Received);
    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::Received);
    engine.teardown().await;
}

#[tokio::test]
async fn unknown_resources_are_reported() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;

    let missing = UpdateAuthorisationRequest::new(
        AuthorisationId::from("no-such-authorisation"),
        consent.consent_id.as_str(),
        AuthorisationType::Consent,
    );
    let err = engine.ais.update_authorisation(missing).await.unwrap_err();
    assert!(matches!(err, ProcessorError::AuthorisationNotFound(_)));

    let wrong_parent =
        UpdateAuthorisationRequest::new(auth.authorisation_id.clone(), "another-consent", AuthorisationType::Consent)
            .with_password("secret");
    let response = engine.ais.update_authorisation(wrong_parent).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::ResourceUnknown));
    assert_eq!(response.authorisation_id, auth.authorisation_id);
    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::Received);

    // A consent authorisation cannot be driven through the payment flow
    let response = engine.pis.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::ResourceUnknown));

    let err = engine
        .ais
        .create_authorisation(CreateAuthorisationRequest::new(
            "no-such-consent",
            AuthorisationType::Consent,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessorError::ParentNotFound(_)));
    engine.teardown().await;
}

#[tokio::test]
async fn expired_authorisation_fails() {
    let profile = AspspProfile::default().with_authorisation_timeout(chrono::Duration::milliseconds(1));
    let engine = TestEngine::new(profile).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Failed);
    assert_eq!(error_code(&response), Some(MessageErrorCode::ScaInvalid));
    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::Failed);
    assert!(engine.spi.calls().is_empty());
    engine.teardown().await;
}

#[tokio::test]
async fn finalised_consents_cannot_be_authorised() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    engine.consents.revoke_by_psu(&consent.consent_id).await.unwrap();

    // Revocation fails the open authorisation
    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::Failed);
    let request = CreateAuthorisationRequest::new(
        consent.consent_id.as_str(),
        AuthorisationType::Consent,
    );
    let err = engine.ais.create_authorisation(request).await.unwrap_err();
    assert!(matches!(err, ProcessorError::ParentFinalised(_)));
    engine.teardown().await;
}

#[tokio::test]
async fn unconfirmed_verification_waits_for_the_bank() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    engine.spi.set_verification(ScaVerification::unconfirmed());
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    engine.ais.update_authorisation(update_for(&auth).with_authentication_method("sms")).await.unwrap();

    let response = engine.ais.update_authorisation(update_for(&auth).with_sca_code(VALID_OTP)).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Unconfirmed);
    assert_eq!(fetch_consent(&engine, &consent).await.status, ConsentStatus::Received);

    engine.spi.set_verification(ScaVerification::confirmed());
    let response = engine.ais.update_authorisation(update_for(&auth).with_sca_code(VALID_OTP)).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Finalised);
    assert_eq!(fetch_consent(&engine, &consent).await.status, ConsentStatus::Valid);
    engine.teardown().await;
}

#[tokio::test]
async fn multilevel_flag_is_raised_once() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    engine.spi.set_verification(ScaVerification::confirmed().with_consent_status(ConsentStatus::PartiallyAuthorised));
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;

    let first = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    engine.ais.update_authorisation(update_for(&first).with_password("secret")).await.unwrap();
    engine.ais.update_authorisation(update_for(&first).with_authentication_method("sms")).await.unwrap();
    let response = engine.ais.update_authorisation(update_for(&first).with_sca_code(VALID_OTP)).await.unwrap();
    assert_eq!(response.multilevel_sca_required, Some(true));
    assert_eq!(response.consent_status, Some(ConsentStatus::PartiallyAuthorised));
    let stored = fetch_consent(&engine, &consent).await;
    assert_eq!(stored.status, ConsentStatus::PartiallyAuthorised);
    assert!(stored.multilevel_sca_required);

    let second = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    engine
        .ais
        .update_authorisation(update_for(&second).with_psu(psu("PSU-Bob")).with_password("secret"))
        .await
        .unwrap();
    engine.ais.update_authorisation(update_for(&second).with_authentication_method("sms")).await.unwrap();
    let response = engine.ais.update_authorisation(update_for(&second).with_sca_code(VALID_OTP)).await.unwrap();
    assert_eq!(response.sca_status, ScaStatus::Finalised);
    assert_eq!(response.multilevel_sca_required, None);
    assert_eq!(response.consent_status, None);

    engine.spi.set_verification(ScaVerification::confirmed());
    let third = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
    engine.ais.update_authorisation(update_for(&third).with_password("secret")).await.unwrap();
    engine.ais.update_authorisation(update_for(&third).with_authentication_method("sms")).await.unwrap();
    engine.ais.update_authorisation(update_for(&third).with_sca_code(VALID_OTP)).await.unwrap();
    let stored = fetch_consent(&engine, &consent).await;
    assert_eq!(stored.status, ConsentStatus::Valid);
    assert!(stored.multilevel_sca_required);
    engine.teardown().await;
}

#[tokio::test]
async fn new_recurring_consent_supersedes_the_old_one() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let old = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let old = make_valid(&engine, &old).await;
    let other_psu = create_consent(
        &engine,
        recurring_consent("PSU-Bob", access(&["DE0002"], &[], &[])),
    )
    .await;
    let other_psu = make_valid(&engine, &other_psu).await;

    let new = create_recurring(&engine, access(&["DE0001", "DE0003"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &new, ScaApproach::Embedded).await;
    engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    engine.ais.update_authorisation(update_for(&auth).with_authentication_method("sms")).await.unwrap();
    engine.ais.update_authorisation(update_for(&auth).with_sca_code(VALID_OTP)).await.unwrap();

    assert_eq!(fetch_consent(&engine, &new).await.status, ConsentStatus::Valid);
    assert_eq!(fetch_consent(&engine, &old).await.status, ConsentStatus::TerminatedByTpp);
    assert_eq!(fetch_consent(&engine, &other_psu).await.status, ConsentStatus::Valid);
    engine.teardown().await;
}

#[tokio::test]
async fn bank_data_is_saved_even_when_a_step_fails() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;

    engine.spi.set_aspsp_data(Some(b"session-1".to_vec()));
    engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
    let data = engine.db.fetch_aspsp_consent_data(consent.consent_id.as_str()).await.unwrap();
    assert_eq!(data.as_deref(), Some(b"session-1".as_slice()));

    engine.spi.set_aspsp_data(Some(b"session-2".to_vec()));
    engine.spi.set_failure(Some(SpiError::service_unavailable("core banking offline")));
    let response =
        engine.ais.update_authorisation(update_for(&auth).with_authentication_method("sms")).await.unwrap();
    assert_eq!(error_code(&response), Some(MessageErrorCode::ServiceUnavailable));
    assert_eq!(response.sca_status, ScaStatus::PsuAuthenticated);
    let data = engine.db.fetch_aspsp_consent_data(consent.consent_id.as_str()).await.unwrap();
    assert_eq!(data.as_deref(), Some(b"session-2".as_slice()));
    engine.teardown().await;
}

#[tokio::test]
async fn concurrent_updates_are_serialised() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    engine.spi.set_delay(Some(Duration::from_millis(20)));
    let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
    let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;

    let (a, b) = tokio::join!(
        engine.ais.update_authorisation(update_for(&auth).with_password("secret")),
        engine.ais.update_authorisation(update_for(&auth).with_password("secret")),
    );
    let responses = [a.unwrap(), b.unwrap()];
    let moved = responses.iter().filter(|r| r.error.is_none()).count();
    assert_eq!(moved, 1, "exactly one request may authenticate the PSU");
    assert_eq!(engine.spi.call_count("authorise_psu"), 1);
    assert_eq!(engine.ais.sca_status(&auth.authorisation_id).await.unwrap(), ScaStatus::PsuAuthenticated);
    engine.teardown().await;
}
