use std::str::FromStr;

use chrono::Utc;
use cucumber::{given, then, when};
use xs2a_consent_engine::{
    db_types::{
        AccountAccessType,
        AuthorisationType,
        ConsentStatus,
        NewConsent,
        ScaApproach,
        ScaStatus,
    },
    errors::MessageErrorCode,
    processor_objects::{
        CreateAuthorisationRequest,
        ProcessorResponse,
        ScaStatusCallback,
        UpdateAuthorisationRequest,
    },
    test_utils::fixtures::{access, one_off_consent, psu, recurring_consent, tpp},
    ConsentUsageRequest,
};

use crate::cucumber::ConsentWorld;

async fn store_consent(world: &mut ConsentWorld, alias: String, consent: NewConsent) {
    let consent = world.engine().consents.create_consent(consent).await.expect("Error creating consent");
    world.consents.insert(alias, consent);
}

fn parse_error_code(code: &str) -> MessageErrorCode {
    serde_json::from_value(serde_json::Value::String(code.to_string()))
        .unwrap_or_else(|e| panic!("{code} is not a message error code. {e}"))
}

fn record_response(world: &mut ConsentWorld, response: ProcessorResponse) {
    world.last_error = response.error;
}

fn update_request(world: &ConsentWorld, alias: &str) -> UpdateAuthorisationRequest {
    let auth = world.authorisation(alias);
    UpdateAuthorisationRequest::new(auth.authorisation_id.clone(), &auth.parent_id, auth.authorisation_type)
}

//--------------------------------------        Consents       ---------------------------------------------------------

#[given(expr = "a recurring consent {word} for PSU {word} on account {word}")]
async fn recurring(world: &mut ConsentWorld, alias: String, psu_id: String, account: String) {
    let consent = recurring_consent(&psu_id, access(&[&account], &[], &[]));
    store_consent(world, alias, consent).await;
}

#[given(expr = "a one-off consent {word} for PSU {word} on account {word} with balances")]
async fn one_off_with_balances(world: &mut ConsentWorld, alias: String, psu_id: String, account: String) {
    let consent = one_off_consent(&psu_id, access(&[&account], &[&account], &[]));
    store_consent(world, alias, consent).await;
}

#[given(expr = "a one-off consent {word} for PSU {word} on account {word} with {int} transactions")]
async fn one_off_with_transactions(world: &mut ConsentWorld, alias: String, psu_id: String, account: String, n: i64) {
    let consent = one_off_consent(&psu_id, access(&[&account], &[], &[&account]));
    store_consent(world, alias.clone(), consent).await;
    let consent_id = world.consent(&alias).consent_id.clone();
    world
        .engine()
        .consents
        .record_number_of_transactions(&consent_id, &account, n)
        .await
        .expect("Error recording number of transactions");
}

#[when(expr = "the TPP reads account {word} under consent {word}")]
async fn read_account(world: &mut ConsentWorld, account: String, alias: String) {
    read_resource(world, account, alias, AccountAccessType::Accounts).await;
}

#[when(expr = "the TPP reads the balances of {word} under consent {word}")]
async fn read_balances(world: &mut ConsentWorld, account: String, alias: String) {
    read_resource(world, account, alias, AccountAccessType::Balances).await;
}

#[when(expr = "the TPP reads the transactions of {word} under consent {word}")]
async fn read_transactions(world: &mut ConsentWorld, account: String, alias: String) {
    read_resource(world, account, alias, AccountAccessType::Transactions).await;
}

async fn read_resource(world: &mut ConsentWorld, account: String, alias: String, access_type: AccountAccessType) {
    let consent_id = world.consent(&alias).consent_id.clone();
    let request = ConsentUsageRequest::new(consent_id, tpp(), &account, access_type);
    let result = world.engine().consents.use_consent(request).await;
    world.last_read = Some(result);
}

#[when(expr = "the PSU revokes consent {word}")]
async fn revoke(world: &mut ConsentWorld, alias: String) {
    let consent_id = world.consent(&alias).consent_id.clone();
    world.engine().consents.revoke_by_psu(&consent_id).await.expect("Error revoking consent");
}

#[then(expr = "consent {word} is {word}")]
async fn consent_status(world: &mut ConsentWorld, alias: String, status: String) {
    let expected = ConsentStatus::from_str(&status).expect("Not a consent status");
    let consent_id = world.consent(&alias).consent_id.clone();
    let consent = world.engine().consents.fetch_consent(&consent_id).await.expect("Error fetching consent");
    assert_eq!(consent.status, expected, "Consent {alias} has the wrong status");
}

#[then("the read succeeds")]
async fn read_succeeded(world: &mut ConsentWorld) {
    match world.last_read.as_ref().expect("Nothing has been read") {
        Ok(_) => {},
        Err(e) => panic!("The read failed. {e}"),
    }
}

#[then(expr = "the read fails with {word}")]
async fn read_failed(world: &mut ConsentWorld, code: String) {
    let expected = parse_error_code(&code);
    match world.last_read.as_ref().expect("Nothing has been read") {
        Ok(c) => panic!("The read succeeded. Consent is {}", c.status),
        Err(e) => assert_eq!(e.error_code(), expected, "Unexpected error: {e}"),
    }
}

#[then(expr = "consent {word} was last used today")]
async fn used_today(world: &mut ConsentWorld, alias: String) {
    let consent_id = world.consent(&alias).consent_id.clone();
    let consent = world.engine().consents.fetch_consent(&consent_id).await.expect("Error fetching consent");
    assert_eq!(consent.last_action_date, Some(Utc::now().date_naive()));
}

//--------------------------------------     Authorisations    ---------------------------------------------------------

#[when(expr = "the TPP starts an {word} authorisation {word} on consent {word}")]
async fn start_authorisation(world: &mut ConsentWorld, approach: String, auth_alias: String, consent_alias: String) {
    let approach = ScaApproach::from_str(&approach).expect("Not an SCA approach");
    let consent = world.consent(&consent_alias);
    let psu_id = consent.psu_data.first().map(|p| p.to_string()).unwrap_or_default();
    let request = CreateAuthorisationRequest::new(consent.consent_id.as_str(), AuthorisationType::Consent)
        .with_psu(psu(&psu_id))
        .with_approach(approach);
    let auth = world.engine().ais.create_authorisation(request).await.expect("Error creating authorisation");
    world.authorisations.insert(auth_alias, auth);
}

#[when(expr = "the PSU logs in to {word} with password {string}")]
async fn log_in(world: &mut ConsentWorld, alias: String, password: String) {
    let request = update_request(world, &alias).with_password(&password);
    let response = world.engine().ais.update_authorisation(request).await.expect("Error updating authorisation");
    record_response(world, response);
}

#[when(expr = "the PSU selects method {word} on {word}")]
async fn select_method(world: &mut ConsentWorld, method: String, alias: String) {
    let request = update_request(world, &alias).with_authentication_method(&method);
    let response = world.engine().ais.update_authorisation(request).await.expect("Error updating authorisation");
    record_response(world, response);
}

#[when(expr = "the PSU enters the code {word} on {word}")]
async fn enter_code(world: &mut ConsentWorld, code: String, alias: String) {
    let request = update_request(world, &alias).with_sca_code(&code);
    let response = world.engine().ais.update_authorisation(request).await.expect("Error updating authorisation");
    record_response(world, response);
}

#[when(expr = "the bank reports {word} for {word}")]
async fn bank_callback(world: &mut ConsentWorld, status: String, alias: String) {
    let status = ScaStatus::from_str(&status).expect("Not an SCA status");
    let callback = ScaStatusCallback::new(world.authorisation(&alias).authorisation_id.clone(), status);
    let response = world.engine().ais.apply_bank_callback(callback).await.expect("Error applying callback");
    record_response(world, response);
}

#[then(expr = "authorisation {word} is {word}")]
async fn authorisation_status(world: &mut ConsentWorld, alias: String, status: String) {
    let expected = ScaStatus::from_str(&status).expect("Not an SCA status");
    let id = world.authorisation(&alias).authorisation_id.clone();
    let actual = world.engine().ais.sca_status(&id).await.expect("Error fetching SCA status");
    assert_eq!(actual, expected, "Authorisation {alias} has the wrong status");
}

#[then(expr = "the last step failed with {word}")]
async fn step_failed(world: &mut ConsentWorld, code: String) {
    let expected = parse_error_code(&code);
    let error = world.last_error.as_ref().expect("The last step did not fail");
    assert_eq!(error.code, expected, "Unexpected error: {error}");
}

#[then("the last step succeeded")]
async fn step_succeeded(world: &mut ConsentWorld) {
    assert!(world.last_error.is_none(), "The last step failed: {:?}", world.last_error);
}
