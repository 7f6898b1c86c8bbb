use futures_util::future::join_all;
use log::*;
use xs2a_consent_engine::{
    db_types::{AccountAccessType, ConsentId, ConsentStatus, TppId},
    test_utils::fixtures::{access, recurring_consent, TestEngine, TPP_ID},
    AspspProfile,
    ConsentUsageRequest,
};

use crate::support::*;

mod support;

const PARALLEL_READS: usize = 16;

fn read(consent_id: &ConsentId, resource_id: &str) -> ConsentUsageRequest {
    ConsentUsageRequest::new(consent_id.clone(), TppId::from(TPP_ID), resource_id, AccountAccessType::Accounts)
}

/// Fires `PARALLEL_READS` reads of the same account at once and returns how many were let through.
async fn parallel_reads(engine: &TestEngine, consent_id: &ConsentId, resource_id: &str) -> usize {
    let reads = (0..PARALLEL_READS).map(|_| engine.consents.use_consent(read(consent_id, resource_id)));
    let results = join_all(reads).await;
    let successes = results.iter().filter(|r| r.is_ok()).count();
    info!("🚀️ {successes} of {PARALLEL_READS} parallel reads of {resource_id} succeeded");
    successes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn daily_frequency_holds_under_parallel_reads() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let new_consent = recurring_consent(PSU, access(&["DE0001"], &[], &[])).with_frequency_per_day(1);
    let consent = create_consent(&engine, new_consent).await;
    make_valid(&engine, &consent).await;

    assert_eq!(parallel_reads(&engine, &consent.consent_id, "DE0001").await, 1);
    assert_eq!(engine.consents.usage().usage_count(&consent.consent_id, "DE0001").await.unwrap(), 1);
    assert_eq!(fetch_consent(&engine, &consent).await.status, ConsentStatus::Valid);
    engine.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_off_consent_is_used_once_under_parallel_reads() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let consent = create_one_off(&engine, access(&["DE0001"], &[], &[])).await;
    make_valid(&engine, &consent).await;

    assert_eq!(parallel_reads(&engine, &consent.consent_id, "DE0001").await, 1);
    assert_eq!(engine.consents.usage().usage_count(&consent.consent_id, "DE0001").await.unwrap(), 1);
    assert_eq!(fetch_consent(&engine, &consent).await.status, ConsentStatus::Expired);
    engine.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_reads_on_different_consents_all_succeed() {
    let engine = TestEngine::new(AspspProfile::default()).await;
    let mut consents = Vec::new();
    for _ in 0..4 {
        let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
        consents.push(make_valid(&engine, &consent).await);
    }
    let reads = consents.iter().map(|c| engine.consents.use_consent(read(&c.consent_id, "DE0001")));
    let results = join_all(reads).await;
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results.iter().filter_map(|r| r.as_ref().err()).collect::<Vec<_>>());
    engine.teardown().await;
}
