use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::FutureExt;
use log::*;
use tokio::runtime::Runtime;
use xs2a_consent_engine::{
    db_types::{AuthorisationType, ConsentStatus, ScaApproach, ScaStatus, TransactionStatus},
    events::{EventHandlers, EventHooks},
    test_utils::{
        fixtures::{access, TestEngine},
        mock_spi::VALID_OTP,
    },
    AspspProfile,
};

use crate::support::*;

mod support;

#[derive(Clone)]
struct Recorded<T> {
    events: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for Recorded<T> {
    fn default() -> Self {
        Self { events: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl<T: Clone> Recorded<T> {
    fn push(&self, event: T) {
        self.events.lock().unwrap().push(event);
    }

    fn all(&self) -> Vec<T> {
        self.events.lock().unwrap().clone()
    }

    /// Waits up to a second for `n` events to arrive.
    async fn wait_for(&self, n: usize) {
        for _ in 0..100 {
            if self.events.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[test]
fn status_changes_reach_the_hooks() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let rt = Runtime::new().unwrap();
    let sca_events = Recorded::<(ScaStatus, ScaStatus)>::default();
    let consent_events = Recorded::<(ConsentStatus, ConsentStatus)>::default();
    let payment_events = Recorded::<(TransactionStatus, TransactionStatus)>::default();
    let (sca_copy, consent_copy, payment_copy) = (sca_events.clone(), consent_events.clone(), payment_events.clone());
    rt.block_on(async {
        let mut hooks = EventHooks::default();
        hooks
            .on_sca_status_changed(move |ev| {
                info!("🪝️ SCA {} -> {}", ev.old_status, ev.authorisation.sca_status);
                sca_copy.push((ev.old_status, ev.authorisation.sca_status));
                async {}.boxed()
            })
            .on_consent_status_changed(move |ev| {
                consent_copy.push((ev.old_status, ev.new_status()));
                async {}.boxed()
            })
            .on_payment_status_changed(move |ev| {
                payment_copy.push((ev.old_status, ev.payment.transaction_status));
                async {}.boxed()
            });
        let handlers = EventHandlers::new(16, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let engine = TestEngine::with_producers(AspspProfile::default(), producers).await;

        let consent = create_recurring(&engine, access(&["DE0001"], &[], &[])).await;
        let auth = open_consent_authorisation(&engine, &consent, ScaApproach::Embedded).await;
        engine.ais.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
        engine.ais.update_authorisation(update_for(&auth).with_authentication_method("sms")).await.unwrap();
        // A rejected code changes nothing and publishes nothing
        engine.ais.update_authorisation(update_for(&auth).with_sca_code("999999")).await.unwrap();
        engine.ais.update_authorisation(update_for(&auth).with_sca_code(VALID_OTP)).await.unwrap();

        let payment = create_payment(&engine).await;
        let auth = open_payment_authorisation(&engine, &payment, AuthorisationType::PisCreation).await;
        engine.pis.update_authorisation(update_for(&auth).with_password("secret")).await.unwrap();
        engine.pis.update_authorisation(update_for(&auth).with_authentication_method("sms")).await.unwrap();
        engine.pis.update_authorisation(update_for(&auth).with_sca_code(VALID_OTP)).await.unwrap();

        engine.consents.revoke_by_psu(&consent.consent_id).await.unwrap();

        sca_events.wait_for(6).await;
        consent_events.wait_for(2).await;
        payment_events.wait_for(1).await;
        engine.teardown().await;
    });
    let sca = sca_events.all();
    assert_eq!(sca.len(), 6);
    assert_eq!(sca.iter().filter(|(_, new)| *new == ScaStatus::Finalised).count(), 2);
    assert_eq!(sca.iter().filter(|(old, _)| *old == ScaStatus::Received).count(), 2);
    let consent = consent_events.all();
    assert_eq!(consent.len(), 2);
    assert!(consent.contains(&(ConsentStatus::Received, ConsentStatus::Valid)));
    assert!(consent.contains(&(ConsentStatus::Valid, ConsentStatus::RevokedByPsu)));
    assert_eq!(payment_events.all(), vec![(TransactionStatus::Rcvd, TransactionStatus::Acsp)]);
    info!("🪝️ test complete");
}
