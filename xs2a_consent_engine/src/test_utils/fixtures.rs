use chrono::{Days, Utc};

use crate::{
    config::AspspProfile,
    db_types::{AccountAccess, AccountReference, NewConsent, NewPayment, PsuIdData, TppId},
    events::EventProducers,
    helpers::KeyedLocks,
    sca_strategy::ScaApproachStrategyResolver,
    test_utils::{
        mock_spi::MockSpi,
        prepare_env::{drop_test_database, new_test_database},
    },
    AisAuthorisationProcessor,
    AuthorisationFlowApi,
    ConsentApi,
    PaymentAuthorisationProcessor,
    SqliteDatabase,
};

pub const TPP_ID: &str = "PSDDE-BAFIN-911360";
pub const OTHER_TPP_ID: &str = "PSDDE-BAFIN-424242";

pub fn tpp() -> TppId {
    TppId::from(TPP_ID)
}

pub fn psu(id: &str) -> PsuIdData {
    PsuIdData::new(id)
}

fn refs(ids: &[&str]) -> Vec<AccountReference> {
    ids.iter().map(|id| AccountReference::with_resource_id(*id)).collect()
}

pub fn access(accounts: &[&str], balances: &[&str], transactions: &[&str]) -> AccountAccess {
    AccountAccess {
        accounts: refs(accounts),
        balances: refs(balances),
        transactions: refs(transactions),
        ..Default::default()
    }
}

/// A recurring consent for the given accounts, valid for 90 days.
pub fn recurring_consent(psu_id: &str, access: AccountAccess) -> NewConsent {
    let valid_until = Utc::now().date_naive() + Days::new(90);
    NewConsent::dedicated(tpp(), psu(psu_id), access, valid_until)
}

/// A one-off consent (frequency of one per day, not recurring).
pub fn one_off_consent(psu_id: &str, access: AccountAccess) -> NewConsent {
    recurring_consent(psu_id, access).with_recurring_indicator(false).with_frequency_per_day(1)
}

pub fn single_payment(psu_id: &str) -> NewPayment {
    NewPayment::single(tpp(), psu(psu_id), "sepa-credit-transfers")
}

pub type AisFlow = AuthorisationFlowApi<SqliteDatabase, AisAuthorisationProcessor<MockSpi>>;
pub type PisFlow = AuthorisationFlowApi<SqliteDatabase, PaymentAuthorisationProcessor<MockSpi>>;

/// A complete engine wired to a fresh database and a [`MockSpi`].
pub struct TestEngine {
    pub db: SqliteDatabase,
    pub url: String,
    pub spi: MockSpi,
    pub profile: AspspProfile,
    pub ais: AisFlow,
    pub pis: PisFlow,
    pub cancellation: PisFlow,
    pub consents: ConsentApi<SqliteDatabase>,
}

impl TestEngine {
    pub async fn new(profile: AspspProfile) -> Self {
        Self::with_producers(profile, EventProducers::default()).await
    }

    pub async fn with_producers(profile: AspspProfile, producers: EventProducers) -> Self {
        let resolver = ScaApproachStrategyResolver::from_profile(&profile);
        Self::with_resolver(profile, resolver, producers).await
    }

    pub async fn with_resolver(
        profile: AspspProfile,
        resolver: ScaApproachStrategyResolver,
        producers: EventProducers,
    ) -> Self {
        let (db, url) = new_test_database().await;
        let spi = MockSpi::new();
        let locks = KeyedLocks::new();
        let ais = AuthorisationFlowApi::new(
            db.clone(),
            AisAuthorisationProcessor::new(spi.clone()),
            resolver.clone(),
            profile.clone(),
            producers.clone(),
        )
        .with_locks(locks.clone());
        let pis = AuthorisationFlowApi::new(
            db.clone(),
            PaymentAuthorisationProcessor::initiation(spi.clone()),
            resolver.clone(),
            profile.clone(),
            producers.clone(),
        )
        .with_locks(locks.clone());
        let cancellation = AuthorisationFlowApi::new(
            db.clone(),
            PaymentAuthorisationProcessor::cancellation(spi.clone()),
            resolver,
            profile.clone(),
            producers.clone(),
        )
        .with_locks(locks.clone());
        let consents = ConsentApi::new(db.clone(), profile.clone(), producers).with_locks(locks);
        Self { db, url, spi, profile, ais, pis, cancellation, consents }
    }

    pub async fn teardown(self) {
        drop_test_database(self.db, &self.url).await;
    }
}
