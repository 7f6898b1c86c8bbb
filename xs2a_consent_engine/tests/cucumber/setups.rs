use cucumber::given;
use xs2a_consent_engine::{test_utils::fixtures::TestEngine, AspspProfile};

use crate::cucumber::ConsentWorld;

#[given("a fresh install")]
async fn fresh_database(world: &mut ConsentWorld) {
    let system = TestEngine::new(AspspProfile::default()).await;
    world.system = Some(system);
}

#[given("the bank offers no SCA methods")]
async fn no_sca_methods(world: &mut ConsentWorld) {
    world.engine().spi.set_methods(vec![]);
}
