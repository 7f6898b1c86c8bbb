use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
};

use cucumber::World;
use xs2a_consent_engine::{
    db_types::{Authorisation, Consent},
    errors::{ConsentApiError, ErrorHolder},
    test_utils::fixtures::TestEngine,
};

#[derive(Default, World)]
pub struct ConsentWorld {
    pub system: Option<TestEngine>,
    /// Consents by their alias in the feature file
    pub consents: HashMap<String, Consent>,
    /// Authorisations by their alias in the feature file
    pub authorisations: HashMap<String, Authorisation>,
    pub last_error: Option<ErrorHolder>,
    pub last_read: Option<Result<Consent, ConsentApiError>>,
}

impl Debug for ConsentWorld {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentWorld")
            .field("db", &self.system.as_ref().map(|s| s.url.as_str()))
            .field("consents", &self.consents.keys().collect::<Vec<_>>())
            .field("authorisations", &self.authorisations.keys().collect::<Vec<_>>())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl ConsentWorld {
    pub fn engine(&self) -> &TestEngine {
        self.system.as_ref().expect("Engine not initialised. Start the scenario with 'Given a fresh install'")
    }

    pub fn consent(&self, alias: &str) -> &Consent {
        self.consents.get(alias).unwrap_or_else(|| panic!("Consent {alias} is not defined"))
    }

    pub fn authorisation(&self, alias: &str) -> &Authorisation {
        self.authorisations.get(alias).unwrap_or_else(|| panic!("Authorisation {alias} is not defined"))
    }
}
