//! SCA approach strategies and their registry.
//!
//! Each stored [`ScaApproach`] maps to exactly one registered [`ScaApproachStrategy`]. A stored approach without a
//! strategy is a configuration fault and is reported as [`StrategyResolutionError::NotRegistered`]; there is no
//! fallback.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use log::*;

use crate::{
    config::AspspProfile,
    db_types::{Authorisation, ScaApproach},
    spi::AuthenticationMethod,
    xs2a_api::{errors::StrategyResolutionError, processor_objects::TppScaPreference},
};

/// What to do once the PSU has been authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodDecision {
    /// The bank offers no SCA method. SCA is exempted.
    NoMethods,
    /// Exactly one method: it is selected without asking the PSU.
    Single(AuthenticationMethod),
    /// The PSU has to pick one of these.
    Choose(Vec<AuthenticationMethod>),
}

/// How a chosen method continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodStep {
    /// Ask the bank to send a code (embedded)
    RequestChallenge,
    /// Start out-of-band confirmation on the PSU device
    StartDecoupled,
}

pub trait ScaApproachStrategy: Send + Sync {
    fn approach(&self) -> ScaApproach;

    /// Whether PSU credentials and SCA data may be submitted through the TPP.
    fn accepts_psu_input(&self) -> bool {
        true
    }

    fn after_authentication(&self, methods: &[AuthenticationMethod]) -> MethodDecision {
        match methods {
            [] => MethodDecision::NoMethods,
            [method] => MethodDecision::Single(method.clone()),
            methods => MethodDecision::Choose(methods.to_vec()),
        }
    }

    fn on_method_chosen(&self, method: &AuthenticationMethod) -> MethodStep;
}

/// PSU credentials and the SCA code are relayed by the TPP. Methods the bank marks as decoupled switch the flow to
/// decoupled SCA.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedStrategy;

impl ScaApproachStrategy for EmbeddedStrategy {
    fn approach(&self) -> ScaApproach {
        ScaApproach::Embedded
    }

    fn on_method_chosen(&self, method: &AuthenticationMethod) -> MethodStep {
        if method.decoupled {
            MethodStep::StartDecoupled
        } else {
            MethodStep::RequestChallenge
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecoupledStrategy;

impl ScaApproachStrategy for DecoupledStrategy {
    fn approach(&self) -> ScaApproach {
        ScaApproach::Decoupled
    }

    fn on_method_chosen(&self, _method: &AuthenticationMethod) -> MethodStep {
        MethodStep::StartDecoupled
    }
}

/// The PSU authenticates on the bank's own pages. Status changes only arrive as bank callbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectStrategy;

impl ScaApproachStrategy for RedirectStrategy {
    fn approach(&self) -> ScaApproach {
        ScaApproach::Redirect
    }

    fn accepts_psu_input(&self) -> bool {
        false
    }

    fn on_method_chosen(&self, _method: &AuthenticationMethod) -> MethodStep {
        MethodStep::RequestChallenge
    }
}

#[derive(Clone, Default)]
pub struct ScaApproachStrategyResolver {
    strategies: HashMap<ScaApproach, Arc<dyn ScaApproachStrategy>>,
}

impl Debug for ScaApproachStrategyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut approaches = self.strategies.keys().map(|a| a.as_str()).collect::<Vec<_>>();
        approaches.sort();
        write!(f, "ScaApproachStrategyResolver({})", approaches.join(","))
    }
}

impl ScaApproachStrategyResolver {
    /// A resolver with no strategies registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registers the built-in strategy for every approach the bank supports.
    pub fn from_profile(profile: &AspspProfile) -> Self {
        let mut resolver = Self::empty();
        for approach in &profile.sca_approaches {
            let strategy: Arc<dyn ScaApproachStrategy> = match approach {
                ScaApproach::Embedded => Arc::new(EmbeddedStrategy),
                ScaApproach::Decoupled => Arc::new(DecoupledStrategy),
                ScaApproach::Redirect => Arc::new(RedirectStrategy),
            };
            resolver = resolver.with_strategy(strategy);
        }
        resolver
    }

    /// Registers `strategy`, replacing any strategy for the same approach.
    pub fn with_strategy(mut self, strategy: Arc<dyn ScaApproachStrategy>) -> Self {
        self.strategies.insert(strategy.approach(), strategy);
        self
    }

    pub fn is_registered(&self, approach: ScaApproach) -> bool {
        self.strategies.contains_key(&approach)
    }

    pub fn resolve(&self, approach: ScaApproach) -> Result<Arc<dyn ScaApproachStrategy>, StrategyResolutionError> {
        self.strategies.get(&approach).cloned().ok_or_else(|| {
            error!("🔐️ No SCA strategy is registered for {approach}. Check the bank profile configuration.");
            StrategyResolutionError::NotRegistered(approach)
        })
    }

    pub fn resolve_for(
        &self,
        authorisation: &Authorisation,
    ) -> Result<Arc<dyn ScaApproachStrategy>, StrategyResolutionError> {
        self.resolve(authorisation.sca_approach)
    }

    /// Picks the approach for a new authorisation.
    ///
    /// An explicit redirect preference wins if redirect is available. An explicit "no redirect" prefers decoupled
    /// (if the TPP asked for it) and then embedded. Otherwise the bank's default approach is used.
    pub fn choose_approach(&self, preference: &TppScaPreference, profile: &AspspProfile) -> ScaApproach {
        let available = |a: ScaApproach| profile.supports(a) && self.is_registered(a);
        let chosen = match preference.redirect_preferred {
            Some(true) if available(ScaApproach::Redirect) => Some(ScaApproach::Redirect),
            Some(false) => {
                if preference.decoupled_preferred == Some(true) && available(ScaApproach::Decoupled) {
                    Some(ScaApproach::Decoupled)
                } else if available(ScaApproach::Embedded) {
                    Some(ScaApproach::Embedded)
                } else if available(ScaApproach::Decoupled) {
                    Some(ScaApproach::Decoupled)
                } else {
                    None
                }
            },
            _ if preference.decoupled_preferred == Some(true) && available(ScaApproach::Decoupled) => {
                Some(ScaApproach::Decoupled)
            },
            _ => None,
        };
        let approach = chosen.unwrap_or_else(|| profile.default_approach());
        debug!("🔐️ SCA approach {approach} chosen for preference {preference:?}");
        approach
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn methods() -> Vec<AuthenticationMethod> {
        vec![AuthenticationMethod::new("sms", "SMS OTP"), AuthenticationMethod::decoupled("push", "Push to app")]
    }

    #[test]
    fn unregistered_approach_is_a_fault() {
        let profile = AspspProfile::default().with_sca_approaches(&[ScaApproach::Embedded]);
        let resolver = ScaApproachStrategyResolver::from_profile(&profile);
        assert!(resolver.resolve(ScaApproach::Embedded).is_ok());
        let err = resolver.resolve(ScaApproach::Redirect).err().unwrap();
        assert!(matches!(err, StrategyResolutionError::NotRegistered(ScaApproach::Redirect)));
    }

    #[test]
    fn method_decisions() {
        let strategy = EmbeddedStrategy;
        assert_eq!(strategy.after_authentication(&[]), MethodDecision::NoMethods);
        let m = methods();
        assert_eq!(strategy.after_authentication(&m[..1]), MethodDecision::Single(m[0].clone()));
        assert_eq!(strategy.after_authentication(&m), MethodDecision::Choose(m.clone()));
        assert_eq!(strategy.on_method_chosen(&m[0]), MethodStep::RequestChallenge);
        assert_eq!(strategy.on_method_chosen(&m[1]), MethodStep::StartDecoupled);
        assert_eq!(DecoupledStrategy.on_method_chosen(&m[0]), MethodStep::StartDecoupled);
        assert!(!RedirectStrategy.accepts_psu_input());
    }

    #[test]
    fn approach_choice_follows_tpp_preference() {
        let profile = AspspProfile::default();
        let resolver = ScaApproachStrategyResolver::from_profile(&profile);
        let pref = |r: Option<bool>, d: Option<bool>| TppScaPreference { redirect_preferred: r, decoupled_preferred: d };
        assert_eq!(resolver.choose_approach(&pref(Some(true), None), &profile), ScaApproach::Redirect);
        assert_eq!(resolver.choose_approach(&pref(Some(false), None), &profile), ScaApproach::Embedded);
        assert_eq!(resolver.choose_approach(&pref(Some(false), Some(true)), &profile), ScaApproach::Decoupled);
        assert_eq!(resolver.choose_approach(&pref(None, Some(true)), &profile), ScaApproach::Decoupled);
        assert_eq!(resolver.choose_approach(&pref(None, None), &profile), ScaApproach::Embedded);

        let redirect_only = AspspProfile::default().with_sca_approaches(&[ScaApproach::Redirect]);
        let resolver = ScaApproachStrategyResolver::from_profile(&redirect_only);
        assert_eq!(resolver.choose_approach(&pref(Some(false), None), &redirect_only), ScaApproach::Redirect);
    }
}
