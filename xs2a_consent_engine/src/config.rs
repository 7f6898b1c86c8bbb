//! Bank (ASPSP) profile settings used by the engine.
//!
//! The profile is an immutable snapshot. It is handed to the APIs that need it, never read from a global, so that
//! tests can supply whatever timeouts they like.
use std::env;

use chrono::Duration;
use log::*;
use xs2a_common::helpers::parse_millis;

use crate::db_types::ScaApproach;

const DEFAULT_CONSENT_CONFIRMATION_TIMEOUT: Duration = Duration::hours(24);
const DEFAULT_PAYMENT_CONFIRMATION_TIMEOUT: Duration = Duration::hours(24);
const DEFAULT_AUTHORISATION_TIMEOUT: Duration = Duration::hours(24);
const DEFAULT_SPI_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct AspspProfile {
    /// The SCA approaches supported by the bank, in order of preference. The first entry is the default approach.
    pub sca_approaches: Vec<ScaApproach>,
    /// Consents that are still not confirmed after this long (measured from creation) are rejected.
    pub not_confirmed_consent_expiration_time: Duration,
    /// Payments that are still not confirmed after this long (measured from creation) are rejected.
    pub not_confirmed_payment_expiration_time: Duration,
    /// The lifetime of a single authorisation resource.
    pub authorisation_expiration_time: Duration,
    /// Upper bound on any single call into the bank's SPI.
    pub spi_timeout: std::time::Duration,
}

impl Default for AspspProfile {
    fn default() -> Self {
        Self {
            sca_approaches: vec![ScaApproach::Embedded, ScaApproach::Decoupled, ScaApproach::Redirect],
            not_confirmed_consent_expiration_time: DEFAULT_CONSENT_CONFIRMATION_TIMEOUT,
            not_confirmed_payment_expiration_time: DEFAULT_PAYMENT_CONFIRMATION_TIMEOUT,
            authorisation_expiration_time: DEFAULT_AUTHORISATION_TIMEOUT,
            spi_timeout: DEFAULT_SPI_TIMEOUT,
        }
    }
}

impl AspspProfile {
    pub fn from_env_or_default() -> Self {
        let sca_approaches = env::var("XS2A_SCA_APPROACHES")
            .map_err(|_| info!("🪛️ XS2A_SCA_APPROACHES is not set. All SCA approaches are enabled."))
            .ok()
            .and_then(|s| {
                let approaches = parse_approaches(&s);
                if approaches.is_empty() {
                    warn!("🪛️ XS2A_SCA_APPROACHES ({s}) contains no valid approaches. Using the defaults.");
                    None
                } else {
                    Some(approaches)
                }
            })
            .unwrap_or_else(|| Self::default().sca_approaches);
        let not_confirmed_consent_expiration_time =
            duration_from_env("XS2A_NOT_CONFIRMED_CONSENT_EXPIRATION_MS", DEFAULT_CONSENT_CONFIRMATION_TIMEOUT);
        let not_confirmed_payment_expiration_time =
            duration_from_env("XS2A_NOT_CONFIRMED_PAYMENT_EXPIRATION_MS", DEFAULT_PAYMENT_CONFIRMATION_TIMEOUT);
        let authorisation_expiration_time =
            duration_from_env("XS2A_AUTHORISATION_EXPIRATION_MS", DEFAULT_AUTHORISATION_TIMEOUT);
        let spi_timeout = parse_millis(env::var("XS2A_SPI_TIMEOUT_MS").ok()).unwrap_or_else(|| {
            info!("🪛️ XS2A_SPI_TIMEOUT_MS is not set or invalid. Using {}ms.", DEFAULT_SPI_TIMEOUT.as_millis());
            DEFAULT_SPI_TIMEOUT
        });
        Self {
            sca_approaches,
            not_confirmed_consent_expiration_time,
            not_confirmed_payment_expiration_time,
            authorisation_expiration_time,
            spi_timeout,
        }
    }

    pub fn with_sca_approaches(mut self, approaches: &[ScaApproach]) -> Self {
        self.sca_approaches = approaches.to_vec();
        self
    }

    pub fn with_consent_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.not_confirmed_consent_expiration_time = timeout;
        self
    }

    pub fn with_payment_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.not_confirmed_payment_expiration_time = timeout;
        self
    }

    pub fn with_authorisation_timeout(mut self, timeout: Duration) -> Self {
        self.authorisation_expiration_time = timeout;
        self
    }

    pub fn with_spi_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.spi_timeout = timeout;
        self
    }

    pub fn supports(&self, approach: ScaApproach) -> bool {
        self.sca_approaches.contains(&approach)
    }

    pub fn default_approach(&self) -> ScaApproach {
        self.sca_approaches.first().copied().unwrap_or(ScaApproach::Embedded)
    }
}

fn parse_approaches(s: &str) -> Vec<ScaApproach> {
    let mut result = Vec::new();
    for part in s.split(',').map(|p| p.trim().to_ascii_uppercase()).filter(|p| !p.is_empty()) {
        match part.parse::<ScaApproach>() {
            Ok(approach) if !result.contains(&approach) => result.push(approach),
            Ok(_) => {},
            Err(e) => warn!("🪛️ Ignoring unknown SCA approach in XS2A_SCA_APPROACHES. {e}"),
        }
    }
    result
}

fn duration_from_env(var: &str, default: Duration) -> Duration {
    let value = env::var(var).ok();
    if value.is_none() {
        info!("🪛️ {var} is not set. Using the default value of {}ms.", default.num_milliseconds());
        return default;
    }
    parse_millis(value)
        .and_then(|d| Duration::from_std(d).ok())
        .unwrap_or_else(|| {
            warn!("🪛️ Invalid configuration value for {var}. Using the default value of {}ms.", default.num_milliseconds());
            default
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn approaches_are_parsed_in_order_without_duplicates() {
        let approaches = parse_approaches("redirect, EMBEDDED,bogus,REDIRECT");
        assert_eq!(approaches, vec![ScaApproach::Redirect, ScaApproach::Embedded]);
        assert!(parse_approaches(" , ").is_empty());
    }

    #[test]
    fn default_approach_is_the_first_supported_one() {
        let profile = AspspProfile::default().with_sca_approaches(&[ScaApproach::Decoupled, ScaApproach::Embedded]);
        assert_eq!(profile.default_approach(), ScaApproach::Decoupled);
        assert!(!profile.supports(ScaApproach::Redirect));
        let empty = AspspProfile::default().with_sca_approaches(&[]);
        assert_eq!(empty.default_approach(), ScaApproach::Embedded);
    }
}
