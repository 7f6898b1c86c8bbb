//! # Service provider interface (SPI)
//!
//! The engine never talks to the bank's core systems itself. Every bank-side decision (PSU authentication, SCA
//! methods, code verification, payment execution) goes through the traits in this module, which the bank connector
//! implements.
//!
//! All calls are made through [`call_with_timeout`], so a hanging connector surfaces as an ordinary
//! [`SpiErrorKind::Timeout`] error rather than blocking the request forever.
use std::{fmt::Display, future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xs2a_common::Secret;

use crate::db_types::{AuthorisationId, ConsentStatus, Payment, PsuIdData, TppId, TransactionStatus};

//--------------------------------------        SpiError       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiErrorKind {
    Format,
    Unauthorized,
    /// The SCA code (OTP, TAN) was wrong
    ScaInvalid,
    Timeout,
    ServiceUnavailable,
    Internal,
}

#[derive(Debug, Clone, Error)]
#[error("SPI error ({kind:?}): {message}")]
pub struct SpiError {
    pub kind: SpiErrorKind,
    /// Connector detail. This is logged but never returned to the TPP.
    pub message: String,
}

impl SpiError {
    pub fn new<S: Display>(kind: SpiErrorKind, message: S) -> Self {
        Self { kind, message: message.to_string() }
    }

    pub fn format<S: Display>(message: S) -> Self {
        Self::new(SpiErrorKind::Format, message)
    }

    pub fn unauthorized<S: Display>(message: S) -> Self {
        Self::new(SpiErrorKind::Unauthorized, message)
    }

    pub fn sca_invalid<S: Display>(message: S) -> Self {
        Self::new(SpiErrorKind::ScaInvalid, message)
    }

    pub fn timeout<S: Display>(message: S) -> Self {
        Self::new(SpiErrorKind::Timeout, message)
    }

    pub fn service_unavailable<S: Display>(message: S) -> Self {
        Self::new(SpiErrorKind::ServiceUnavailable, message)
    }

    pub fn internal<S: Display>(message: S) -> Self {
        Self::new(SpiErrorKind::Internal, message)
    }
}

/// Runs an SPI call, converting an elapsed deadline into a [`SpiErrorKind::Timeout`] error.
pub async fn call_with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, SpiError>
where F: Future<Output = Result<T, SpiError>> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SpiError::timeout(format!("SPI call did not complete within {}ms", timeout.as_millis()))),
    }
}

//--------------------------------------       SpiContext      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct SpiContext {
    pub tpp_id: TppId,
    pub authorisation_id: AuthorisationId,
    pub psu_data: Option<PsuIdData>,
}

//--------------------------------------    AspspConsentData   ---------------------------------------------------------
/// Opaque data the bank keeps alongside a consent or payment. Connectors may replace it during any call. The
/// engine persists it after the call if it changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AspspConsentData {
    parent_id: String,
    data: Vec<u8>,
    dirty: bool,
}

impl AspspConsentData {
    pub fn new(parent_id: &str, data: Vec<u8>) -> Self {
        Self { parent_id: parent_id.to_string(), data, dirty: false }
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn replace(&mut self, data: Vec<u8>) {
        if data != self.data {
            self.data = data;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

//--------------------------------------     SPI data types    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsuAuthorisationOutcome {
    Authenticated,
    Failed,
    /// The bank decided that no further SCA is needed
    Exempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationMethod {
    pub authentication_method_id: String,
    pub name: String,
    /// The method confirms out of band on the PSU's device (e.g. push to app)
    pub decoupled: bool,
}

impl AuthenticationMethod {
    pub fn new(id: &str, name: &str) -> Self {
        Self { authentication_method_id: id.to_string(), name: name.to_string(), decoupled: false }
    }

    pub fn decoupled(id: &str, name: &str) -> Self {
        Self { authentication_method_id: id.to_string(), name: name.to_string(), decoupled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeData {
    pub otp_max_length: Option<u32>,
    pub additional_information: Option<String>,
}

/// The bank's answer to an SCA code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaVerification {
    /// False while the bank still waits for confirmation from the PSU
    pub confirmed: bool,
    pub consent_status: Option<ConsentStatus>,
    pub transaction_status: Option<TransactionStatus>,
}

impl ScaVerification {
    pub fn confirmed() -> Self {
        Self { confirmed: true, consent_status: None, transaction_status: None }
    }

    pub fn unconfirmed() -> Self {
        Self { confirmed: false, consent_status: None, transaction_status: None }
    }

    pub fn with_consent_status(mut self, status: ConsentStatus) -> Self {
        self.consent_status = Some(status);
        self
    }

    pub fn with_transaction_status(mut self, status: TransactionStatus) -> Self {
        self.transaction_status = Some(status);
        self
    }
}

//--------------------------------------       SPI traits      ---------------------------------------------------------
/// Bank-side SCA operations for a business object of type `O` (a consent or a payment).
#[allow(async_fn_in_trait)]
pub trait ScaSpi<O> {
    async fn authorise_psu(
        &self,
        ctx: &SpiContext,
        psu: &PsuIdData,
        password: &Secret<String>,
        object: &O,
        data: &mut AspspConsentData,
    ) -> Result<PsuAuthorisationOutcome, SpiError>;

    async fn request_available_sca_methods(
        &self,
        ctx: &SpiContext,
        object: &O,
        data: &mut AspspConsentData,
    ) -> Result<Vec<AuthenticationMethod>, SpiError>;

    async fn request_authorisation_code(
        &self,
        ctx: &SpiContext,
        authentication_method_id: &str,
        object: &O,
        data: &mut AspspConsentData,
    ) -> Result<ChallengeData, SpiError>;

    /// Starts decoupled SCA and returns the message to show to the PSU.
    async fn start_sca_decoupled(
        &self,
        ctx: &SpiContext,
        authentication_method_id: Option<&str>,
        object: &O,
        data: &mut AspspConsentData,
    ) -> Result<String, SpiError>;

    async fn verify_sca_authorisation(
        &self,
        ctx: &SpiContext,
        sca_code: &Secret<String>,
        object: &O,
        data: &mut AspspConsentData,
    ) -> Result<ScaVerification, SpiError>;
}

/// Payment completion once the PSU has authorised the initiation or the cancellation.
#[allow(async_fn_in_trait)]
pub trait PaymentExecutionSpi {
    async fn execute_payment(
        &self,
        ctx: &SpiContext,
        payment: &Payment,
        data: &mut AspspConsentData,
    ) -> Result<TransactionStatus, SpiError>;

    async fn cancel_payment(
        &self,
        ctx: &SpiContext,
        payment: &Payment,
        data: &mut AspspConsentData,
    ) -> Result<TransactionStatus, SpiError>;
}
