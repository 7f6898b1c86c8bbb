//! A scriptable in-memory bank connector.
//!
//! By default the PSU authenticates, the bank offers an SMS method (embedded) and a push method (decoupled), the
//! correct OTP is `123456`, and payments are accepted (`ACSP`) or cancelled (`CANC`). Every call is recorded.
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::*;
use xs2a_common::Secret;

use crate::{
    db_types::{Payment, PsuIdData, TransactionStatus},
    spi::{
        AspspConsentData,
        AuthenticationMethod,
        ChallengeData,
        PaymentExecutionSpi,
        PsuAuthorisationOutcome,
        ScaSpi,
        ScaVerification,
        SpiContext,
        SpiError,
    },
};

pub const VALID_OTP: &str = "123456";

#[derive(Debug, Clone)]
pub struct MockSpiState {
    pub psu_outcome: PsuAuthorisationOutcome,
    pub methods: Vec<AuthenticationMethod>,
    pub otp: String,
    /// Returned when the correct OTP is supplied
    pub verification: ScaVerification,
    /// If set, every call fails with this error
    pub fail_with: Option<SpiError>,
    pub delay: Option<Duration>,
    pub execution_status: TransactionStatus,
    pub cancellation_status: TransactionStatus,
    /// If set, every call replaces the bank's consent data with this blob
    pub aspsp_data: Option<Vec<u8>>,
    pub calls: Vec<String>,
}

impl Default for MockSpiState {
    fn default() -> Self {
        Self {
            psu_outcome: PsuAuthorisationOutcome::Authenticated,
            methods: vec![
                AuthenticationMethod::new("sms", "SMS one-time password"),
                AuthenticationMethod::decoupled("push", "Confirm in the banking app"),
            ],
            otp: VALID_OTP.to_string(),
            verification: ScaVerification::confirmed(),
            fail_with: None,
            delay: None,
            execution_status: TransactionStatus::Acsp,
            cancellation_status: TransactionStatus::Canc,
            aspsp_data: None,
            calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockSpi {
    state: Arc<Mutex<MockSpiState>>,
}

impl MockSpi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockSpiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_methods(self, methods: Vec<AuthenticationMethod>) -> Self {
        self.state().methods = methods;
        self
    }

    pub fn with_psu_outcome(self, outcome: PsuAuthorisationOutcome) -> Self {
        self.state().psu_outcome = outcome;
        self
    }

    pub fn with_verification(self, verification: ScaVerification) -> Self {
        self.state().verification = verification;
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.state().delay = Some(delay);
        self
    }

    pub fn with_aspsp_data(self, data: Vec<u8>) -> Self {
        self.state().aspsp_data = Some(data);
        self
    }

    pub fn set_verification(&self, verification: ScaVerification) {
        self.state().verification = verification;
    }

    pub fn set_failure(&self, error: Option<SpiError>) {
        self.state().fail_with = error;
    }

    pub fn set_methods(&self, methods: Vec<AuthenticationMethod>) {
        self.state().methods = methods;
    }

    pub fn set_psu_outcome(&self, outcome: PsuAuthorisationOutcome) {
        self.state().psu_outcome = outcome;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    pub fn set_aspsp_data(&self, data: Option<Vec<u8>>) {
        self.state().aspsp_data = data;
    }

    /// The names of all SPI calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == name).count()
    }

    async fn enter(&self, call: &str, data: &mut AspspConsentData) -> Result<MockSpiState, SpiError> {
        let state = {
            let mut state = self.state();
            state.calls.push(call.to_string());
            state.clone()
        };
        trace!("🚀️ Mock SPI call: {call}");
        if let Some(delay) = state.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(blob) = &state.aspsp_data {
            data.replace(blob.clone());
        }
        match &state.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(state),
        }
    }
}

impl<O> ScaSpi<O> for MockSpi {
    async fn authorise_psu(
        &self,
        _ctx: &SpiContext,
        _psu: &PsuIdData,
        _password: &Secret<String>,
        _object: &O,
        data: &mut AspspConsentData,
    ) -> Result<PsuAuthorisationOutcome, SpiError> {
        let state = self.enter("authorise_psu", data).await?;
        Ok(state.psu_outcome)
    }

    async fn request_available_sca_methods(
        &self,
        _ctx: &SpiContext,
        _object: &O,
        data: &mut AspspConsentData,
    ) -> Result<Vec<AuthenticationMethod>, SpiError> {
        let state = self.enter("request_available_sca_methods", data).await?;
        Ok(state.methods)
    }

    async fn request_authorisation_code(
        &self,
        _ctx: &SpiContext,
        authentication_method_id: &str,
        _object: &O,
        data: &mut AspspConsentData,
    ) -> Result<ChallengeData, SpiError> {
        let state = self.enter("request_authorisation_code", data).await?;
        Ok(ChallengeData {
            otp_max_length: Some(state.otp.len() as u32),
            additional_information: Some(format!("Code sent via {authentication_method_id}")),
        })
    }

    async fn start_sca_decoupled(
        &self,
        _ctx: &SpiContext,
        _authentication_method_id: Option<&str>,
        _object: &O,
        data: &mut AspspConsentData,
    ) -> Result<String, SpiError> {
        self.enter("start_sca_decoupled", data).await?;
        Ok("Please confirm the request in your banking app".to_string())
    }

    async fn verify_sca_authorisation(
        &self,
        _ctx: &SpiContext,
        sca_code: &Secret<String>,
        _object: &O,
        data: &mut AspspConsentData,
    ) -> Result<ScaVerification, SpiError> {
        let state = self.enter("verify_sca_authorisation", data).await?;
        if sca_code.reveal() != &state.otp {
            return Err(SpiError::sca_invalid("OTP mismatch"));
        }
        Ok(state.verification)
    }
}

impl PaymentExecutionSpi for MockSpi {
    async fn execute_payment(
        &self,
        _ctx: &SpiContext,
        _payment: &Payment,
        data: &mut AspspConsentData,
    ) -> Result<TransactionStatus, SpiError> {
        let state = self.enter("execute_payment", data).await?;
        Ok(state.execution_status)
    }

    async fn cancel_payment(
        &self,
        _ctx: &SpiContext,
        _payment: &Payment,
        data: &mut AspspConsentData,
    ) -> Result<TransactionStatus, SpiError> {
        let state = self.enter("cancel_payment", data).await?;
        Ok(state.cancellation_status)
    }
}
